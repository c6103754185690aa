//! CTI matching: does a (possibly wildcarded) expression describe another,
//! fully concrete, expression?

use crate::ast::{Expression, Node, Version};
use crate::error::CtiError;

impl Expression {
    /// `self` is the pattern, `other` must be fully concrete.
    ///
    /// `ignore_query` skips the query-attribute submap check — useful for
    /// structural relations (`is_a`, `is_child_of`) that only care about the
    /// chain.
    pub fn matches(&self, other: &Expression, ignore_query: bool) -> Result<bool, CtiError> {
        if self.attribute_selector.is_some() || other.attribute_selector.is_some() {
            return Err(CtiError::MatchWithSelector);
        }
        if other.has_wildcard() {
            return Err(CtiError::MatchAgainstWildcard);
        }

        let mut self_iter = self.chain.iter();
        let mut other_iter = other.chain.iter();
        loop {
            match (self_iter.next(), other_iter.next()) {
                (Some(pattern), Some(concrete)) => {
                    if !node_matches(pattern, concrete)? {
                        return Ok(false);
                    }
                }
                (None, None) => {
                    if !anonymous_uuid_matches(self, other) {
                        return Ok(false);
                    }
                    return if ignore_query {
                        Ok(true)
                    } else {
                        query_matches(self, other)
                    };
                }
                // LHS chain is shorter: only a generalising prefix match if it
                // carries no anonymous UUID or (considered) query attributes.
                (None, Some(_)) => {
                    if self.anonymous_entity_uuid.is_some() {
                        return Ok(false);
                    }
                    if !ignore_query && !self.query_attributes.is_empty() {
                        return Ok(false);
                    }
                    return Ok(true);
                }
                // RHS chain ran out first: LHS demands more than RHS has.
                (Some(_), None) => return Ok(false),
            }
        }
    }
}

fn node_matches(pattern: &Node, concrete: &Node) -> Result<bool, CtiError> {
    let (Node::Concrete {
        vendor: p_vendor,
        package: p_package,
        entity_name: p_entity,
        version: p_version,
    },
    Node::Concrete {
        vendor: c_vendor,
        package: c_package,
        entity_name: c_entity,
        version: c_version,
    }) = (pattern, concrete)
    else {
        // A dynamic node has not been interpolated and cannot match anything.
        return Ok(false);
    };

    if p_vendor != "*" && p_vendor != c_vendor {
        return Ok(false);
    }
    if p_package != "*" && p_package != c_package {
        return Ok(false);
    }
    if !entity_name_matches(p_entity, c_entity) {
        return Ok(false);
    }
    match p_version {
        // Missing version on the pattern side matches any version.
        None => Ok(true),
        Some(pv) => Ok(version_matches(pv, c_version.as_ref())),
    }
}

fn entity_name_matches(pattern: &str, concrete: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => concrete == prefix || concrete.starts_with(&format!("{prefix}.")),
        None => pattern == concrete,
    }
}

fn version_matches(pattern: &Version, concrete: Option<&Version>) -> bool {
    let concrete = match concrete {
        Some(v) => v,
        None => return false,
    };
    if pattern.major_wildcard {
        return true;
    }
    if pattern.major != concrete.major {
        return false;
    }
    if pattern.minor_wildcard {
        return true;
    }
    match pattern.minor {
        // Major-only pattern matches any minor.
        None => true,
        Some(minor) => Some(minor) == concrete.minor,
    }
}

fn anonymous_uuid_matches(pattern: &Expression, concrete: &Expression) -> bool {
    match pattern.anonymous_entity_uuid {
        None => true,
        Some(uuid) => concrete.anonymous_entity_uuid == Some(uuid),
    }
}

fn query_matches(pattern: &Expression, concrete: &Expression) -> Result<bool, CtiError> {
    for (key, pattern_value) in &pattern.query_attributes {
        let Some(concrete_value) = concrete.query_attributes.get(key) else {
            return Ok(false);
        };
        let matched = match (pattern_value.expression(), concrete_value.expression()) {
            (Some(a), Some(b)) => a.matches(b, false)?,
            _ => pattern_value.raw() == concrete_value.raw(),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}
