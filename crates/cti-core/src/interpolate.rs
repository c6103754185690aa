//! Dynamic-parameter interpolation: filling `${name}` holes in an
//! [`Expression`] with caller-supplied values.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::{Expression, Node, QueryAttributeValue};
use crate::error::{wrap, CtiError};
use crate::parser::Parser;

impl Expression {
    /// Replace every `${name}` chain node, and every `${name}` occurrence
    /// inside a query-attribute's raw text, with the corresponding entry of
    /// `values`.
    ///
    /// A chain-node value may be given with or without its `cti.` prefix; it
    /// is re-parsed in reference mode and must resolve to exactly one
    /// wildcard-free node. If the dynamic node is not the first link in the
    /// chain, the resolved node's vendor/package must match the already-built
    /// prefix — a value cannot smuggle in an unrelated vendor or package
    /// partway through the chain.
    pub fn interpolate(
        &self,
        values: &HashMap<String, String>,
        parser: &Parser,
    ) -> Result<Expression, CtiError> {
        let mut resolved_chain = Vec::with_capacity(self.chain.len());
        let mut prefix: Option<(String, String)> = None;

        for node in &self.chain {
            match node {
                Node::Concrete { vendor, package, .. } => {
                    prefix = Some((vendor.clone(), package.clone()));
                    resolved_chain.push(node.clone());
                }
                Node::Dynamic { name } => {
                    let raw_value = values
                        .get(name)
                        .ok_or_else(|| CtiError::InterpolationMissing { name: name.clone() })?;
                    let resolved = resolve_dynamic_node(name, raw_value, parser)?;
                    if let (Some((anchor_vendor, anchor_package)), Node::Concrete { vendor, package, .. }) =
                        (&prefix, &resolved)
                    {
                        if vendor != anchor_vendor || package != anchor_package {
                            return Err(CtiError::InterpolationInvalid {
                                name: name.clone(),
                                value: raw_value.clone(),
                                reason: format!(
                                    "resolved vendor/package '{vendor}.{package}' does not match chain prefix '{anchor_vendor}.{anchor_package}'"
                                ),
                            });
                        }
                    }
                    if let Node::Concrete { vendor, package, .. } = &resolved {
                        prefix = Some((vendor.clone(), package.clone()));
                    }
                    resolved_chain.push(resolved);
                }
            }
        }

        let mut query_attributes = IndexMap::new();
        for (key, value) in &self.query_attributes {
            let substituted = substitute_dynamic_text(value.raw(), values)?;
            query_attributes.insert(key.clone(), QueryAttributeValue::new(substituted));
        }

        Ok(Expression {
            chain: resolved_chain,
            query_attributes,
            attribute_selector: self.attribute_selector.clone(),
            anonymous_entity_uuid: self.anonymous_entity_uuid,
        })
    }
}

fn resolve_dynamic_node(name: &str, raw_value: &str, parser: &Parser) -> Result<Node, CtiError> {
    let candidate = if raw_value.starts_with("cti.") {
        raw_value.to_string()
    } else {
        format!("cti.{raw_value}")
    };
    let expr = parser.parse_reference(&candidate).map_err(|e| {
        let context = format!("parse value '{raw_value}' of dynamic parameter '{name}'");
        CtiError::InterpolationInvalid {
            name: name.to_string(),
            value: raw_value.to_string(),
            reason: wrap(&context, e).to_string(),
        }
    })?;
    if expr.chain.len() != 1 {
        return Err(CtiError::InterpolationInvalid {
            name: name.to_string(),
            value: raw_value.to_string(),
            reason: "dynamic parameter value must resolve to exactly one node".to_string(),
        });
    }
    if expr.chain[0].has_wildcard() {
        return Err(CtiError::InterpolationInvalid {
            name: name.to_string(),
            value: raw_value.to_string(),
            reason: "dynamic parameter value must not contain a wildcard".to_string(),
        });
    }
    Ok(expr.chain.into_iter().next().expect("checked len == 1"))
}

/// Substitute every `${name}` occurrence in `raw` with its value, leaving
/// the rest of the text untouched.
fn substitute_dynamic_text(raw: &str, values: &HashMap<String, String>) -> Result<String, CtiError> {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        match values.get(name) {
            Some(v) => result.push_str(v),
            None => {
                return Err(CtiError::InterpolationMissing {
                    name: name.to_string(),
                })
            }
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
