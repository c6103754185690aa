//! The CTI abstract syntax tree.
//!
//! An [`Expression`] owns a chain of [`Node`]s joined by the inheritance
//! operator `~`, plus the optional query attributes, attribute selector and
//! anonymous-entity UUID described in the data model.

use std::fmt;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::CtiError;
use crate::parser::Parser;

/// One `vendor.package.entity.version` link in a CTI chain, or a
/// `${name}` dynamic-parameter hole standing in for a whole link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Concrete {
        vendor: String,
        package: String,
        entity_name: String,
        /// Absent only in reference mode (version omitted entirely).
        version: Option<Version>,
    },
    Dynamic {
        name: String,
    },
}

impl Node {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Node::Dynamic { .. })
    }

    /// True if any populated slot in this node carries a wildcard.
    pub fn has_wildcard(&self) -> bool {
        match self {
            Node::Dynamic { .. } => false,
            Node::Concrete {
                vendor,
                package,
                entity_name,
                version,
            } => {
                vendor == "*"
                    || package == "*"
                    || entity_name == "*"
                    || entity_name.ends_with(".*")
                    || version.as_ref().is_some_and(Version::has_wildcard)
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Dynamic { name } => write!(f, "${{{name}}}"),
            Node::Concrete {
                vendor,
                package,
                entity_name,
                version,
            } => {
                write!(f, "{vendor}.{package}.{entity_name}")?;
                if let Some(v) = version {
                    write!(f, ".{v}")?;
                }
                Ok(())
            }
        }
    }
}

/// A CTI version: `v1`, `v1.0`, `v1.*` or `v*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: Option<u32>,
    pub minor: Option<u32>,
    /// `v*` — both major and minor are wildcarded.
    pub major_wildcard: bool,
    /// `v<major>.*` — only minor is wildcarded.
    pub minor_wildcard: bool,
}

impl Version {
    pub fn whole_wildcard() -> Self {
        Self {
            major: None,
            minor: None,
            major_wildcard: true,
            minor_wildcard: true,
        }
    }

    pub fn major_only(major: u32) -> Self {
        Self {
            major: Some(major),
            minor: None,
            major_wildcard: false,
            minor_wildcard: false,
        }
    }

    pub fn major_minor(major: u32, minor: u32) -> Self {
        Self {
            major: Some(major),
            minor: Some(minor),
            major_wildcard: false,
            minor_wildcard: false,
        }
    }

    pub fn minor_wildcard(major: u32) -> Self {
        Self {
            major: Some(major),
            minor: None,
            major_wildcard: false,
            minor_wildcard: true,
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.major_wildcard || self.minor_wildcard
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.major_wildcard {
            return write!(f, "v*");
        }
        let major = self.major.expect("major present when not whole-wildcard");
        if self.minor_wildcard {
            return write!(f, "v{major}.*");
        }
        match self.minor {
            Some(minor) => write!(f, "v{major}.{minor}"),
            None => write!(f, "v{major}"),
        }
    }
}

/// The value of a `[name=value]` query attribute.
///
/// Carries both the raw textual form (always present, used for rendering)
/// and — when the raw text itself parses as a CTI — the parsed
/// sub-[`Expression`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttributeValue {
    raw: String,
    expression: Option<Box<Expression>>,
}

impl QueryAttributeValue {
    /// Build a value from raw text, attempting to parse it as a CTI.
    ///
    /// Parsing uses a reference-mode sub-parser configured with no allowed
    /// dynamic parameters, matching the rule that interpolation must not
    /// recurse through dynamic-parameter cycles.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let expression = Parser::reference_only()
            .parse_reference(&raw)
            .ok()
            .map(Box::new);
        Self { raw, expression }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_deref()
    }

    pub fn is_expression(&self) -> bool {
        self.expression.is_some()
    }
}

/// A parsed CTI identifier, reference, query or attribute selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub chain: Vec<Node>,
    pub query_attributes: IndexMap<String, QueryAttributeValue>,
    pub attribute_selector: Option<String>,
    pub anonymous_entity_uuid: Option<Uuid>,
}

impl Expression {
    pub fn new(chain: Vec<Node>) -> Self {
        Self {
            chain,
            query_attributes: IndexMap::new(),
            attribute_selector: None,
            anonymous_entity_uuid: None,
        }
    }

    /// The last node in the chain — the entity this expression identifies.
    pub fn leaf(&self) -> Option<&Node> {
        self.chain.last()
    }

    /// True if any node in the chain carries a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.chain.iter().any(Node::has_wildcard)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cti.")?;
        for (i, node) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, "~")?;
            }
            write!(f, "{node}")?;
        }
        if let Some(uuid) = self.anonymous_entity_uuid {
            write!(f, "~{uuid}")?;
        }
        if !self.query_attributes.is_empty() {
            write!(f, "[")?;
            for (i, (key, value)) in self.query_attributes.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                let escaped = value.raw().replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "{key}=\"{escaped}\"")?;
            }
            write!(f, "]")?;
        }
        if let Some(selector) = &self.attribute_selector {
            write!(f, "@{selector}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Expression {
    type Err = CtiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::permissive().parse(s)
    }
}
