//! The entity model: typed CTI records (`Type`/`Instance`) and the
//! annotation vocabulary attached to them.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CtiError;

/// Access modifier controlling cross-vendor/package visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Protected,
    Private,
}

impl Default for Access {
    fn default() -> Self {
        Access::Protected
    }
}

/// A value that may appear as either a single string or a list of strings
/// in the annotation vocabulary (`cti.cti`, `cti.schema`, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Normalises either shape into a `Vec<String>`.
    pub fn read_as_string_list(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s.clone()],
            StringOrList::Many(v) => v.clone(),
        }
    }
}

/// `cti.reference` may be a bare flag, a single target, or a list of
/// targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceAnnotation {
    Flag(bool),
    Single(String),
    Many(Vec<String>),
}

fn deserialize_present_but_maybe_null<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::deserialize(deserializer)
}

/// A sparse record of CTI-specific hints attached at a [`JsonPath`] inside a
/// schema or a value.
///
/// Every field is independently optional. `schema` additionally
/// distinguishes "absent" from "present and `null`" (`null` means
/// "nullable") via a nested `Option`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSet {
    pub cti: Option<StringOrList>,
    pub id: Option<bool>,
    pub reference: Option<ReferenceAnnotation>,
    pub overridable: Option<bool>,
    #[serde(rename = "final")]
    pub is_final: Option<bool>,
    pub resilient: Option<bool>,
    pub asset: Option<bool>,
    pub l10n: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present_but_maybe_null"
    )]
    pub schema: Option<Option<StringOrList>>,
    pub meta: Option<String>,
    #[serde(rename = "propertyNames")]
    pub property_names: Option<serde_json::Value>,
    pub access: Option<Access>,
    pub access_field: Option<bool>,
    pub display_name: Option<bool>,
    pub description: Option<bool>,
}

/// A GJSON-style dotted selector into a schema fragment or instance value.
/// Begins with `.`; `.#` denotes an array, `.foo.bar` descends into objects.
pub type JsonPath = String;

/// Fields shared by both `Type` and `Instance` entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHeader {
    pub cti: String,
    pub is_final: bool,
    pub access: Access,
    pub resilient: bool,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// The parent's `cti` string. Never a pointer into the registry — see
    /// module docs on why entities stay independently `Send + Sync`.
    pub parent: Option<String>,
    pub annotations: IndexMap<JsonPath, AnnotationSet>,
}

impl EntityHeader {
    pub fn new(cti: impl Into<String>) -> Self {
        Self {
            cti: cti.into(),
            is_final: true,
            access: Access::Protected,
            resilient: false,
            display_name: None,
            description: None,
            parent: None,
            annotations: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntity {
    pub header: EntityHeader,
    pub schema: serde_json::Value,
    pub traits_schema: Option<serde_json::Value>,
    pub traits_annotations: IndexMap<JsonPath, AnnotationSet>,
    pub traits: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceEntity {
    pub header: EntityHeader,
    pub values: serde_json::Value,
}

/// A registered CTI entity: either a `Type` (carries a schema) or an
/// `Instance` (carries values and must be `final`).
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Type(TypeEntity),
    Instance(InstanceEntity),
}

impl Entity {
    pub fn header(&self) -> &EntityHeader {
        match self {
            Entity::Type(t) => &t.header,
            Entity::Instance(i) => &i.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut EntityHeader {
        match self {
            Entity::Type(t) => &mut t.header,
            Entity::Instance(i) => &mut i.header,
        }
    }

    pub fn cti(&self) -> &str {
        &self.header().cti
    }

    pub fn access(&self) -> Access {
        self.header().access
    }

    pub fn is_final(&self) -> bool {
        self.header().is_final
    }

    pub fn parent_cti(&self) -> Option<&str> {
        self.header().parent.as_deref()
    }

    pub fn annotations(&self) -> &IndexMap<JsonPath, AnnotationSet> {
        &self.header().annotations
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Entity::Type(_))
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, Entity::Instance(_))
    }

    /// `a.is_accessible_by(b)` per the §4.C access-control rule.
    pub fn is_accessible_by(&self, accessor: &Entity) -> Result<(), CtiError> {
        let accessible = match self.access() {
            Access::Public => true,
            Access::Protected => vendor_of(self.cti()) == vendor_of(accessor.cti()),
            Access::Private => {
                vendor_package_of(self.cti()) == vendor_package_of(accessor.cti())
            }
        };
        if accessible {
            Ok(())
        } else {
            Err(CtiError::AccessDenied {
                cti: self.cti().to_string(),
                accessor: accessor.cti().to_string(),
                access: self.access(),
            })
        }
    }

    /// String-prefix containment: is `self`'s identifier prefixed by `type_cti`?
    pub fn is_a(&self, type_cti: &str) -> bool {
        !type_cti.is_empty() && !self.cti().is_empty() && self.cti().starts_with(type_cti)
    }

    /// Is `self` a *direct* child of `type_cti` (exactly one more `~`-link)?
    pub fn is_child_of(&self, type_cti: &str) -> bool {
        if type_cti.is_empty() || self.cti().is_empty() {
            return false;
        }
        match self.cti().strip_prefix(type_cti) {
            Some(rest) => rest.starts_with('~') && !rest[1..].contains('~'),
            None => false,
        }
    }
}

fn vendor_of(cti: &str) -> Option<&str> {
    cti.strip_prefix("cti.")?.split('.').next()
}

fn vendor_package_of(cti: &str) -> Option<(&str, &str)> {
    let rest = cti.strip_prefix("cti.")?;
    let mut parts = rest.splitn(3, '.');
    Some((parts.next()?, parts.next()?))
}

/// `$sourcePath`/`$originalPath`/`$name`/`$annotationType` provenance block
/// carried by a cached-entity record, per §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMap {
    #[serde(rename = "$sourcePath")]
    pub source_path: Option<String>,
    #[serde(rename = "$originalPath")]
    pub original_path: Option<String>,
    #[serde(rename = "$name")]
    pub name: Option<String>,
    #[serde(rename = "$annotationType")]
    pub annotation_type: Option<serde_json::Value>,
}

/// The on-disk cached-entity JSON record an external packager produces and
/// the registry bootstraps from. `schema` XOR `values` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntityRecord {
    #[serde(rename = "final")]
    pub is_final: bool,
    pub cti: String,
    #[serde(default)]
    pub resilient: bool,
    #[serde(default)]
    pub access: Access,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub values: Option<serde_json::Value>,
    pub schema: Option<serde_json::Value>,
    pub traits_schema: Option<serde_json::Value>,
    pub traits: Option<serde_json::Value>,
    pub traits_annotations: Option<IndexMap<JsonPath, AnnotationSet>>,
    pub annotations: Option<IndexMap<JsonPath, AnnotationSet>>,
    pub source_map: Option<SourceMap>,
}

impl CachedEntityRecord {
    /// Converts the on-disk record into a registry [`Entity`]. The parent
    /// pointer is left unset — `Registry::resolve_parents` fills it in once
    /// the whole batch is registered.
    pub fn into_entity(self) -> Result<Entity, CtiError> {
        let header = EntityHeader {
            cti: self.cti.clone(),
            is_final: self.is_final,
            access: self.access,
            resilient: self.resilient,
            display_name: self.display_name,
            description: self.description,
            parent: None,
            annotations: self.annotations.unwrap_or_default(),
        };

        match (self.schema, self.values) {
            (Some(schema), None) => Ok(Entity::Type(TypeEntity {
                header,
                schema,
                traits_schema: self.traits_schema,
                traits_annotations: self.traits_annotations.unwrap_or_default(),
                traits: self.traits,
            })),
            (None, Some(values)) => {
                if !self.is_final {
                    return Err(CtiError::Parse {
                        phase: "load cached entity".to_string(),
                        message: format!("instance '{}' must be final", self.cti),
                    });
                }
                Ok(Entity::Instance(InstanceEntity { header, values }))
            }
            _ => Err(CtiError::Parse {
                phase: "load cached entity".to_string(),
                message: format!(
                    "entity '{}' must carry exactly one of 'schema' or 'values'",
                    self.cti
                ),
            }),
        }
    }
}
