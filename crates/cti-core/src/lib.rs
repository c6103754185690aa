//! Grammar, registry and schema resolver for Cross-domain Typed Identifiers
//! (CTI).
//!
//! A CTI identifies an entity by its origin (vendor/package) rather than by
//! who stores or transmits it: `cti.vendor.package.entity.version`, chained
//! with `~` to express derivation from a parent type. This crate provides:
//!
//! - [`parser`] / [`lexer`] / [`ast`]: a hand-written grammar engine for
//!   identifiers, references, queries and attribute selectors.
//! - [`matcher`]: wildcard-aware matching between a pattern and a concrete
//!   identifier.
//! - [`interpolate`]: substituting `${name}` dynamic parameters.
//! - [`entity`] / [`registry`]: the typed entity model and an in-memory
//!   registry with uniqueness, parent linking and access control.
//! - [`schema`]: JSON-Schema-shaped inheritance — merging a type's schema
//!   with its ancestors'.
//! - [`annotation`]: JSON-path-based accessors over merged schemas and
//!   values.

pub mod annotation;
pub mod ast;
pub mod config;
pub mod entity;
pub mod error;
pub mod interpolate;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod registry;
pub mod schema;

pub use ast::{Expression, Node, QueryAttributeValue, Version};
pub use config::ParserConfig;
pub use entity::{
    Access, AnnotationSet, CachedEntityRecord, Entity, EntityHeader, InstanceEntity, JsonPath,
    ReferenceAnnotation, SourceMap, StringOrList, TypeEntity,
};
pub use error::{CtiError, ErrorCode};
pub use parser::Parser;
pub use registry::Registry;
pub use schema::{get_merged_schema, validate_no_illegal_self_reference, MergeReport, MergedSchema};
