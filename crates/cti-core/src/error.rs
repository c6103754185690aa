//! Error types for the CTI grammar engine, registry and schema resolver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes.
///
/// These codes form a **stable API contract** — once published, variant names
/// and their serialized `snake_case` strings must never change across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Any grammar violation.
    Parse,
    /// Matching with an attribute selector, or a wildcard on the RHS.
    UnsupportedMatch,
    /// Dynamic parameter key not provided during interpolation.
    InterpolationMissing,
    /// Interpolation value is not a valid CTI, or doesn't match the prefix.
    InterpolationInvalid,
    /// Registry already holds the identifier.
    DuplicateEntity,
    /// Attempt to derive from a `final` type.
    ParentFinal,
    /// Merged schema requested but primary schema absent.
    SchemaMissing,
    /// Ancestor `$ref` does not resolve to a definition.
    SchemaInvalid,
    /// Cross-vendor/package access violates an access modifier.
    AccessDenied,
    /// JSON path or attribute selector does not resolve.
    AnnotationPath,
}

/// Errors returned by every `cti-core` operation.
#[derive(Debug, Error)]
pub enum CtiError {
    #[error("parse {phase}: {message}")]
    Parse { phase: String, message: String },

    #[error("matching with attribute selector unsupported")]
    MatchWithSelector,

    #[error("matching against CTI with wildcard is not supported")]
    MatchAgainstWildcard,

    #[error("dynamic parameter '{name}' not provided")]
    InterpolationMissing { name: String },

    #[error("parse value '{value}' of dynamic parameter '{name}': {reason}")]
    InterpolationInvalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error("duplicate cti entity {cti}")]
    DuplicateEntity { cti: String },

    #[error("cannot derive '{child}' from final type '{parent}': {message}")]
    ParentFinal {
        child: String,
        parent: String,
        message: String,
    },

    #[error("schema missing for type {cti}")]
    SchemaMissing { cti: String },

    #[error("schema invalid at {path}: {message}")]
    SchemaInvalid { path: String, message: String },

    #[error("access denied: {accessor} may not access {cti} ({access:?})")]
    AccessDenied {
        cti: String,
        accessor: String,
        access: crate::entity::Access,
    },

    #[error("annotation path '{path}' does not resolve: {message}")]
    AnnotationPath { path: String, message: String },
}

impl CtiError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CtiError::Parse { .. } => ErrorCode::Parse,
            CtiError::MatchWithSelector | CtiError::MatchAgainstWildcard => {
                ErrorCode::UnsupportedMatch
            }
            CtiError::InterpolationMissing { .. } => ErrorCode::InterpolationMissing,
            CtiError::InterpolationInvalid { .. } => ErrorCode::InterpolationInvalid,
            CtiError::DuplicateEntity { .. } => ErrorCode::DuplicateEntity,
            CtiError::ParentFinal { .. } => ErrorCode::ParentFinal,
            CtiError::SchemaMissing { .. } => ErrorCode::SchemaMissing,
            CtiError::SchemaInvalid { .. } => ErrorCode::SchemaInvalid,
            CtiError::AccessDenied { .. } => ErrorCode::AccessDenied,
            CtiError::AnnotationPath { .. } => ErrorCode::AnnotationPath,
        }
    }

    /// The offending identifier, when this error carries one.
    pub fn cti(&self) -> Option<&str> {
        match self {
            CtiError::DuplicateEntity { cti }
            | CtiError::SchemaMissing { cti }
            | CtiError::AccessDenied { cti, .. } => Some(cti),
            CtiError::ParentFinal { child, .. } => Some(child),
            _ => None,
        }
    }

    /// Produces a structured JSON error for boundary consumers.
    ///
    /// Format: `{"code": "...", "message": "...", "cti": "..." | null}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "cti": self.cti(),
        })
    }
}

/// Prepend context to an error without discarding its kind, per the
/// propagation policy: component-internal failures bubble up untouched
/// with source context appended.
pub fn wrap(context: &str, inner: CtiError) -> CtiError {
    match inner {
        CtiError::Parse { phase, message } => CtiError::Parse {
            phase,
            message: format!("{context}: {message}"),
        },
        CtiError::InterpolationInvalid {
            name,
            value,
            reason,
        } => CtiError::InterpolationInvalid {
            name,
            value,
            reason: format!("{context}: {reason}"),
        },
        CtiError::SchemaInvalid { path, message } => CtiError::SchemaInvalid {
            path,
            message: format!("{context}: {message}"),
        },
        CtiError::AnnotationPath { path, message } => CtiError::AnnotationPath {
            path,
            message: format!("{context}: {message}"),
        },
        CtiError::ParentFinal {
            child,
            parent,
            message,
        } => CtiError::ParentFinal {
            child,
            parent,
            message: format!("{context}: {message}"),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let e = CtiError::DuplicateEntity {
            cti: "cti.a.p.e.v1.0".to_string(),
        };
        assert_eq!(e.error_code(), ErrorCode::DuplicateEntity);
    }

    #[test]
    fn test_to_json_shape() {
        let e = CtiError::SchemaMissing {
            cti: "cti.a.p.e.v1.0".to_string(),
        };
        let json = e.to_json();
        assert_eq!(json["code"], "schema_missing");
        assert_eq!(json["cti"], "cti.a.p.e.v1.0");
        assert!(json["message"].is_string());
    }

    #[test]
    fn test_wrap_prepends_context() {
        let inner = CtiError::Parse {
            phase: "parse vendor".to_string(),
            message: "unexpected end of input".to_string(),
        };
        let wrapped = wrap("parse value 'x' of dynamic parameter 'y'", inner);
        match wrapped {
            CtiError::Parse { message, .. } => {
                assert!(message.contains("parse value 'x' of dynamic parameter 'y'"));
                assert!(message.contains("unexpected end of input"));
            }
            _ => panic!("expected Parse variant"),
        }
    }

    #[test]
    fn test_wrap_prepends_context_to_parent_final() {
        let inner = CtiError::ParentFinal {
            child: "cti.a.p.gr.ns.v1.0~a.p.f.v1.0".to_string(),
            parent: "cti.a.p.gr.ns.v1.0".to_string(),
            message: "parent type is marked final and cannot be derived from".to_string(),
        };
        let wrapped = wrap("resolving parent of 'cti.a.p.gr.ns.v1.0~a.p.f.v1.0'", inner);
        match wrapped {
            CtiError::ParentFinal { message, .. } => {
                assert!(message.contains("resolving parent of"));
                assert!(message.contains("marked final"));
            }
            _ => panic!("expected ParentFinal variant"),
        }
    }
}
