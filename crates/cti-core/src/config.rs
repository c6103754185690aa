//! Configuration for the CTI parser.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Options controlling which grammar constructs a [`Parser`](crate::parser::Parser)
/// accepts.
///
/// ## Serialization Format
///
/// Fields are serialized in `kebab-case`, consistent with the rest of this
/// crate's config surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ParserConfig {
    /// Whether a trailing `~<uuid>` anonymous-entity segment is allowed.
    pub allow_anonymous_entity: bool,
    /// Names permitted inside `${name}` dynamic-parameter holes. Empty means
    /// no dynamic parameters are allowed at all.
    pub allowed_dynamic_parameter_names: HashSet<String>,
}

impl ParserConfig {
    /// A config with every grammar extension disabled — the most restrictive
    /// starting point, matching `parse_identifier`'s requirements.
    pub fn strict() -> Self {
        Self::default()
    }

    /// A config that allows anonymous entities but no dynamic parameters —
    /// the configuration `interpolate` uses for its sub-parser, per the
    /// "no allowed dynamic parameters to prevent cycles" rule.
    pub fn allow_anonymous() -> Self {
        Self {
            allow_anonymous_entity: true,
            allowed_dynamic_parameter_names: HashSet::new(),
        }
    }

    pub fn with_dynamic_parameters<I: IntoIterator<Item = String>>(mut self, names: I) -> Self {
        self.allowed_dynamic_parameter_names.extend(names);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_config_serde_round_trip() {
        let mut cfg = ParserConfig::allow_anonymous();
        cfg.allowed_dynamic_parameter_names.insert("k".to_string());

        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"allow-anonymous-entity\""));
        assert!(json.contains("\"allowed-dynamic-parameter-names\""));

        let round_tripped: ParserConfig = serde_json::from_str(&json).unwrap();
        assert!(round_tripped.allow_anonymous_entity);
        assert!(round_tripped
            .allowed_dynamic_parameter_names
            .contains("k"));
    }

    #[test]
    fn test_parser_config_defaults_when_omitted() {
        let cfg: ParserConfig = serde_json::from_str("{}").unwrap();
        assert!(!cfg.allow_anonymous_entity);
        assert!(cfg.allowed_dynamic_parameter_names.is_empty());
    }
}
