//! Matching monotonicity: wildcarding a concrete node only ever widens the
//! set of identifiers a pattern matches. Turning part of a pattern that
//! already matches `concrete` into a wildcard must keep it matching.

use cti_core::Parser;
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("ab".to_string()),
        Just("vend".to_string()),
        Just("pkg_one".to_string()),
    ]
}

fn concrete_identifier() -> impl Strategy<Value = (String, String, String, u32, u32)> {
    (segment(), segment(), segment(), segment(), 1u32..20, 0u32..20)
        .prop_map(|(vendor, package, e1, e2, major, minor)| {
            (vendor, package, format!("{e1}.{e2}"), major, minor)
        })
}

proptest! {
    #[test]
    fn entity_name_wildcard_preserves_match((vendor, package, entity, major, minor) in concrete_identifier()) {
        let parser = Parser::permissive();
        let concrete_str = format!("cti.{vendor}.{package}.{entity}.v{major}.{minor}");
        let concrete = parser.parse_identifier(&concrete_str).unwrap();

        let prefix = entity.split('.').next().unwrap();
        let wildcard_pattern_str = format!("cti.{vendor}.{package}.{prefix}.*");
        let pattern = parser.parse_reference(&wildcard_pattern_str).unwrap();

        prop_assert!(pattern.matches(&concrete, false).unwrap());
    }

    #[test]
    fn version_wildcard_preserves_match((vendor, package, entity, major, minor) in concrete_identifier()) {
        let parser = Parser::permissive();
        let concrete_str = format!("cti.{vendor}.{package}.{entity}.v{major}.{minor}");
        let concrete = parser.parse_identifier(&concrete_str).unwrap();

        let exact_pattern = parser.parse_reference(&concrete_str).unwrap();
        prop_assert!(exact_pattern.matches(&concrete, false).unwrap());

        let minor_wildcard_str = format!("cti.{vendor}.{package}.{entity}.v{major}.*");
        let minor_wildcard_pattern = parser.parse_reference(&minor_wildcard_str).unwrap();
        prop_assert!(minor_wildcard_pattern.matches(&concrete, false).unwrap());

        let whole_wildcard_str = format!("cti.{vendor}.{package}.{entity}.v*");
        let whole_wildcard_pattern = parser.parse_reference(&whole_wildcard_str).unwrap();
        prop_assert!(whole_wildcard_pattern.matches(&concrete, false).unwrap());
    }

    #[test]
    fn vendor_and_package_wildcard_preserves_match((vendor, package, entity, major, minor) in concrete_identifier()) {
        let parser = Parser::permissive();
        let concrete_str = format!("cti.{vendor}.{package}.{entity}.v{major}.{minor}");
        let concrete = parser.parse_identifier(&concrete_str).unwrap();

        let wildcard_pattern = parser.parse_reference("cti.*.*.*").unwrap();
        prop_assert!(wildcard_pattern.matches(&concrete, false).unwrap());
    }
}
