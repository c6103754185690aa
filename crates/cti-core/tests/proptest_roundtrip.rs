//! Round-trip: every identifier the parser accepts renders back to an
//! equal canonical string, which re-parses to an equal AST.

use cti_core::Parser;
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("ab".to_string()),
        Just("vend".to_string()),
        Just("pkg_one".to_string()),
        Just("x1".to_string()),
    ]
}

fn entity_name() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=2).prop_map(|segs| segs.join("."))
}

fn node() -> impl Strategy<Value = String> {
    (segment(), segment(), entity_name(), 1u32..20, 0u32..20)
        .prop_map(|(vendor, package, entity, major, minor)| {
            format!("{vendor}.{package}.{entity}.v{major}.{minor}")
        })
}

fn identifier() -> impl Strategy<Value = String> {
    prop::collection::vec(node(), 1..=3).prop_map(|nodes| format!("cti.{}", nodes.join("~")))
}

proptest! {
    #[test]
    fn round_trip_identifier(input in identifier()) {
        let parser = Parser::permissive();
        let expr = parser.parse_identifier(&input).expect("generated identifier must parse");
        let rendered = expr.to_string();
        prop_assert_eq!(&rendered, &input);

        let reparsed = parser.parse_identifier(&rendered).expect("canonical rendering must reparse");
        prop_assert_eq!(reparsed, expr);
    }
}
