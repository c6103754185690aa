//! Merge purity: resolving a child's merged schema never mutates the
//! parent's own schema in the registry, regardless of how the child's
//! properties overlap with the parent's.

use cti_core::entity::{Access, EntityHeader, TypeEntity};
use cti_core::{get_merged_schema, Entity, Registry};
use indexmap::IndexMap;
use proptest::prelude::*;
use serde_json::{json, Value};

fn prop_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("name".to_string()),
        Just("count".to_string()),
        Just("label".to_string()),
        Just("flag".to_string()),
    ]
}

fn prop_type() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("string"), Just("integer"), Just("boolean")]
}

fn parent_and_child_props() -> impl Strategy<Value = (Vec<(String, &'static str)>, Vec<(String, &'static str)>)> {
    (
        prop::collection::vec((prop_name(), prop_type()), 0..4),
        prop::collection::vec((prop_name(), prop_type()), 0..4),
    )
}

fn type_entity(cti: &str, schema: Value) -> Entity {
    let mut header = EntityHeader::new(cti);
    header.access = Access::Public;
    header.is_final = false;
    Entity::Type(TypeEntity {
        header,
        schema,
        traits_schema: None,
        traits_annotations: IndexMap::new(),
        traits: None,
    })
}

proptest! {
    #[test]
    fn merge_never_mutates_parent((parent_props, child_props) in parent_and_child_props()) {
        let mut parent_properties = serde_json::Map::new();
        for (name, ty) in &parent_props {
            parent_properties.insert(name.clone(), json!({"type": ty}));
        }
        let parent_schema = json!({
            "$ref": "#/definitions/Parent",
            "definitions": {
                "Parent": { "type": "object", "properties": Value::Object(parent_properties) }
            }
        });

        let mut child_properties = serde_json::Map::new();
        for (name, ty) in &child_props {
            child_properties.insert(name.clone(), json!({"type": ty}));
        }
        let child_schema = json!({
            "$ref": "#/definitions/Child",
            "definitions": {
                "Child": { "type": "object", "properties": Value::Object(child_properties) }
            }
        });

        let mut registry = Registry::new();
        registry.register(type_entity("cti.a.p.parent.v1.0", parent_schema.clone())).unwrap();
        registry
            .register(type_entity("cti.a.p.parent.v1.0~a.p.child.v1.0", child_schema))
            .unwrap();
        registry.resolve_parents().unwrap();

        let _ = get_merged_schema("cti.a.p.parent.v1.0~a.p.child.v1.0", &registry).unwrap();

        let Entity::Type(parent_after) = registry.get("cti.a.p.parent.v1.0").unwrap() else {
            panic!("expected type entity");
        };
        prop_assert_eq!(&parent_after.schema, &parent_schema);
    }
}
