//! The schema inheritance resolver: merges a type's own JSON-Schema-shaped
//! definition with every ancestor's, rewriting `$ref`s to the child's root.

use serde_json::{Map, Value};

use crate::entity::{AnnotationSet, Entity, TypeEntity};
use crate::error::CtiError;
use crate::registry::Registry;

/// Ancestor CTIs visited during a merge, in walk order (immediate parent
/// first). Informational only — never changes merge semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub ancestors_visited: Vec<String>,
}

/// The standalone schema produced by [`get_merged_schema`]: its `$ref`
/// equals the child's own `$ref`, and `definitions` folds in every
/// ancestor.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSchema {
    pub schema: Value,
    pub report: MergeReport,
}

/// Walks `cti`'s ancestor chain and merges each ancestor's primary
/// definition into the child's, per the merging contract. Ancestor schemas
/// are cloned before merging, so no parent schema is ever mutated.
#[tracing::instrument(skip(registry))]
pub fn get_merged_schema(cti: &str, registry: &Registry) -> Result<MergedSchema, CtiError> {
    let child = as_type(registry, cti)?;
    let child_ref = primary_ref(&child.schema, cti)?;
    let child_def_name = def_name_from_ref(&child_ref, cti)?;

    let mut definitions = as_definitions_map(&child.schema);
    if !definitions.contains_key(&child_def_name) {
        return Err(CtiError::SchemaInvalid {
            path: child_ref.clone(),
            message: format!("primary definition '{child_def_name}' not found"),
        });
    }

    let mut ancestors_visited = Vec::new();
    let mut cursor = child.header.parent.clone();
    let mut ancestor_ctis = Vec::new();
    while let Some(parent_cti) = cursor {
        if ancestors_visited.contains(&parent_cti) {
            return Err(CtiError::SchemaInvalid {
                path: parent_cti,
                message: "self-recursive schema annotation".to_string(),
            });
        }
        let parent = as_type(registry, &parent_cti)?;
        ancestors_visited.push(parent_cti.clone());
        ancestor_ctis.push(parent_cti.clone());
        cursor = parent.header.parent.clone();
    }

    for ancestor_cti in &ancestor_ctis {
        let ancestor = as_type(registry, ancestor_cti)?;
        // Deep copy before merging — the registry's own copy is never touched.
        let ancestor_schema = ancestor.schema.clone();
        let ancestor_ref = primary_ref(&ancestor_schema, ancestor_cti)?;
        let ancestor_def_name = def_name_from_ref(&ancestor_ref, ancestor_cti)?;
        let ancestor_defs = as_definitions_map(&ancestor_schema);

        let ancestor_primary = ancestor_defs.get(&ancestor_def_name).cloned().ok_or_else(|| {
            CtiError::SchemaInvalid {
                path: ancestor_ref.clone(),
                message: format!("primary definition '{ancestor_def_name}' not found"),
            }
        })?;

        let child_primary = definitions
            .get(&child_def_name)
            .cloned()
            .unwrap_or(Value::Null);
        let merged_primary = merge_definition_values(&child_primary, &ancestor_primary);
        definitions.insert(child_def_name.clone(), merged_primary);

        for (name, def) in ancestor_defs {
            if name == ancestor_def_name {
                continue;
            }
            let merged = match definitions.get(&name) {
                Some(existing) => merge_definition_values(existing, &def),
                None => def,
            };
            definitions.insert(name, merged);
        }

        rewrite_refs(&mut definitions, &ancestor_ref, &child_ref);
    }

    let mut schema = Map::new();
    schema.insert("$ref".to_string(), Value::String(child_ref));
    schema.insert("definitions".to_string(), Value::Object(definitions));

    Ok(MergedSchema {
        schema: Value::Object(schema),
        report: MergeReport { ancestors_visited },
    })
}

/// Rejects `(cti.schema)` annotations that name the owning entity itself
/// outside a union (`anyOf`/`oneOf`) branch.
pub fn validate_no_illegal_self_reference(entity: &TypeEntity) -> Result<(), CtiError> {
    for (path, annotation) in entity.traits_annotations.iter().chain(entity.header.annotations.iter()) {
        check_self_reference(&entity.header.cti, path, annotation)?;
    }
    Ok(())
}

fn check_self_reference(own_cti: &str, path: &str, annotation: &AnnotationSet) -> Result<(), CtiError> {
    let Some(Some(schema_ref)) = &annotation.schema else {
        return Ok(());
    };
    let in_union_context = path.contains("anyOf") || path.contains("oneOf");
    if !in_union_context && schema_ref.read_as_string_list().iter().any(|n| n == own_cti) {
        return Err(CtiError::SchemaInvalid {
            path: path.to_string(),
            message: "self-recursive schema annotation".to_string(),
        });
    }
    Ok(())
}

fn as_type<'a>(registry: &'a Registry, cti: &str) -> Result<&'a TypeEntity, CtiError> {
    match registry.get(cti) {
        Some(Entity::Type(t)) => Ok(t),
        _ => Err(CtiError::SchemaMissing {
            cti: cti.to_string(),
        }),
    }
}

fn primary_ref(schema: &Value, cti: &str) -> Result<String, CtiError> {
    schema
        .get("$ref")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CtiError::SchemaInvalid {
            path: "#".to_string(),
            message: format!("type '{cti}' schema has no top-level '$ref'"),
        })
}

fn def_name_from_ref(ref_str: &str, cti: &str) -> Result<String, CtiError> {
    ref_str
        .strip_prefix("#/definitions/")
        .map(str::to_string)
        .ok_or_else(|| CtiError::SchemaInvalid {
            path: ref_str.to_string(),
            message: format!("'{cti}' \\$ref does not point into #/definitions/"),
        })
}

fn as_definitions_map(schema: &Value) -> Map<String, Value> {
    schema
        .get("definitions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Merges `ancestor` into `child`, child values taking precedence.
/// `properties` are unioned (child wins per key); `anyOf` arrays are
/// combined element-wise with the same policy; other keywords are
/// overwritten by the child's value when present.
fn merge_definition_values(child: &Value, ancestor: &Value) -> Value {
    let child_obj = as_object(child);
    let ancestor_obj = as_object(ancestor);
    let mut result = ancestor_obj.clone();

    for (key, child_val) in &child_obj {
        match key.as_str() {
            "properties" => {
                let mut merged_props = result
                    .get("properties")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                if let Some(child_props) = child_val.as_object() {
                    for (pk, pv) in child_props {
                        merged_props.insert(pk.clone(), pv.clone());
                    }
                }
                result.insert("properties".to_string(), Value::Object(merged_props));
            }
            "anyOf" => {
                let ancestor_arr = result
                    .get("anyOf")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let child_arr = child_val.as_array().cloned().unwrap_or_default();
                let len = ancestor_arr.len().max(child_arr.len());
                let mut combined = Vec::with_capacity(len);
                for i in 0..len {
                    combined.push(match (child_arr.get(i), ancestor_arr.get(i)) {
                        (Some(c), Some(a)) => merge_definition_values(c, a),
                        (Some(c), None) => c.clone(),
                        (None, Some(a)) => a.clone(),
                        (None, None) => unreachable!(),
                    });
                }
                result.insert("anyOf".to_string(), Value::Array(combined));
            }
            _ => {
                result.insert(key.clone(), child_val.clone());
            }
        }
    }

    Value::Object(result)
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn rewrite_refs(definitions: &mut Map<String, Value>, old_ref: &str, new_ref: &str) {
    for value in definitions.values_mut() {
        rewrite_refs_in_value(value, old_ref, new_ref);
    }
}

fn rewrite_refs_in_value(value: &mut Value, old_ref: &str, new_ref: &str) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("$ref") {
                if r == old_ref {
                    map.insert("$ref".to_string(), Value::String(new_ref.to_string()));
                }
            }
            for v in map.values_mut() {
                rewrite_refs_in_value(v, old_ref, new_ref);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                rewrite_refs_in_value(v, old_ref, new_ref);
            }
        }
        _ => {}
    }
}
