//! Annotation projection: GJSON-style path accessors over merged schemas
//! and instance values, plus parent-chain annotation lookup.

use serde_json::Value;

use crate::entity::{AnnotationSet, Entity, JsonPath};
use crate::error::CtiError;
use crate::registry::Registry;
use crate::schema;
use crate::schema::util::split_path;

fn annotation_path_err(path: &str, message: impl Into<String>) -> CtiError {
    CtiError::AnnotationPath {
        path: path.to_string(),
        message: message.into(),
    }
}

fn split_json_path(path: &str) -> Vec<&str> {
    let stripped = path.strip_prefix('.').unwrap_or(path);
    if stripped.is_empty() {
        Vec::new()
    } else {
        stripped.split('.').collect()
    }
}

/// GJSON-style read over an already-parsed document. `.` returns the root,
/// `.foo.bar` descends into objects, and a *trailing* `.#` returns the
/// array itself rather than indexing into it.
pub fn get_value_at(path: &str, value: &Value) -> Result<Value, CtiError> {
    let segments = split_json_path(path);
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "#" {
            if i != segments.len() - 1 {
                return Err(annotation_path_err(
                    path,
                    "'#' is only supported as the final path segment",
                ));
            }
            return match current {
                Value::Array(_) => Ok(current.clone()),
                _ => Err(annotation_path_err(path, "'#' requires an array at this position")),
            };
        }
        current = match current {
            Value::Object(map) => map
                .get(*segment)
                .ok_or_else(|| annotation_path_err(path, format!("no property '{segment}'")))?,
            Value::Array(arr) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| annotation_path_err(path, format!("'{segment}' is not an array index")))?;
                arr.get(index)
                    .ok_or_else(|| annotation_path_err(path, format!("index {index} out of bounds")))?
            }
            _ => {
                return Err(annotation_path_err(
                    path,
                    format!("cannot descend into a scalar at '{segment}'"),
                ))
            }
        };
    }
    Ok(current.clone())
}

/// The byte-oriented sibling of [`get_value_at`]: locates the target's span
/// with a single scan over raw JSON bytes (tracking string/bracket nesting,
/// never fully parsing the document), then parses only that slice.
pub fn get_value_at_bytes(path: &str, bytes: &[u8]) -> Result<Value, CtiError> {
    let segments = split_json_path(path);
    let mut span_start = skip_ws(bytes, 0);
    let mut span_end = scan_value_span(bytes, span_start)?;

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "#" {
            if i != segments.len() - 1 {
                return Err(annotation_path_err(
                    path,
                    "'#' is only supported as the final path segment",
                ));
            }
            if bytes.get(span_start) != Some(&b'[') {
                return Err(annotation_path_err(path, "'#' requires an array at this position"));
            }
            break;
        }
        match bytes.get(span_start) {
            Some(b'{') => match find_object_value_span(bytes, span_start, segment)? {
                Some((s, e)) => {
                    span_start = s;
                    span_end = e;
                }
                None => return Err(annotation_path_err(path, format!("no property '{segment}'"))),
            },
            Some(b'[') => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| annotation_path_err(path, format!("'{segment}' is not an array index")))?;
                match find_array_value_span(bytes, span_start, index)? {
                    Some((s, e)) => {
                        span_start = s;
                        span_end = e;
                    }
                    None => return Err(annotation_path_err(path, format!("index {index} out of bounds"))),
                }
            }
            _ => {
                return Err(annotation_path_err(
                    path,
                    format!("cannot descend into a scalar at '{segment}'"),
                ))
            }
        }
    }

    serde_json::from_slice(&bytes[span_start..span_end])
        .map_err(|e| annotation_path_err(path, format!("invalid json at located span: {e}")))
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn scan_string_end(bytes: &[u8], pos: usize) -> Result<usize, CtiError> {
    let mut i = pos + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(annotation_path_err("<bytes>", "unterminated string"))
}

/// Returns the exclusive end offset of the JSON value starting at `pos`
/// (after skipping leading whitespace).
fn scan_value_span(bytes: &[u8], pos: usize) -> Result<usize, CtiError> {
    let pos = skip_ws(bytes, pos);
    match bytes.get(pos) {
        Some(b'"') => scan_string_end(bytes, pos),
        Some(&open @ (b'{' | b'[')) => {
            let close = if open == b'{' { b'}' } else { b']' };
            let mut depth = 1usize;
            let mut i = pos + 1;
            while i < bytes.len() && depth > 0 {
                match bytes[i] {
                    b'"' => {
                        i = scan_string_end(bytes, i)?;
                        continue;
                    }
                    c if c == open => depth += 1,
                    c if c == close => depth -= 1,
                    _ => {}
                }
                i += 1;
            }
            if depth != 0 {
                return Err(annotation_path_err("<bytes>", "unterminated container"));
            }
            Ok(i)
        }
        Some(_) => {
            let mut i = pos;
            while i < bytes.len() && !matches!(bytes[i], b',' | b'}' | b']') && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            Ok(i)
        }
        None => Err(annotation_path_err("<bytes>", "unexpected end of input")),
    }
}

fn find_object_value_span(bytes: &[u8], obj_start: usize, key: &str) -> Result<Option<(usize, usize)>, CtiError> {
    let mut i = skip_ws(bytes, obj_start + 1);
    if bytes.get(i) == Some(&b'}') {
        return Ok(None);
    }
    loop {
        i = skip_ws(bytes, i);
        if bytes.get(i) != Some(&b'"') {
            return Err(annotation_path_err("<bytes>", "expected object key"));
        }
        let key_end = scan_string_end(bytes, i)?;
        let found_key = std::str::from_utf8(&bytes[i + 1..key_end - 1])
            .map_err(|_| annotation_path_err("<bytes>", "invalid utf8 in object key"))?;
        i = skip_ws(bytes, key_end);
        if bytes.get(i) != Some(&b':') {
            return Err(annotation_path_err("<bytes>", "expected ':'"));
        }
        i = skip_ws(bytes, i + 1);
        let value_start = i;
        let value_end = scan_value_span(bytes, i)?;
        if found_key == key {
            return Ok(Some((value_start, value_end)));
        }
        i = skip_ws(bytes, value_end);
        match bytes.get(i) {
            Some(b',') => i += 1,
            Some(b'}') => return Ok(None),
            _ => return Err(annotation_path_err("<bytes>", "expected ',' or '}'")),
        }
    }
}

fn find_array_value_span(bytes: &[u8], arr_start: usize, target_index: usize) -> Result<Option<(usize, usize)>, CtiError> {
    let mut i = skip_ws(bytes, arr_start + 1);
    if bytes.get(i) == Some(&b']') {
        return Ok(None);
    }
    let mut index = 0;
    loop {
        i = skip_ws(bytes, i);
        let value_start = i;
        let value_end = scan_value_span(bytes, i)?;
        if index == target_index {
            return Ok(Some((value_start, value_end)));
        }
        index += 1;
        i = skip_ws(bytes, value_end);
        match bytes.get(i) {
            Some(b',') => i += 1,
            Some(b']') => return Ok(None),
            _ => return Err(annotation_path_err("<bytes>", "expected ',' or ']'")),
        }
    }
}

/// Walks `entity`'s parent chain (self first) and returns the first
/// annotation registered under `key`, along with the cti that carries it.
pub fn find_annotations_by_key_in_chain<'a>(
    registry: &'a Registry,
    entity: &'a Entity,
    key: &str,
) -> Option<(&'a str, &'a AnnotationSet)> {
    for ancestor in registry.ancestor_chain(entity) {
        if let Some(annotation) = ancestor.annotations().get(key) {
            return Some((ancestor.cti(), annotation));
        }
    }
    None
}

/// Same walk as [`find_annotations_by_key_in_chain`], but matching on an
/// arbitrary predicate over `(path, annotation)` pairs.
pub fn find_annotations_by_predicate_in_chain<'a, P>(
    registry: &'a Registry,
    entity: &'a Entity,
    mut predicate: P,
) -> Option<(&'a str, &'a JsonPath, &'a AnnotationSet)>
where
    P: FnMut(&JsonPath, &AnnotationSet) -> bool,
{
    for ancestor in registry.ancestor_chain(entity) {
        for (path, annotation) in ancestor.annotations() {
            if predicate(path, annotation) {
                return Some((ancestor.cti(), path, annotation));
            }
        }
    }
    None
}

/// Resolves a dotted attribute selector (e.g. `foo.bar`) against `cti`'s
/// **merged** schema, so inherited properties are visible.
pub fn get_schema_by_attribute_selector_in_chain(
    registry: &Registry,
    cti: &str,
    selector: &str,
) -> Result<Value, CtiError> {
    let merged = schema::get_merged_schema(cti, registry)?;
    let root_ref = merged
        .schema
        .get("$ref")
        .and_then(Value::as_str)
        .ok_or_else(|| annotation_path_err(selector, "merged schema has no top-level '$ref'"))?;
    let mut current = resolve_ref(&merged.schema, root_ref)?;

    for segment in selector.split('.').filter(|s| !s.is_empty()) {
        let properties = current.get("properties").and_then(Value::as_object).ok_or_else(|| {
            annotation_path_err(selector, format!("no 'properties' while resolving '{segment}'"))
        })?;
        let next = properties
            .get(segment)
            .ok_or_else(|| annotation_path_err(selector, format!("no property '{segment}'")))?;
        current = match next.get("$ref").and_then(Value::as_str) {
            Some(r) => resolve_ref(&merged.schema, r)?,
            None => next,
        };
    }

    Ok(current.clone())
}

fn resolve_ref<'a>(root: &'a Value, pointer: &str) -> Result<&'a Value, CtiError> {
    if !pointer.starts_with('#') {
        return Err(annotation_path_err(pointer, "unsupported \\$ref target"));
    }
    let mut current = root;
    for segment in split_path(pointer) {
        current = current
            .get(segment.as_str())
            .ok_or_else(|| annotation_path_err(pointer, format!("no such pointer segment '{segment}'")))?;
    }
    Ok(current)
}
