//! JSON Pointer utilities shared by the schema resolver and the annotation
//! projector: RFC 6901 segment escaping/unescaping and pointer splitting.

use std::borrow::Cow;

/// Unescape a single path segment per RFC 6901. Order matters: `~1` before
/// `~0`, to avoid double-unescaping.
pub fn unescape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains("~0") || segment.contains("~1") {
        Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Split a JSON Pointer into decoded segments, stripping a leading `#`.
pub fn split_path(path: &str) -> Vec<String> {
    let stripped = path.strip_prefix('#').unwrap_or(path);
    if stripped.is_empty() {
        return Vec::new();
    }
    let mut segments_iter = stripped.split('/');
    if stripped.starts_with('/') {
        segments_iter.next();
    }
    segments_iter
        .map(|s| unescape_pointer_segment(s).into_owned())
        .collect()
}
