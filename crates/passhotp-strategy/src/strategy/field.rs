//! Code extraction from nested request data.
//!
//! A field name may address a nested value with bracket notation:
//! `otp[code]` reads `data["otp"]["code"]`.

use crate::strategy::types::RequestValue;

/// Split a bracket path into segments: `a[b][c]` → `["a", "b", "c"]`.
///
/// Closing brackets are dropped and the remainder is split on opening
/// brackets, so `a[]` yields `["a", ""]`.
pub fn parse_path(field: &str) -> Vec<String> {
    field.replace(']', "").split('[').map(str::to_string).collect()
}

/// Walk `data` along `segments` and return the scalar found at the end.
///
/// Returns `None` when a segment is missing, when a scalar is reached with
/// segments still left, or when the path ends on a map or list.
pub fn lookup<'a>(data: &'a RequestValue, segments: &[String]) -> Option<&'a str> {
    let mut node = data;
    for segment in segments {
        node = node.get(segment)?;
    }
    node.as_str()
}

/// Read the submitted code for `field`, preferring the body over the query.
///
/// An empty string counts as absent, so an empty body field falls back to
/// the query.
pub fn extract_code<'a>(
    body: Option<&'a RequestValue>,
    query: Option<&'a RequestValue>,
    field: &str,
) -> Option<&'a str> {
    let segments = parse_path(field);
    let from = |source: Option<&'a RequestValue>| {
        source
            .and_then(|data| lookup(data, &segments))
            .filter(|code| !code.is_empty())
    };
    from(body).or_else(|| from(query))
}
