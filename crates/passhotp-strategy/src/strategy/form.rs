//! `application/x-www-form-urlencoded` decoding into nested request values.
//!
//! Bracket keys build nested maps (`otp[code]=1` → `{otp: {code: "1"}}`),
//! `[]` appends to a list, and a repeated plain key collects its values
//! into a list.

use crate::strategy::types::RequestValue;
use std::collections::BTreeMap;

/// Decode a urlencoded string (query string or form body).
pub fn parse_urlencoded(input: &str) -> Result<RequestValue, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(input)?;
    let mut root = BTreeMap::new();
    for (key, value) in pairs {
        insert(&mut root, &split_key(&key), value);
    }
    Ok(RequestValue::Map(root))
}

/// `a[b][]` → `["a", "b", ""]`. A key with unbalanced brackets is kept whole.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert(map: &mut BTreeMap<String, RequestValue>, segments: &[String], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        match map.get_mut(head) {
            None => {
                map.insert(head.clone(), RequestValue::Scalar(value));
            }
            Some(RequestValue::List(items)) => items.push(RequestValue::Scalar(value)),
            Some(existing @ RequestValue::Scalar(_)) => {
                let first = std::mem::take(existing);
                *existing = RequestValue::List(vec![first, RequestValue::Scalar(value)]);
            }
            // a plain key colliding with a nested one keeps the nested value
            Some(RequestValue::Map(_)) => {}
        }
        return;
    }

    let child = map.entry(head.clone()).or_insert_with(|| {
        if rest[0].is_empty() {
            RequestValue::List(Vec::new())
        } else {
            RequestValue::Map(BTreeMap::new())
        }
    });
    match child {
        RequestValue::Map(inner) => insert(inner, rest, value),
        RequestValue::List(items) => append(items, rest, value),
        RequestValue::Scalar(_) => {}
    }
}

/// `rest` starts with the `[]` segment that selected the list.
fn append(items: &mut Vec<RequestValue>, rest: &[String], value: String) {
    match rest.split_first() {
        Some((head, tail)) if head.is_empty() => {
            if tail.is_empty() {
                items.push(RequestValue::Scalar(value));
            } else {
                let mut inner = BTreeMap::new();
                insert(&mut inner, tail, value);
                items.push(RequestValue::Map(inner));
            }
        }
        _ => {}
    }
}
