//! JSON-LD key lookup helpers.
//!
//! Connectors emit the same term in several surface forms: bare (`action`),
//! compacted (`odrl:action`) or expanded (`http://www.w3.org/ns/odrl/2/action`).

use serde_json::{Map, Value};

/// ODRL vocabulary namespace IRI.
pub const ODRL_NAMESPACE: &str = "http://www.w3.org/ns/odrl/2/";

const ODRL_PREFIX: &str = "odrl:";

pub(crate) const AT_ID: &str = "@id";
pub(crate) const AT_TYPE: &str = "@type";
pub(crate) const AT_VALUE: &str = "@value";

/// Keys that never contribute to a policy digest.
pub(crate) const METADATA_KEYS: &[&str] = &[
    "@id",
    "@type",
    "@context",
    "metadata",
    "profile",
    "odrl:profile",
    "uid",
    "odrl:uid",
];

/// Look up an ODRL term in any of its surface forms.
pub(crate) fn field<'a>(object: &'a Map<String, Value>, term: &str) -> Option<&'a Value> {
    if let Some(value) = object.get(term) {
        return Some(value);
    }
    if let Some(value) = object.get(&format!("{ODRL_PREFIX}{term}")) {
        return Some(value);
    }
    object.get(&format!("{ODRL_NAMESPACE}{term}"))
}

/// Whether the term is present in any surface form.
pub(crate) fn has_field(object: &Map<String, Value>, term: &str) -> bool {
    field(object, term).is_some()
}

/// Read an identifier that is either a plain string or a `{"@id": ...}` node.
pub(crate) fn id_value(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get(AT_ID)
            .or_else(|| map.get(AT_VALUE))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Strip the ODRL prefix or namespace from a term.
pub(crate) fn strip_odrl(term: &str) -> &str {
    term.strip_prefix(ODRL_NAMESPACE)
        .or_else(|| term.strip_prefix(ODRL_PREFIX))
        .unwrap_or(term)
}

/// View a value as a list: arrays as-is, `null` as empty, anything else as one item.
pub(crate) fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}
