//! Context flattening and redaction.
//!
//! Collector payloads may nest arbitrarily; the stored context is a flat map
//! of dotted keys to scalars. Sensitive keys are masked here so no later stage
//! ever sees the raw value.

use error_collector_protocol::{Context, ContextValue};
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

pub(crate) fn is_sensitive(key: &str, redact_keys: &[String]) -> bool {
    let lc = key.to_lowercase().replace('-', "_");
    redact_keys
        .iter()
        .any(|frag| lc.contains(&frag.to_lowercase().replace('-', "_")))
}

/// Flattens `payload` into dotted scalar keys, masking sensitive entries.
///
/// A sensitive object or array is masked as a whole rather than descended into.
/// JSON `null` values are dropped.
pub fn flatten_context(
    payload: &serde_json::Map<String, Value>,
    redact_keys: &[String],
) -> Context {
    let mut out = Context::new();
    for (key, value) in payload {
        flatten_into(&mut out, key.trim(), value, redact_keys);
    }
    out
}

fn flatten_into(out: &mut Context, key: &str, value: &Value, redact_keys: &[String]) {
    if is_sensitive(key.rsplit('.').next().unwrap_or(key), redact_keys) {
        if !value.is_null() {
            out.insert(key.to_string(), ContextValue::from(REDACTED));
        }
        return;
    }
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(key.to_string(), ContextValue::Bool(*b));
        }
        Value::Number(n) => {
            let scalar = match n.as_i64() {
                Some(i) => ContextValue::Int(i),
                None => ContextValue::Float(n.as_f64().unwrap_or_default()),
            };
            out.insert(key.to_string(), scalar);
        }
        Value::String(s) => {
            out.insert(key.to_string(), ContextValue::Text(s.clone()));
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                flatten_into(out, &format!("{key}.{idx}"), item, redact_keys);
            }
        }
        Value::Object(map) => {
            for (child, item) in map {
                flatten_into(out, &format!("{key}.{}", child.trim()), item, redact_keys);
            }
        }
    }
}

/// Extracts the host part of a URL-ish string (`https://a.b:8080/x` -> `a.b`).
pub(crate) fn url_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?.trim().to_lowercase();
    (!host.is_empty()).then_some(host)
}
