//! JSON request dispatch: `[name, arg, ...]` arrays into job invocations.
//!
//! The marshaler owns its parsed copies; string parameters borrow from the
//! parsed document for the duration of the call.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::job::{JobArg, OutSlot};
use crate::manager::JobManager;

pub(crate) fn dispatch(manager: &mut JobManager, json: &str, out: OutSlot<'_>) -> Result<()> {
    let parsed: Value = serde_json::from_str(json).map_err(|_| Error::UnsupportedJsonFormat)?;
    if token_count(&parsed) > manager.max_json_tokens() {
        return Err(Error::UnsupportedJsonFormat);
    }

    // The request must be an array whose first element names the job.
    let elements = parsed.as_array().ok_or(Error::UnsupportedJsonFormat)?;
    let name = elements
        .first()
        .and_then(Value::as_str)
        .ok_or(Error::UnsupportedJsonFormat)?;

    let params = marshal(&elements[1..]);
    debug!(name, params = params.len(), "json request");
    manager.perform_job(name, &params, out)
}

/// Number of tokens a budget-bounded tokenizer would report: one per value,
/// plus one per object key.
fn token_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(token_count).sum::<usize>(),
        Value::Object(map) => 1 + map.values().map(|v| 1 + token_count(v)).sum::<usize>(),
        _ => 1,
    }
}

/// Apply the marshaling rules to everything after the job name: strings
/// pass through, booleans become 1/0, other numbers become signed integers
/// (fractions truncate toward zero). Containers and null consume no
/// parameter slot.
fn marshal(elements: &[Value]) -> Vec<JobArg<'_>> {
    let mut params = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::String(s) => params.push(JobArg::Str(s)),
            Value::Bool(b) => params.push(JobArg::Int(i64::from(*b))),
            Value::Number(n) => {
                let v = n
                    .as_i64()
                    .unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64);
                params.push(JobArg::Int(v));
            }
            Value::Array(_) | Value::Object(_) | Value::Null => {}
        }
    }
    params
}
