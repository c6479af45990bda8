//! Write operation outcomes
//!
//! This module defines the immutable value objects returned by write operations:
//! - DeleteResult: outcome of remove / removeOne
//! - UpdateResult: outcome of update / replace
//!
//! Both convert to and from a JSON object. Optional counts that are unknown are
//! left out of the JSON entirely, so "unavailable" never reads as zero.
//! Reading is lenient: missing or mistyped keys fall back to defaults.

mod delete;
mod update;

pub use delete::DeleteResult;
pub use update::UpdateResult;

use mongodb::bson::Bson;
use serde_json::Value;
use tracing::warn;

use crate::codec::JsonObject;

const ACKNOWLEDGED: &str = "acknowledged";

/// Read a boolean, treating absent or non-boolean values as `false`.
fn read_acknowledged(json: &JsonObject) -> bool {
    match json.get(ACKNOWLEDGED) {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            warn!("Ignoring non-boolean '{}' in result JSON: {}", ACKNOWLEDGED, other);
            false
        }
        None => false,
    }
}

/// Read a 64-bit integer; non-integral numbers are truncated toward zero.
fn read_long(json: &JsonObject, key: &str) -> Option<i64> {
    let value = json.get(key)?;
    let long = value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
    });
    if long.is_none() && !value.is_null() {
        warn!("Ignoring non-numeric '{}' in result JSON: {}", key, value);
    }
    long
}

fn read_string(json: &JsonObject, key: &str) -> Option<String> {
    json.get(key).and_then(Value::as_str).map(str::to_string)
}

fn put_optional<T: Into<Value>>(json: &mut JsonObject, key: &str, value: Option<T>) {
    if let Some(v) = value {
        json.insert(key.to_string(), v.into());
    }
}

/// Saturating conversion of driver counts, which are unsigned.
fn count_to_long(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Render an upserted `_id` as text: ObjectIds as hex, strings verbatim,
/// anything else as relaxed extended JSON.
pub(crate) fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}
