use serde::{Deserialize, Serialize};

use super::{ACKNOWLEDGED, count_to_long, put_optional, read_acknowledged, read_long};
use crate::codec::JsonObject;

const DELETED_COUNT: &str = "deletedCount";

/// The result of a delete operation.
///
/// If the delete was unacknowledged, `was_acknowledged` returns false and no
/// deleted count is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    #[serde(default)]
    acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_count: Option<i64>,
}

impl DeleteResult {
    pub fn new(acknowledged: bool, deleted_count: Option<i64>) -> Self {
        Self {
            acknowledged,
            deleted_count,
        }
    }

    /// Build from a JSON object, defaulting any missing field.
    pub fn from_json(json: &JsonObject) -> Self {
        Self {
            acknowledged: read_acknowledged(json),
            deleted_count: read_long(json, DELETED_COUNT),
        }
    }

    /// Adapt a driver count. Unacknowledged writes carry no count.
    pub(crate) fn from_driver(deleted_count: u64, acknowledged: bool) -> Self {
        if acknowledged {
            Self::new(true, Some(count_to_long(deleted_count)))
        } else {
            Self::new(false, None)
        }
    }

    /// Convert to JSON
    pub fn to_json(&self) -> JsonObject {
        let mut json = JsonObject::new();
        json.insert(ACKNOWLEDGED.to_string(), self.acknowledged.into());
        put_optional(&mut json, DELETED_COUNT, self.deleted_count);
        json
    }

    /// Returns true if the write was acknowledged.
    pub fn was_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Number of documents deleted, if known.
    pub fn deleted_count(&self) -> Option<i64> {
        self.deleted_count
    }
}

impl From<&JsonObject> for DeleteResult {
    fn from(json: &JsonObject) -> Self {
        Self::from_json(json)
    }
}

impl From<DeleteResult> for JsonObject {
    fn from(result: DeleteResult) -> Self {
        result.to_json()
    }
}
