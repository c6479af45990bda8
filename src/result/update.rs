use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use super::{
    ACKNOWLEDGED, count_to_long, id_to_string, put_optional, read_acknowledged, read_long,
    read_string,
};
use crate::codec::JsonObject;

const MATCHED_COUNT: &str = "matchedCount";
const MODIFIED_COUNT: &str = "modifiedCount";
const UPSERTED_ID: &str = "upsertedId";

/// The result of an update or replace operation.
///
/// If the write was unacknowledged, `was_acknowledged` returns false and none
/// of the counts are available.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    #[serde(default)]
    acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matched_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upserted_id: Option<String>,
}

impl UpdateResult {
    pub fn new(
        acknowledged: bool,
        matched_count: Option<i64>,
        modified_count: Option<i64>,
        upserted_id: Option<String>,
    ) -> Self {
        Self {
            acknowledged,
            matched_count,
            modified_count,
            upserted_id,
        }
    }

    /// Build from a JSON object, defaulting any missing field.
    pub fn from_json(json: &JsonObject) -> Self {
        Self {
            acknowledged: read_acknowledged(json),
            matched_count: read_long(json, MATCHED_COUNT),
            modified_count: read_long(json, MODIFIED_COUNT),
            upserted_id: read_string(json, UPSERTED_ID),
        }
    }

    /// Adapt driver counts. Unacknowledged writes carry nothing but the flag.
    pub(crate) fn from_driver(
        matched_count: u64,
        modified_count: u64,
        upserted_id: Option<&Bson>,
        acknowledged: bool,
    ) -> Self {
        if !acknowledged {
            return Self::new(false, None, None, None);
        }
        Self::new(
            true,
            Some(count_to_long(matched_count)),
            Some(count_to_long(modified_count)),
            upserted_id.map(id_to_string),
        )
    }

    /// Convert to JSON
    pub fn to_json(&self) -> JsonObject {
        let mut json = JsonObject::new();
        json.insert(ACKNOWLEDGED.to_string(), self.acknowledged.into());
        put_optional(&mut json, MATCHED_COUNT, self.matched_count);
        put_optional(&mut json, MODIFIED_COUNT, self.modified_count);
        put_optional(&mut json, UPSERTED_ID, self.upserted_id.clone());
        json
    }

    /// Returns true if the write was acknowledged.
    pub fn was_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Number of documents matched by the query, if known.
    pub fn matched_count(&self) -> Option<i64> {
        self.matched_count
    }

    /// Whether the server reported a modified count.
    ///
    /// Servers that predate the `nModified` field leave it out, which is
    /// different from reporting zero.
    pub fn is_modified_count_available(&self) -> bool {
        self.modified_count.is_some()
    }

    /// Number of documents modified, if known.
    pub fn modified_count(&self) -> Option<i64> {
        self.modified_count
    }

    /// `_id` of the inserted document when the operation upserted.
    pub fn upserted_id(&self) -> Option<&str> {
        self.upserted_id.as_deref()
    }
}

impl From<&JsonObject> for UpdateResult {
    fn from(json: &JsonObject) -> Self {
        Self::from_json(json)
    }
}

impl From<UpdateResult> for JsonObject {
    fn from(result: UpdateResult) -> Self {
        result.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::{Value, json};

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_missing_modified_count() {
        let input = object(json!({ "acknowledged": true, "matchedCount": 3, "upsertedId": "abc" }));
        let result = UpdateResult::from_json(&input);

        assert!(result.was_acknowledged());
        assert_eq!(result.matched_count(), Some(3));
        assert!(!result.is_modified_count_available());
        assert_eq!(result.upserted_id(), Some("abc"));

        let out = result.to_json();
        assert!(!out.contains_key("modifiedCount"));
        assert_eq!(out, input);
    }

    #[test]
    fn test_modified_count_zero_is_available() {
        let result = UpdateResult::new(true, Some(1), Some(0), None);
        assert!(result.is_modified_count_available());
        assert_eq!(result.modified_count(), Some(0));
        assert_eq!(
            Value::Object(result.to_json()),
            json!({ "acknowledged": true, "matchedCount": 1, "modifiedCount": 0 })
        );
    }

    #[test]
    fn test_from_empty_json() {
        let result = UpdateResult::from_json(&JsonObject::new());
        assert_eq!(result, UpdateResult::default());
        assert_eq!(Value::Object(result.to_json()), json!({ "acknowledged": false }));
    }

    #[test]
    fn test_wrong_types_degrade_to_absent() {
        let input = object(json!({
            "acknowledged": 1,
            "matchedCount": "three",
            "modifiedCount": null,
            "upsertedId": 17
        }));
        let result = UpdateResult::from_json(&input);
        assert_eq!(result, UpdateResult::new(false, None, None, None));
    }

    #[test]
    fn test_json_round_trip_keeps_absent_fields_absent() {
        for result in [
            UpdateResult::new(true, Some(2), Some(2), None),
            UpdateResult::new(true, Some(0), None, Some("x1".into())),
            UpdateResult::new(false, None, None, None),
        ] {
            let json = result.to_json();
            assert_eq!(UpdateResult::from_json(&json), result);
            assert_eq!(serde_json::to_value(&result).unwrap(), Value::Object(json));
        }
    }

    #[test]
    fn test_from_driver() {
        let oid = ObjectId::new();
        let result = UpdateResult::from_driver(0, 0, Some(&Bson::ObjectId(oid)), true);
        assert_eq!(result.upserted_id(), Some(oid.to_hex().as_str()));
        assert_eq!(result.matched_count(), Some(0));

        let unacked = UpdateResult::from_driver(5, 5, None, false);
        assert_eq!(unacked, UpdateResult::new(false, None, None, None));
    }
}
