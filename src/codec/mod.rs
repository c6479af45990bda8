//! JSON <-> BSON document conversion
//!
//! Callers of the client work with plain `serde_json` objects. This module
//! converts them to driver documents on the way in and back on the way out.
//!
//! Encoding goes through the bson crate's extended JSON parser, so `$oid`,
//! `$date`, `$numberLong` and friends are recognised. Decoding produces
//! relaxed extended JSON, except that ObjectIds become plain hex strings
//! unless the client was configured with `useObjectId`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime as ChronoDateTime, SecondsFormat, Utc};
use mongodb::bson::{Binary, Bson, DateTime, Document, oid::ObjectId};
use serde_json::{Value, json};

use crate::error::{ClientError, Result};

/// A JSON object, the structural value every operation consumes and produces.
pub type JsonObject = serde_json::Map<String, Value>;

/// Field holding a document's primary key.
pub const ID_FIELD: &str = "_id";

/// Converts between JSON objects and BSON documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec {
    /// Represent ObjectIds as `{"$oid": ...}` instead of hex strings
    use_object_id: bool,
}

impl JsonCodec {
    pub fn new(use_object_id: bool) -> Self {
        Self { use_object_id }
    }

    pub fn use_object_id(&self) -> bool {
        self.use_object_id
    }

    /// Encode a JSON object into a BSON document.
    pub fn encode(&self, json: &JsonObject) -> Result<Document> {
        match Bson::try_from(Value::Object(json.clone()))? {
            Bson::Document(doc) => Ok(doc),
            other => Err(ClientError::Conversion(format!(
                "expected a document, found extended JSON value of type {:?}",
                other.element_type()
            ))),
        }
    }

    /// Encode an optional JSON object, treating `None` and `{}` alike.
    pub fn encode_optional(&self, json: Option<&JsonObject>) -> Result<Option<Document>> {
        match json {
            Some(obj) if !obj.is_empty() => self.encode(obj).map(Some),
            _ => Ok(None),
        }
    }

    /// Decode a BSON document into a JSON object.
    pub fn decode(&self, doc: &Document) -> JsonObject {
        doc.iter()
            .map(|(key, value)| (key.clone(), self.decode_value(value)))
            .collect()
    }

    /// Decode a single BSON value.
    pub fn decode_value(&self, value: &Bson) -> Value {
        match value {
            Bson::Document(doc) => Value::Object(self.decode(doc)),
            Bson::Array(items) => Value::Array(items.iter().map(|v| self.decode_value(v)).collect()),
            Bson::ObjectId(oid) => self.object_id_json(oid),
            Bson::DateTime(dt) => datetime_json(dt),
            Bson::Binary(bin) => binary_json(bin),
            Bson::Int32(n) => Value::from(*n),
            Bson::Int64(n) => Value::from(*n),
            Bson::String(s) => Value::String(s.clone()),
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Null | Bson::Undefined => Value::Null,
            other => other.clone().into_relaxed_extjson(),
        }
    }

    /// The BSON value stored for a freshly generated `_id`.
    pub fn id_value(&self, oid: ObjectId) -> Bson {
        if self.use_object_id {
            Bson::ObjectId(oid)
        } else {
            Bson::String(oid.to_hex())
        }
    }

    fn object_id_json(&self, oid: &ObjectId) -> Value {
        if self.use_object_id {
            json!({ "$oid": oid.to_hex() })
        } else {
            Value::String(oid.to_hex())
        }
    }
}

/// ISO-8601 with millisecond precision; dates outside chrono's range fall
/// back to the canonical `$numberLong` form.
fn datetime_json(dt: &DateTime) -> Value {
    let millis = dt.timestamp_millis();
    match ChronoDateTime::<Utc>::from_timestamp_millis(millis) {
        Some(utc) => json!({ "$date": utc.to_rfc3339_opts(SecondsFormat::Millis, true) }),
        None => json!({ "$date": { "$numberLong": millis.to_string() } }),
    }
}

fn binary_json(bin: &Binary) -> Value {
    json!({
        "$binary": {
            "base64": STANDARD.encode(&bin.bytes),
            "subType": format!("{:02x}", u8::from(bin.subtype)),
        }
    })
}

/// Parse a JSON object from text, rejecting any other top-level value.
pub fn parse_object(text: &str) -> Result<JsonObject> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::Conversion(format!(
            "expected a JSON object, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Decimal128, doc, spec::BinarySubtype};

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_encode_plain_document() {
        let codec = JsonCodec::default();
        let json = object(json!({ "name": "ada", "age": 36, "tags": ["a", "b"], "nested": { "x": true } }));
        let doc = codec.encode(&json).unwrap();

        assert_eq!(doc.get_str("name").unwrap(), "ada");
        assert_eq!(doc.get_array("tags").unwrap().len(), 2);
        assert!(doc.get_document("nested").unwrap().get_bool("x").unwrap());
    }

    #[test]
    fn test_encode_recognises_extended_json() {
        let codec = JsonCodec::default();
        let oid = ObjectId::new();
        let json = object(json!({ "_id": { "$oid": oid.to_hex() }, "n": { "$numberLong": "7" } }));
        let doc = codec.encode(&json).unwrap();

        assert_eq!(doc.get_object_id(ID_FIELD).unwrap(), oid);
        assert_eq!(doc.get_i64("n").unwrap(), 7);
    }

    #[test]
    fn test_encode_rejects_non_document_extjson() {
        let codec = JsonCodec::default();
        let json = object(json!({ "$oid": ObjectId::new().to_hex() }));
        assert!(matches!(codec.encode(&json), Err(ClientError::Conversion(_))));
    }

    #[test]
    fn test_decode_object_id_modes() {
        let oid = ObjectId::new();
        let doc = doc! { "_id": oid };

        let plain = JsonCodec::new(false).decode(&doc);
        assert_eq!(plain[ID_FIELD], Value::String(oid.to_hex()));

        let wrapped = JsonCodec::new(true).decode(&doc);
        assert_eq!(wrapped[ID_FIELD], json!({ "$oid": oid.to_hex() }));
    }

    #[test]
    fn test_decode_special_types() {
        let codec = JsonCodec::default();
        let doc = doc! {
            "when": DateTime::from_millis(0),
            "bin": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3] },
            "dec": Decimal128::from_bytes([0u8; 16]),
            "big": 5_000_000_000_i64,
            "none": Bson::Null,
        };
        let json = codec.decode(&doc);

        assert_eq!(json["when"], json!({ "$date": "1970-01-01T00:00:00.000Z" }));
        assert_eq!(json["bin"], json!({ "$binary": { "base64": "AQID", "subType": "00" } }));
        assert!(json["dec"].get("$numberDecimal").is_some());
        assert_eq!(json["big"], json!(5_000_000_000_i64));
        assert_eq!(json["none"], Value::Null);
    }

    #[test]
    fn test_decode_then_encode_preserves_types() {
        let codec = JsonCodec::new(true);
        let doc = doc! {
            "_id": ObjectId::new(),
            "when": DateTime::from_millis(1_700_000_000_123),
            "bin": Binary { subtype: BinarySubtype::Generic, bytes: vec![9, 8] },
            "items": [1, "two", { "three": 3.5 }],
        };
        let back = codec.encode(&codec.decode(&doc)).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_id_value() {
        let oid = ObjectId::new();
        assert_eq!(JsonCodec::new(false).id_value(oid), Bson::String(oid.to_hex()));
        assert_eq!(JsonCodec::new(true).id_value(oid), Bson::ObjectId(oid));
    }

    #[test]
    fn test_encode_optional_treats_empty_as_none() {
        let codec = JsonCodec::default();
        assert_eq!(codec.encode_optional(None).unwrap(), None);
        assert_eq!(codec.encode_optional(Some(&JsonObject::new())).unwrap(), None);
        let sort = object(json!({ "age": -1 }));
        assert_eq!(codec.encode_optional(Some(&sort)).unwrap(), Some(doc! { "age": -1 }));
    }

    #[test]
    fn test_parse_object() {
        assert_eq!(parse_object(r#"{"a":1}"#).unwrap()["a"], json!(1));
        assert!(parse_object("[1,2]").is_err());
        assert!(parse_object("{not json").is_err());
    }
}
