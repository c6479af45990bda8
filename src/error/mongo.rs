use std::fmt;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Structured information extracted from a MongoDB driver error.
///
/// Serialized to JSON when a driver failure is displayed, so handlers that
/// only log `ClientError` still get the server code and name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<ErrorDetails>,
}

/// Namespace and key information attached to write errors.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<Document>,
}

impl ErrorInfo {
    /// Build structured error information from a driver error.
    pub fn from_mongodb_error(error: &mongodb::error::Error) -> Self {
        extract_error_info(error)
    }

    /// Numeric server error code, when the server reported one.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Human-readable error message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn with_code(mut self, code: i32, message: &str) -> Self {
        self.code = Some(code);
        self.name = error_name(code).map(str::to_string);
        self.message = Some(match code {
            11000 | 11001 => "Duplicate key error".to_string(),
            _ => message.to_string(),
        });
        self
    }
}

/// Format MongoDB errors as compact JSON wrapped in an `error` field.
///
/// Used by the `Display` implementation of `ClientError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let wrapper = serde_json::json!({ "error": extract_error_info(error) });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "{json_output}")
}

/// Extract structured information using the driver's typed error kinds.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let typed = |kind: &str| ErrorInfo {
        error_type: Some(kind.to_string()),
        ..ErrorInfo::default()
    };

    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            let mut info =
                typed("mongo.write_error").with_code(write_error.code, &write_error.message);
            info.details = Some(details_from(write_error.details.as_ref()));
            info
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)) => {
            typed("mongo.write_concern_error").with_code(wc_error.code, &wc_error.message)
        }
        ErrorKind::Command(command_error) => {
            typed("mongo.command_error").with_code(command_error.code, &command_error.message)
        }
        ErrorKind::Authentication { message, .. } => ErrorInfo {
            message: Some(message.clone()),
            ..typed("mongo.authentication_error")
        },
        ErrorKind::InvalidArgument { message, .. } => ErrorInfo {
            message: Some(message.clone()),
            ..typed("mongo.invalid_argument")
        },
        ErrorKind::ServerSelection { message, .. } => ErrorInfo {
            message: Some(message.clone()),
            ..typed("mongo.server_selection_error")
        },
        ErrorKind::Shutdown => ErrorInfo {
            message: Some("Client has been shut down".to_string()),
            ..typed("mongo.shutdown")
        },
        _ => ErrorInfo {
            message: Some(error.to_string()),
            ..ErrorInfo::default()
        },
    }
}

/// Map well-known MongoDB error codes to their server names.
fn error_name(code: i32) -> Option<&'static str> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        48 => "NamespaceExists",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        121 => "DocumentValidationFailure",
        _ => return None,
    };
    Some(name)
}

fn details_from(doc: Option<&Document>) -> ErrorDetails {
    let mut details = ErrorDetails::default();
    let Some(doc) = doc else {
        return details;
    };

    let string_at = |keys: &[&str]| {
        keys.iter().find_map(|k| match doc.get(*k) {
            Some(Bson::String(s)) => Some(s.clone()),
            _ => None,
        })
    };

    details.collection = string_at(&["namespace", "ns"]);
    details.index = string_at(&["index", "indexName"]);
    details.key = ["keyPattern", "keyValue"]
        .iter()
        .find_map(|k| doc.get_document(k).ok().cloned());
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_error_name_lookup() {
        assert_eq!(error_name(11000), Some("DuplicateKey"));
        assert_eq!(error_name(26), Some("NamespaceNotFound"));
        assert_eq!(error_name(12345), None);
    }

    #[test]
    fn test_duplicate_key_message_is_simplified() {
        let info = ErrorInfo::default().with_code(11000, "E11000 duplicate key error ...");
        assert_eq!(info.code(), Some(11000));
        assert_eq!(info.message(), Some("Duplicate key error"));
        assert_eq!(info.name.as_deref(), Some("DuplicateKey"));
    }

    #[test]
    fn test_details_prefer_namespace_then_ns() {
        let doc = doc! { "ns": "db.users", "indexName": "email_1", "keyValue": { "email": "a" } };
        let details = details_from(Some(&doc));
        assert_eq!(details.collection.as_deref(), Some("db.users"));
        assert_eq!(details.index.as_deref(), Some("email_1"));
        assert_eq!(details.key, Some(doc! { "email": "a" }));
    }

    #[test]
    fn test_compact_json_skips_empty_fields() {
        let info = ErrorInfo {
            error_type: Some("mongo.command_error".into()),
            code: Some(59),
            ..ErrorInfo::default()
        };
        assert_eq!(
            info.to_json_compact().unwrap(),
            r#"{"type":"mongo.command_error","code":59}"#
        );
    }
}
