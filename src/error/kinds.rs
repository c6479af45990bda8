use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ClientError`] as the error.
///
/// Every client operation resolves to one of these, so success and failure
/// always travel through the same completion channel.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Top-level error type for client operations.
#[derive(Debug)]
pub enum ClientError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// Operation execution errors.
    Execution(ExecutionError),

    /// Configuration errors.
    Config(ConfigError),

    /// JSON <-> BSON conversion failures.
    Conversion(String),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// The client has been closed.
    Closed,
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Invalid connection URI.
    InvalidUri(String),

    /// Failed to build the driver client.
    ConnectionFailed(String),
}

/// Execution-specific errors.
#[derive(Debug)]
pub enum ExecutionError {
    /// Invalid operation parameters.
    InvalidParameters(String),

    /// A cursor failed while its results were being read.
    CursorError(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connection(e) => write!(f, "Connection error: {e}"),
            ClientError::Execution(e) => write!(f, "Execution error: {e}"),
            ClientError::Config(e) => write!(f, "Configuration error: {e}"),
            ClientError::Conversion(msg) => write!(f, "Conversion error: {msg}"),
            ClientError::Io(e) => write!(f, "I/O error: {e}"),
            ClientError::MongoDb(e) => format_mongodb_error(f, e),
            ClientError::Closed => write!(f, "Client is closed"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::InvalidParameters(msg) => write!(f, "Invalid parameters: {msg}"),
            ExecutionError::CursorError(msg) => write!(f, "Cursor error: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for ConfigError {}

impl ClientError {
    /// True when the error came from using a closed client.
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed)
    }
}

/* ========================= Conversions to ClientError ========================= */

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(err)
    }
}

impl From<mongodb::error::Error> for ClientError {
    fn from(err: mongodb::error::Error) -> Self {
        ClientError::MongoDb(err)
    }
}

impl From<ConnectionError> for ClientError {
    fn from(err: ConnectionError) -> Self {
        ClientError::Connection(err)
    }
}

impl From<ExecutionError> for ClientError {
    fn from(err: ExecutionError) -> Self {
        ClientError::Execution(err)
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::Config(err)
    }
}

impl From<mongodb::bson::extjson::de::Error> for ClientError {
    fn from(err: mongodb::bson::extjson::de::Error) -> Self {
        ClientError::Conversion(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Conversion(err.to_string())
    }
}
