//! Error handling for client operations.
//!
//! All operation failures, whether raised by the driver, by JSON/BSON
//! conversion or by using a closed client, are represented by
//! [`ClientError`] and delivered on the operation's completion channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use mongoclient::error::{ClientError, ErrorInfo};
//!
//! fn log_failure(err: &ClientError) {
//!     if let ClientError::MongoDb(driver_err) = err {
//!         let info = ErrorInfo::from_mongodb_error(driver_err);
//!         eprintln!("{}", info.to_json_compact().unwrap_or_default());
//!     }
//! }
//! ```

pub mod kinds;
pub mod mongo;

pub use kinds::{ClientError, ConfigError, ConnectionError, ExecutionError, Result};
pub use mongo::{ErrorDetails, ErrorInfo};
