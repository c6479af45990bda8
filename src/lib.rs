//! Asynchronous JSON-oriented MongoDB client
//!
//! A thin layer over the `mongodb` driver: documents, queries and results are
//! `serde_json` objects, write outcomes are [`result::DeleteResult`] and
//! [`result::UpdateResult`], and clients attach to named connection pools that
//! can be shared across the process.
//!
//! # Modules
//!
//! - `cli`: Command-line interface for the `mongoclient` binary
//! - `client`: The `MongoClient` contract and its implementations
//! - `codec`: JSON <-> BSON document conversion
//! - `config`: Client and file configuration
//! - `error`: Error types and handling
//! - `options`: Per-operation options
//! - `pool`: Process-wide pool registry
//! - `result`: Write result value objects
//!
//! # Example
//!
//! ```no_run
//! use mongoclient::client::{MongoClient, MongoClientImpl};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = json!({ "connection_string": "mongodb://localhost:27017", "db_name": "shop" });
//!     let client = MongoClientImpl::create_shared_default(config.as_object().unwrap()).await?;
//!
//!     let doc = json!({ "item": "pen", "qty": 3 });
//!     let id = client.insert("orders", doc.as_object().unwrap().clone()).await?;
//!     println!("Inserted {:?}", id);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod options;
pub mod pool;
pub mod result;

pub use client::{CallbackClient, DocumentStream, MongoClient, MongoClientImpl};
pub use codec::JsonObject;
pub use error::{ClientError, Result};
pub use options::{FindOptions, UpdateOptions, WriteOption};
pub use result::{DeleteResult, UpdateResult};
