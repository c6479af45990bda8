//! Client contract and its implementations
//!
//! - `MongoClient`: the asynchronous operations every client offers
//! - `MongoClientImpl`: the implementation backed by a registered driver pool
//! - `CallbackClient`: handler-style adapter that delivers each result once
//!
//! Every operation resolves to exactly one `Result`. Batch operations return a
//! [`DocumentStream`] instead of a `Vec`; a failure in the middle of a stream is
//! yielded as a single `Err` item and ends the stream.

mod callback;
mod driver;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::codec::JsonObject;
use crate::error::Result;
use crate::options::{FindOptions, UpdateOptions, WriteOption};
use crate::result::{DeleteResult, UpdateResult};

pub use callback::{BatchHandler, CallbackClient};
pub use driver::MongoClientImpl;

/// A lazily produced, finite sequence of documents.
pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<JsonObject>> + Send>>;

/// Asynchronous operations against one database of a MongoDB deployment.
///
/// Collection names are passed through to the driver unvalidated. Queries,
/// documents and updates are JSON objects; extended JSON forms such as
/// `{"$oid": ...}` are recognised.
#[async_trait]
pub trait MongoClient: Send + Sync {
    /// Insert the document, or replace it if it already has an `_id`.
    ///
    /// # Returns
    /// * `Result<Option<String>>` - The generated id when one was assigned
    async fn save(&self, collection: &str, document: JsonObject) -> Result<Option<String>>;

    /// `save` with an explicit write option.
    async fn save_with_options(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
    ) -> Result<Option<String>>;

    /// Insert a document.
    ///
    /// # Returns
    /// * `Result<Option<String>>` - The generated id if the document had no `_id`
    async fn insert(&self, collection: &str, document: JsonObject) -> Result<Option<String>>;

    /// `insert` with an explicit write option.
    async fn insert_with_options(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
    ) -> Result<Option<String>>;

    /// Update the first matching document.
    async fn update(
        &self,
        collection: &str,
        query: JsonObject,
        update: JsonObject,
    ) -> Result<UpdateResult> {
        self.update_with_options(collection, query, update, UpdateOptions::default())
            .await
    }

    /// Update matching documents; `multi` selects every match instead of the first.
    async fn update_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        update: JsonObject,
        options: UpdateOptions,
    ) -> Result<UpdateResult>;

    /// Replace the first matching document.
    async fn replace(
        &self,
        collection: &str,
        query: JsonObject,
        replacement: JsonObject,
    ) -> Result<UpdateResult> {
        self.replace_with_options(collection, query, replacement, UpdateOptions::default())
            .await
    }

    /// Replace the first matching document. `multi` is ignored.
    async fn replace_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        replacement: JsonObject,
        options: UpdateOptions,
    ) -> Result<UpdateResult>;

    /// All documents matching the query.
    async fn find(&self, collection: &str, query: JsonObject) -> Result<Vec<JsonObject>> {
        self.find_with_options(collection, query, FindOptions::default())
            .await
    }

    async fn find_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
    ) -> Result<Vec<JsonObject>>;

    /// Matching documents, one at a time.
    ///
    /// A failure while reading the cursor is yielded as
    /// `ExecutionError::CursorError` and ends the stream.
    async fn find_batch(&self, collection: &str, query: JsonObject) -> Result<DocumentStream> {
        self.find_batch_with_options(collection, query, FindOptions::default())
            .await
    }

    async fn find_batch_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
    ) -> Result<DocumentStream>;

    /// The first matching document.
    ///
    /// # Arguments
    /// * `fields` - Projection; `None` or an empty object returns every field
    async fn find_one(
        &self,
        collection: &str,
        query: JsonObject,
        fields: Option<JsonObject>,
    ) -> Result<Option<JsonObject>>;

    /// Number of documents matching the query.
    async fn count(&self, collection: &str, query: JsonObject) -> Result<u64>;

    /// Delete every matching document.
    async fn remove(&self, collection: &str, query: JsonObject) -> Result<DeleteResult>;

    async fn remove_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
    ) -> Result<DeleteResult>;

    /// Delete the first matching document.
    async fn remove_one(&self, collection: &str, query: JsonObject) -> Result<DeleteResult>;

    async fn remove_one_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
    ) -> Result<DeleteResult>;

    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Names of the collections in the database.
    async fn get_collections(&self) -> Result<Vec<String>>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Run a database command.
    ///
    /// # Arguments
    /// * `name` - Command name; must be a key of `command`
    /// * `command` - Command document, reordered so `name` comes first
    async fn run_command(&self, name: &str, command: JsonObject) -> Result<JsonObject>;

    /// Distinct values of a field across the collection.
    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>>;

    /// Distinct values of a field, each wrapped as `{field: value}`.
    ///
    /// The server answers `distinct` with a single array, so the values are
    /// fetched in full by one command and then streamed; unlike `find_batch`
    /// this does not bound memory use.
    async fn distinct_batch(&self, collection: &str, field: &str) -> Result<DocumentStream>;

    /// Release this client's pool reference. Later operations fail with
    /// `ClientError::Closed`. Calling it again does nothing.
    ///
    /// When this was the pool's last client the driver is shut down in the
    /// background; `close` itself never waits on the server.
    async fn close(&self);
}
