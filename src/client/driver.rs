use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future, stream};
use mongodb::bson::{Document, oid::ObjectId};
use mongodb::options::{DeleteOptions, FindOneOptions, InsertOneOptions, ReplaceOptions};
use mongodb::{Collection, Database};
use serde_json::Value;
use tracing::{debug, info};

use super::{DocumentStream, MongoClient};
use crate::codec::{ID_FIELD, JsonCodec, JsonObject};
use crate::config::ClientConfig;
use crate::error::{ClientError, ExecutionError, Result};
use crate::options::{FindOptions, UpdateOptions, WriteOption};
use crate::pool::{self, DEFAULT_POOL_NAME, PoolHandle};
use crate::result::{DeleteResult, UpdateResult};

/// A client attached to one registered driver pool.
///
/// Cloning is cheap and clones share the same open/closed state.
#[derive(Clone)]
pub struct MongoClientImpl {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pool: Arc<PoolHandle>,
    closed: AtomicBool,
}

impl ClientInner {
    /// Give the pool reference back; the last client shuts the pool down.
    fn release(&self) {
        if let Some(pool) = pool::release(self.pool.name()) {
            pool.shutdown();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            debug!("Client on pool '{}' dropped without close", self.pool.name());
            self.release();
        }
    }
}

impl MongoClientImpl {
    /// Create a client on the shared pool named `data_source_name`.
    ///
    /// If that pool already exists its configuration is kept and `config` is
    /// ignored.
    pub async fn create_shared(config: &JsonObject, data_source_name: &str) -> Result<Self> {
        let config = ClientConfig::from_json(config)?;
        Self::with_config(&config, data_source_name).await
    }

    /// Create a client on the default shared pool.
    pub async fn create_shared_default(config: &JsonObject) -> Result<Self> {
        Self::create_shared(config, DEFAULT_POOL_NAME).await
    }

    /// Create a client with a private pool.
    pub async fn create_non_shared(config: &JsonObject) -> Result<Self> {
        let config = ClientConfig::from_json(config)?;
        Self::with_config(&config, &uuid::Uuid::new_v4().to_string()).await
    }

    /// Create a client on the pool named `pool_name` from a parsed configuration.
    pub async fn with_config(config: &ClientConfig, pool_name: &str) -> Result<Self> {
        let pool = pool::acquire(pool_name, config).await?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                pool,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn pool_name(&self) -> &str {
        self.inner.pool.name()
    }

    pub fn database_name(&self) -> &str {
        self.inner.pool.database_name()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn pool(&self) -> Result<&PoolHandle> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(&self.inner.pool)
    }

    fn database(&self) -> Result<Database> {
        Ok(self.pool()?.database())
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        Ok(self.database()?.collection(name))
    }

    fn encode(&self, json: &JsonObject) -> Result<Document> {
        self.pool()?.codec().encode(json)
    }

    /// Acknowledgment of a write made with `write_option`, or with the pool's
    /// default write concern when none is given.
    fn acknowledged(&self, write_option: Option<WriteOption>) -> Result<bool> {
        let pool = self.pool()?;
        Ok(write_option.map_or(pool.acknowledged_by_default(), |w| w.is_acknowledged()))
    }

    async fn save_document(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let doc = self.encode(&document)?;
        let Some(filter) = id_filter(&doc) else {
            return self.insert_new(collection, doc, write_option).await.map(Some);
        };

        debug!("Saving document with {} into '{}'", filter, collection);
        let mut options = ReplaceOptions::default();
        options.upsert = Some(true);
        options.write_concern = write_option.map(|w| w.to_write_concern());

        self.collection(collection)?
            .replace_one(filter, doc)
            .with_options(options)
            .await?;
        Ok(None)
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let doc = self.encode(&document)?;
        if !doc.contains_key(ID_FIELD) {
            return self.insert_new(collection, doc, write_option).await.map(Some);
        }

        debug!("Inserting document with caller-supplied _id into '{}'", collection);
        self.collection(collection)?
            .insert_one(doc)
            .with_options(insert_options(write_option))
            .await?;
        Ok(None)
    }

    /// Insert a document lacking `_id` under a freshly generated ObjectId.
    async fn insert_new(
        &self,
        collection: &str,
        doc: Document,
        write_option: Option<WriteOption>,
    ) -> Result<String> {
        let (with_id, oid) = with_generated_id(self.pool()?.codec(), doc);

        debug!("Inserting document into '{}' with generated _id {}", collection, oid);
        self.collection(collection)?
            .insert_one(with_id)
            .with_options(insert_options(write_option))
            .await?;
        Ok(oid.to_hex())
    }

    async fn delete(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: Option<WriteOption>,
        many: bool,
    ) -> Result<DeleteResult> {
        let filter = self.encode(&query)?;
        let acknowledged = self.acknowledged(write_option)?;
        debug!(
            "Executing {} on collection '{}' with filter: {:?}",
            if many { "deleteMany" } else { "deleteOne" },
            collection,
            filter
        );

        let mut options = DeleteOptions::default();
        options.write_concern = write_option.map(|w| w.to_write_concern());

        let coll = self.collection(collection)?;
        let result = if many {
            coll.delete_many(filter).with_options(options).await?
        } else {
            coll.delete_one(filter).with_options(options).await?
        };

        if acknowledged {
            info!("Deleted {} document(s) from '{}'", result.deleted_count, collection);
        }
        Ok(DeleteResult::from_driver(result.deleted_count, acknowledged))
    }
}

/// `{_id: ...}` matching the document's own id, if it has one.
fn id_filter(doc: &Document) -> Option<Document> {
    let id = doc.get(ID_FIELD)?;
    let mut filter = Document::new();
    filter.insert(ID_FIELD, id.clone());
    Some(filter)
}

/// Prepend a fresh `_id` to `doc`, stored the way `codec` stores ObjectIds.
fn with_generated_id(codec: &JsonCodec, doc: Document) -> (Document, ObjectId) {
    let oid = ObjectId::new();
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD, codec.id_value(oid));
    for (key, value) in doc {
        with_id.insert(key, value);
    }
    (with_id, oid)
}

fn insert_options(write_option: Option<WriteOption>) -> InsertOneOptions {
    let mut options = InsertOneOptions::default();
    options.write_concern = write_option.map(|w| w.to_write_concern());
    options
}

/// Put the `name` key first, as the server reads the command name from the
/// first element.
fn command_document(name: &str, command: Document) -> Result<Document> {
    let Some(head) = command.get(name).cloned() else {
        return Err(ExecutionError::InvalidParameters(format!(
            "command document has no '{name}' key"
        ))
        .into());
    };

    let mut ordered = Document::new();
    ordered.insert(name, head);
    for (key, value) in command {
        if key != name {
            ordered.insert(key, value);
        }
    }
    Ok(ordered)
}

/// A driver failure while iterating an open cursor.
fn cursor_failure(err: mongodb::error::Error) -> ClientError {
    ExecutionError::CursorError(err.to_string()).into()
}

/// `{field: value}`, one item of a distinct batch.
fn distinct_item(field: &str, value: Value) -> JsonObject {
    let mut item = JsonObject::new();
    item.insert(field.to_string(), value);
    item
}

/// Stop a stream after its first error.
fn end_on_error<S>(items: S) -> DocumentStream
where
    S: futures::Stream<Item = Result<JsonObject>> + Send + 'static,
{
    Box::pin(items.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    }))
}

#[async_trait]
impl MongoClient for MongoClientImpl {
    async fn save(&self, collection: &str, document: JsonObject) -> Result<Option<String>> {
        self.save_document(collection, document, None).await
    }

    async fn save_with_options(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
    ) -> Result<Option<String>> {
        self.save_document(collection, document, Some(write_option))
            .await
    }

    async fn insert(&self, collection: &str, document: JsonObject) -> Result<Option<String>> {
        self.insert_document(collection, document, None).await
    }

    async fn insert_with_options(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
    ) -> Result<Option<String>> {
        self.insert_document(collection, document, Some(write_option))
            .await
    }

    async fn update_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        update: JsonObject,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let filter = self.encode(&query)?;
        let update = self.encode(&update)?;
        let acknowledged = self.acknowledged(options.write_option)?;
        debug!(
            "Executing {} on collection '{}' with filter: {:?}",
            if options.multi { "updateMany" } else { "updateOne" },
            collection,
            filter
        );

        let coll = self.collection(collection)?;
        let driver_options = options.to_update_options();
        let result = if options.multi {
            coll.update_many(filter, update)
                .with_options(driver_options)
                .await?
        } else {
            coll.update_one(filter, update)
                .with_options(driver_options)
                .await?
        };

        Ok(UpdateResult::from_driver(
            result.matched_count,
            result.modified_count,
            result.upserted_id.as_ref(),
            acknowledged,
        ))
    }

    async fn replace_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        replacement: JsonObject,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let filter = self.encode(&query)?;
        let replacement = self.encode(&replacement)?;
        let acknowledged = self.acknowledged(options.write_option)?;
        debug!(
            "Executing replaceOne on collection '{}' with filter: {:?}",
            collection, filter
        );

        let result = self
            .collection(collection)?
            .replace_one(filter, replacement)
            .with_options(options.to_replace_options())
            .await?;

        Ok(UpdateResult::from_driver(
            result.matched_count,
            result.modified_count,
            result.upserted_id.as_ref(),
            acknowledged,
        ))
    }

    async fn find_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
    ) -> Result<Vec<JsonObject>> {
        let mut stream = self
            .find_batch_with_options(collection, query, options)
            .await?;

        let mut documents = Vec::new();
        while let Some(doc) = stream.try_next().await? {
            documents.push(doc);
        }
        info!("Find on '{}' returned {} document(s)", collection, documents.len());
        Ok(documents)
    }

    async fn find_batch_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
    ) -> Result<DocumentStream> {
        let pool = self.pool()?;
        let codec = *pool.codec();
        let filter = codec.encode(&query)?;
        let find_options = options.to_driver(&codec)?;
        debug!(
            "Executing find on collection '{}' with filter: {:?}",
            collection, filter
        );

        let cursor = self
            .collection(collection)?
            .find(filter)
            .with_options(find_options)
            .await?;

        Ok(end_on_error(cursor.map(move |item| {
            item.map(|doc| codec.decode(&doc)).map_err(cursor_failure)
        })))
    }

    async fn find_one(
        &self,
        collection: &str,
        query: JsonObject,
        fields: Option<JsonObject>,
    ) -> Result<Option<JsonObject>> {
        let pool = self.pool()?;
        let codec = *pool.codec();
        let filter = codec.encode(&query)?;
        debug!(
            "Executing findOne on collection '{}' with filter: {:?}",
            collection, filter
        );

        let mut options = FindOneOptions::default();
        options.projection = codec.encode_optional(fields.as_ref())?;

        let found = self
            .collection(collection)?
            .find_one(filter)
            .with_options(options)
            .await?;
        Ok(found.map(|doc| codec.decode(&doc)))
    }

    async fn count(&self, collection: &str, query: JsonObject) -> Result<u64> {
        let filter = self.encode(&query)?;
        debug!(
            "Executing countDocuments on collection '{}' with filter: {:?}",
            collection, filter
        );
        Ok(self
            .collection(collection)?
            .count_documents(filter)
            .await?)
    }

    async fn remove(&self, collection: &str, query: JsonObject) -> Result<DeleteResult> {
        self.delete(collection, query, None, true).await
    }

    async fn remove_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
    ) -> Result<DeleteResult> {
        self.delete(collection, query, Some(write_option), true)
            .await
    }

    async fn remove_one(&self, collection: &str, query: JsonObject) -> Result<DeleteResult> {
        self.delete(collection, query, None, false).await
    }

    async fn remove_one_with_options(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
    ) -> Result<DeleteResult> {
        self.delete(collection, query, Some(write_option), false)
            .await
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        debug!("Creating collection '{}'", name);
        self.database()?.create_collection(name).await?;
        info!("Collection '{}' created", name);
        Ok(())
    }

    async fn get_collections(&self) -> Result<Vec<String>> {
        Ok(self.database()?.list_collection_names().await?)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        debug!("Dropping collection '{}'", name);
        self.collection(name)?.drop().await?;
        info!("Collection '{}' dropped", name);
        Ok(())
    }

    async fn run_command(&self, name: &str, command: JsonObject) -> Result<JsonObject> {
        let pool = self.pool()?;
        let command = command_document(name, pool.codec().encode(&command)?)?;
        debug!("Running command '{}'", name);

        let reply = pool.database().run_command(command).await?;
        Ok(pool.codec().decode(&reply))
    }

    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>> {
        let pool = self.pool()?;
        debug!(
            "Executing distinct on collection '{}' for field '{}'",
            collection, field
        );

        let values = self
            .collection(collection)?
            .distinct(field, Document::new())
            .await?;
        info!("Distinct returned {} unique values", values.len());

        let codec = pool.codec();
        Ok(values.iter().map(|v| codec.decode_value(v)).collect())
    }

    async fn distinct_batch(&self, collection: &str, field: &str) -> Result<DocumentStream> {
        let values = self.distinct(collection, field).await?;
        let field = field.to_string();

        Ok(Box::pin(
            stream::iter(values).map(move |value| Ok(distinct_item(&field, value))),
        ))
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing client on pool '{}'", self.pool_name());
        self.inner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Bson, doc};
    use serde_json::json;
    use std::time::Duration;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    async fn offline_client() -> MongoClientImpl {
        MongoClientImpl::create_non_shared(&object(json!({
            "port": 1,
            "serverSelectionTimeoutMS": 5000
        })))
        .await
        .unwrap()
    }

    #[test]
    fn test_command_document_puts_name_first() {
        let command = doc! { "limit": 1, "query": { "a": 1 }, "count": "people" };
        let ordered = command_document("count", command).unwrap();

        let keys: Vec<&str> = ordered.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["count", "limit", "query"]);
        assert_eq!(ordered.get_str("count").unwrap(), "people");
    }

    #[test]
    fn test_command_document_requires_name() {
        let err = command_document("ping", doc! { "ismaster": 1 }).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Execution(ExecutionError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_end_on_error_stops_after_first_failure() {
        let items = stream::iter(vec![
            Ok(object(json!({ "n": 1 }))),
            Err(ClientError::Conversion("bad".into())),
            Ok(object(json!({ "n": 2 }))),
        ]);
        let collected: Vec<Result<JsonObject>> = end_on_error(items).collect().await;

        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let client = offline_client().await;
        assert!(!client.is_closed());
        client.close().await;
        assert!(client.is_closed());

        let err = client.insert("people", object(json!({ "a": 1 }))).await.unwrap_err();
        assert!(err.is_closed());
        assert!(client.find("people", JsonObject::new()).await.unwrap_err().is_closed());
        assert!(client.find_batch("people", JsonObject::new()).await.is_err());
        assert!(client.count("people", JsonObject::new()).await.unwrap_err().is_closed());
        assert!(client.get_collections().await.unwrap_err().is_closed());
        assert!(client.distinct("people", "a").await.unwrap_err().is_closed());
        assert!(client
            .run_command("ping", object(json!({ "ping": 1 })))
            .await
            .unwrap_err()
            .is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_pool() {
        let client = offline_client().await;
        let name = client.pool_name().to_string();
        assert_eq!(pool::ref_count(&name), 1);

        client.close().await;
        client.close().await;
        assert_eq!(pool::ref_count(&name), 0);
    }

    #[tokio::test]
    async fn test_shared_clients_share_one_pool() {
        let name = format!("test-shared-{}", uuid::Uuid::new_v4());
        let config = object(json!({ "db_name": "shared_db" }));

        let first = MongoClientImpl::create_shared(&config, &name).await.unwrap();
        let second = MongoClientImpl::create_shared(&object(json!({ "db_name": "other" })), &name)
            .await
            .unwrap();

        assert_eq!(pool::ref_count(&name), 2);
        assert_eq!(second.database_name(), "shared_db");

        first.close().await;
        assert_eq!(pool::ref_count(&name), 1);
        assert!(!second.is_closed());

        second.close().await;
        assert_eq!(pool::ref_count(&name), 0);
    }

    #[tokio::test]
    async fn test_non_shared_clients_get_private_pools() {
        let first = offline_client().await;
        let second = offline_client().await;

        assert_ne!(first.pool_name(), second.pool_name());
        assert!(uuid::Uuid::parse_str(first.pool_name()).is_ok());

        first.close().await;
        second.close().await;
    }

    #[tokio::test]
    async fn test_closing_private_pools_does_not_block() {
        let first = offline_client().await;
        let second = offline_client().await;

        for client in [&first, &second] {
            let closed = tokio::time::timeout(Duration::from_secs(5), client.close()).await;
            assert!(closed.is_ok(), "close of pool '{}' blocked", client.pool_name());
            assert_eq!(pool::ref_count(client.pool_name()), 0);
        }
    }

    #[tokio::test]
    async fn test_drop_without_close_releases_pool() {
        let client = offline_client().await;
        let name = client.pool_name().to_string();
        let clone = client.clone();

        drop(client);
        assert_eq!(pool::ref_count(&name), 1);

        drop(clone);
        assert_eq!(pool::ref_count(&name), 0);
    }

    #[tokio::test]
    async fn test_drop_after_close_releases_once() {
        let name = format!("test-drop-{}", uuid::Uuid::new_v4());
        let config = object(json!({ "port": 1 }));
        let first = MongoClientImpl::create_shared(&config, &name).await.unwrap();
        let second = MongoClientImpl::create_shared(&config, &name).await.unwrap();

        first.close().await;
        drop(first);
        assert_eq!(pool::ref_count(&name), 1);

        drop(second);
        assert_eq!(pool::ref_count(&name), 0);
    }

    #[test]
    fn test_generated_id_stored_as_hex_string() {
        let codec = JsonCodec::new(false);
        let (doc, oid) = with_generated_id(&codec, doc! { "name": "pen", "qty": 3 });

        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "name", "qty"]);
        assert_eq!(doc.get(ID_FIELD), Some(&Bson::String(oid.to_hex())));
        assert_eq!(oid.to_hex().len(), 24);
    }

    #[test]
    fn test_generated_id_stored_as_object_id() {
        let codec = JsonCodec::new(true);
        let (doc, oid) = with_generated_id(&codec, doc! { "name": "pen" });

        assert_eq!(doc.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(doc.get(ID_FIELD), Some(&Bson::ObjectId(oid)));
        assert_eq!(doc.get_str("name").unwrap(), "pen");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let codec = JsonCodec::new(false);
        let (_, first) = with_generated_id(&codec, Document::new());
        let (_, second) = with_generated_id(&codec, Document::new());
        assert_ne!(first, second);
    }

    #[test]
    fn test_id_filter_selects_replace_for_documents_with_id() {
        let filter = id_filter(&doc! { "name": "pen", "_id": "abc" }).unwrap();
        assert_eq!(filter, doc! { "_id": "abc" });

        assert!(id_filter(&doc! { "name": "pen" }).is_none());
    }

    #[tokio::test]
    async fn test_cursor_failure_ends_stream_with_cursor_error() {
        let failure = mongodb::error::Error::from(std::io::Error::other("connection reset"));
        let items = stream::iter(vec![
            Ok(object(json!({ "n": 1 }))),
            Err(cursor_failure(failure)),
            Ok(object(json!({ "n": 2 }))),
        ]);
        let collected: Vec<Result<JsonObject>> = end_on_error(items).collect().await;

        assert_eq!(collected.len(), 2);
        assert!(matches!(
            collected[1],
            Err(ClientError::Execution(ExecutionError::CursorError(_)))
        ));
    }

    #[test]
    fn test_distinct_item_wraps_value_under_field() {
        let item = distinct_item("color", json!("red"));
        assert_eq!(Value::Object(item), json!({ "color": "red" }));
    }

    #[tokio::test]
    async fn test_invalid_configuration_fails_creation() {
        let result =
            MongoClientImpl::create_non_shared(&object(json!({ "writeConcern": "SOMETIMES" }))).await;
        assert!(matches!(result, Err(ClientError::Config(_))));

        let result = MongoClientImpl::create_non_shared(&object(json!({
            "connection_string": "http://localhost"
        })))
        .await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_run_command_validates_before_sending() {
        let client = offline_client().await;
        let err = client
            .run_command("count", object(json!({ "query": {} })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Execution(ExecutionError::InvalidParameters(_))
        ));
        client.close().await;
    }

    #[tokio::test]
    async fn test_clones_share_closed_state() {
        let client = offline_client().await;
        let clone = client.clone();
        clone.close().await;
        assert!(client.is_closed());
    }
}
