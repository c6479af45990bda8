//! Handler-style adapter over [`MongoClient`].
//!
//! Each operation is spawned on the given runtime and its outcome is passed
//! to the handler exactly once. Operations return `&Self` so calls can be
//! chained; chained calls run concurrently and may complete in any order.
//!
//! Batch handlers are called once per item with `Ok(Some(doc))`, then once
//! with `Ok(None)` when the sequence is exhausted, or once with `Err` if it
//! fails. Closing the adapter ends pending batch deliveries with
//! `Err(ClientError::Closed)`.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DocumentStream, MongoClient};
use crate::codec::JsonObject;
use crate::error::{ClientError, Result};
use crate::options::{FindOptions, UpdateOptions, WriteOption};
use crate::result::{DeleteResult, UpdateResult};

/// Handler for batch operations: one call per item, then an end marker.
pub trait BatchHandler: FnMut(Result<Option<JsonObject>>) + Send + 'static {}

impl<F> BatchHandler for F where F: FnMut(Result<Option<JsonObject>>) + Send + 'static {}

pub struct CallbackClient {
    client: Arc<dyn MongoClient>,
    runtime: Handle,
    closing: CancellationToken,
}

impl CallbackClient {
    /// Wrap `client`, spawning operations on `runtime`.
    pub fn new(client: Arc<dyn MongoClient>, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            closing: CancellationToken::new(),
        }
    }

    /// Wrap `client` using the runtime of the calling task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn on_current_runtime(client: Arc<dyn MongoClient>) -> Self {
        Self::new(client, Handle::current())
    }

    fn spawn<T, H>(&self, operation: BoxFuture<'static, Result<T>>, handler: H) -> &Self
    where
        T: Send + 'static,
        H: FnOnce(Result<T>) + Send + 'static,
    {
        self.runtime.spawn(async move { handler(operation.await) });
        self
    }

    fn spawn_batch<H>(&self, opening: BoxFuture<'static, Result<DocumentStream>>, mut handler: H) -> &Self
    where
        H: BatchHandler,
    {
        let closing = self.closing.clone();
        self.runtime.spawn(async move {
            let mut items = tokio::select! {
                biased;
                _ = closing.cancelled() => {
                    handler(Err(ClientError::Closed));
                    return;
                }
                opened = opening => match opened {
                    Ok(items) => items,
                    Err(e) => {
                        handler(Err(e));
                        return;
                    }
                },
            };

            loop {
                tokio::select! {
                    biased;
                    _ = closing.cancelled() => {
                        debug!("Batch delivery interrupted by close");
                        handler(Err(ClientError::Closed));
                        return;
                    }
                    next = items.next() => match next {
                        Some(Ok(doc)) => handler(Ok(Some(doc))),
                        Some(Err(e)) => {
                            handler(Err(e));
                            return;
                        }
                        None => {
                            handler(Ok(None));
                            return;
                        }
                    },
                }
            }
        });
        self
    }

    pub fn save<H>(&self, collection: &str, document: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<Option<String>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.save(&collection, document).await }),
            handler,
        )
    }

    pub fn save_with_options<H>(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<Option<String>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .save_with_options(&collection, document, write_option)
                    .await
            }),
            handler,
        )
    }

    pub fn insert<H>(&self, collection: &str, document: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<Option<String>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.insert(&collection, document).await }),
            handler,
        )
    }

    pub fn insert_with_options<H>(
        &self,
        collection: &str,
        document: JsonObject,
        write_option: WriteOption,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<Option<String>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .insert_with_options(&collection, document, write_option)
                    .await
            }),
            handler,
        )
    }

    pub fn update<H>(&self, collection: &str, query: JsonObject, update: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<UpdateResult>) + Send + 'static,
    {
        self.update_with_options(collection, query, update, UpdateOptions::default(), handler)
    }

    pub fn update_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        update: JsonObject,
        options: UpdateOptions,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<UpdateResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .update_with_options(&collection, query, update, options)
                    .await
            }),
            handler,
        )
    }

    pub fn replace<H>(
        &self,
        collection: &str,
        query: JsonObject,
        replacement: JsonObject,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<UpdateResult>) + Send + 'static,
    {
        self.replace_with_options(collection, query, replacement, UpdateOptions::default(), handler)
    }

    pub fn replace_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        replacement: JsonObject,
        options: UpdateOptions,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<UpdateResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .replace_with_options(&collection, query, replacement, options)
                    .await
            }),
            handler,
        )
    }

    pub fn find<H>(&self, collection: &str, query: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<Vec<JsonObject>>) + Send + 'static,
    {
        self.find_with_options(collection, query, FindOptions::default(), handler)
    }

    pub fn find_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<Vec<JsonObject>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.find_with_options(&collection, query, options).await }),
            handler,
        )
    }

    pub fn find_batch<H>(&self, collection: &str, query: JsonObject, handler: H) -> &Self
    where
        H: BatchHandler,
    {
        self.find_batch_with_options(collection, query, FindOptions::default(), handler)
    }

    pub fn find_batch_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        options: FindOptions,
        handler: H,
    ) -> &Self
    where
        H: BatchHandler,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn_batch(
            Box::pin(async move {
                client
                    .find_batch_with_options(&collection, query, options)
                    .await
            }),
            handler,
        )
    }

    pub fn find_one<H>(
        &self,
        collection: &str,
        query: JsonObject,
        fields: Option<JsonObject>,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<Option<JsonObject>>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.find_one(&collection, query, fields).await }),
            handler,
        )
    }

    pub fn count<H>(&self, collection: &str, query: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<u64>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.count(&collection, query).await }),
            handler,
        )
    }

    pub fn remove<H>(&self, collection: &str, query: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<DeleteResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.remove(&collection, query).await }),
            handler,
        )
    }

    pub fn remove_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<DeleteResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .remove_with_options(&collection, query, write_option)
                    .await
            }),
            handler,
        )
    }

    pub fn remove_one<H>(&self, collection: &str, query: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<DeleteResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move { client.remove_one(&collection, query).await }),
            handler,
        )
    }

    pub fn remove_one_with_options<H>(
        &self,
        collection: &str,
        query: JsonObject,
        write_option: WriteOption,
        handler: H,
    ) -> &Self
    where
        H: FnOnce(Result<DeleteResult>) + Send + 'static,
    {
        let (client, collection) = (Arc::clone(&self.client), collection.to_string());
        self.spawn(
            Box::pin(async move {
                client
                    .remove_one_with_options(&collection, query, write_option)
                    .await
            }),
            handler,
        )
    }

    pub fn create_collection<H>(&self, name: &str, handler: H) -> &Self
    where
        H: FnOnce(Result<()>) + Send + 'static,
    {
        let (client, name) = (Arc::clone(&self.client), name.to_string());
        self.spawn(
            Box::pin(async move { client.create_collection(&name).await }),
            handler,
        )
    }

    pub fn get_collections<H>(&self, handler: H) -> &Self
    where
        H: FnOnce(Result<Vec<String>>) + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        self.spawn(
            Box::pin(async move { client.get_collections().await }),
            handler,
        )
    }

    pub fn drop_collection<H>(&self, name: &str, handler: H) -> &Self
    where
        H: FnOnce(Result<()>) + Send + 'static,
    {
        let (client, name) = (Arc::clone(&self.client), name.to_string());
        self.spawn(
            Box::pin(async move { client.drop_collection(&name).await }),
            handler,
        )
    }

    pub fn run_command<H>(&self, name: &str, command: JsonObject, handler: H) -> &Self
    where
        H: FnOnce(Result<JsonObject>) + Send + 'static,
    {
        let (client, name) = (Arc::clone(&self.client), name.to_string());
        self.spawn(
            Box::pin(async move { client.run_command(&name, command).await }),
            handler,
        )
    }

    pub fn distinct<H>(&self, collection: &str, field: &str, handler: H) -> &Self
    where
        H: FnOnce(Result<Vec<Value>>) + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let (collection, field) = (collection.to_string(), field.to_string());
        self.spawn(
            Box::pin(async move { client.distinct(&collection, &field).await }),
            handler,
        )
    }

    pub fn distinct_batch<H>(&self, collection: &str, field: &str, handler: H) -> &Self
    where
        H: BatchHandler,
    {
        let client = Arc::clone(&self.client);
        let (collection, field) = (collection.to_string(), field.to_string());
        self.spawn_batch(
            Box::pin(async move { client.distinct_batch(&collection, &field).await }),
            handler,
        )
    }

    /// Close the wrapped client. Pending batch deliveries end with
    /// `Err(ClientError::Closed)`; the handler is called once the pool
    /// reference has been released.
    pub fn close<H>(&self, handler: H) -> &Self
    where
        H: FnOnce(Result<()>) + Send + 'static,
    {
        self.closing.cancel();
        let client = Arc::clone(&self.client);
        self.spawn(
            Box::pin(async move {
                client.close().await;
                Ok(())
            }),
            handler,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MongoClientImpl;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    /// A client pointed at a port nothing listens on; operations stay
    /// pending in server selection until the timeout.
    async fn unreachable_client() -> Arc<dyn MongoClient> {
        let client = MongoClientImpl::create_non_shared(&object(json!({
            "port": 1,
            "serverSelectionTimeoutMS": 10000
        })))
        .await
        .unwrap();
        Arc::new(client)
    }

    #[tokio::test]
    async fn test_handlers_called_exactly_once_after_close() {
        let client = unreachable_client().await;
        client.close().await;
        let callbacks = CallbackClient::on_current_runtime(client);

        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
        let (t1, t2, t3) = (tx.clone(), tx.clone(), tx.clone());
        callbacks
            .insert("people", object(json!({ "a": 1 })), move |r| {
                let _ = t1.send(r.is_err());
            })
            .count("people", JsonObject::new(), move |r| {
                let _ = t2.send(matches!(r, Err(ClientError::Closed)));
            })
            .get_collections(move |r| {
                let _ = t3.send(r.is_err());
            });
        drop(tx);

        let mut outcomes = Vec::new();
        while let Some(failed) = rx.recv().await {
            outcomes.push(failed);
        }
        assert_eq!(outcomes, vec![true, true, true]);
    }

    #[tokio::test]
    async fn test_batch_on_closed_client_fails_once() {
        let client = unreachable_client().await;
        client.close().await;
        let callbacks = CallbackClient::on_current_runtime(client);

        let (tx, mut rx) = mpsc::unbounded_channel();
        callbacks.find_batch("people", JsonObject::new(), move |item| {
            let _ = tx.send(item.map(|doc| doc.is_some()));
        });

        let first = rx.recv().await.expect("handler called");
        assert!(matches!(first, Err(ClientError::Closed)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_batch() {
        let client = unreachable_client().await;
        let callbacks = CallbackClient::on_current_runtime(client);

        let (tx, mut rx) = mpsc::unbounded_channel();
        callbacks.find_batch("people", JsonObject::new(), move |item| {
            let _ = tx.send(item.map(|doc| doc.is_some()));
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
        callbacks.close(move |r| {
            let _ = closed_tx.send(r.is_ok());
        });

        let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch ended before the server selection timeout")
            .expect("handler called");
        assert!(matches!(delivered, Err(ClientError::Closed)));
        assert!(rx.recv().await.is_none());
        assert!(closed_rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_run_command_error_delivered_to_handler() {
        let client = unreachable_client().await;
        let callbacks = CallbackClient::on_current_runtime(Arc::clone(&client));

        let (tx, rx) = tokio::sync::oneshot::channel();
        callbacks.run_command("count", object(json!({ "query": {} })), move |r| {
            let _ = tx.send(r.map(|_| ()));
        });

        let outcome = rx.await.unwrap();
        assert!(matches!(
            outcome,
            Err(ClientError::Execution(crate::error::ExecutionError::InvalidParameters(_)))
        ));
        client.close().await;
    }
}
