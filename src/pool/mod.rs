//! Process-wide registry of driver connection pools
//!
//! Every client is attached to a named pool. Shared clients use a name chosen
//! by the caller (or [`DEFAULT_POOL_NAME`]) and reuse the pool already
//! registered under it; non-shared clients register a pool under a fresh UUID.
//! Each entry counts the clients attached to it, and the driver client is shut
//! down in the background when the count drops to zero.
//!
//! The registry lock is only held for map updates, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use mongodb::Client;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::codec::JsonCodec;
use crate::config::ClientConfig;
use crate::error::{ConnectionError, Result};
use crate::options::write_concern_acknowledged;

/// Name of the pool used by shared clients that do not pick one.
pub const DEFAULT_POOL_NAME: &str = "DEFAULT_POOL";

/// A driver client plus the settings every operation on it needs.
#[derive(Debug)]
pub struct PoolHandle {
    name: String,
    client: Client,
    db_name: String,
    codec: JsonCodec,
    acknowledged_by_default: bool,
}

impl PoolHandle {
    async fn open(name: &str, config: &ClientConfig) -> Result<Self> {
        let (options, db_name) = config.to_client_options().await?;
        let acknowledged_by_default = write_concern_acknowledged(options.write_concern.as_ref());
        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            client,
            db_name,
            codec: JsonCodec::new(config.use_object_id),
            acknowledged_by_default,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> mongodb::Database {
        self.client.database(&self.db_name)
    }

    pub fn database_name(&self) -> &str {
        &self.db_name
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    /// Whether writes without an explicit write option are acknowledged.
    pub fn acknowledged_by_default(&self) -> bool {
        self.acknowledged_by_default
    }

    /// Shut the driver client down on a background task, dropping any open
    /// cursors. Returns without waiting for the driver.
    ///
    /// Outside a tokio runtime the driver client is only dropped, which
    /// releases its connections once the last clone goes away.
    pub fn shutdown(&self) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("Pool '{}' released outside a runtime", self.name);
            return;
        };
        let client = self.client.clone();
        let name = self.name.clone();
        runtime.spawn(async move {
            client.shutdown().immediate(true).await;
            info!("Pool '{}' shut down", name);
        });
    }
}

struct PoolEntry {
    handle: Arc<PoolHandle>,
    refs: usize,
}

static REGISTRY: LazyLock<Mutex<HashMap<String, PoolEntry>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<String, PoolEntry>> {
    // Entries stay consistent even if a holder panicked; keep going.
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Attach to the pool registered under `name`, creating it from `config` if
/// there is none yet.
///
/// An existing pool keeps the configuration it was created with.
pub async fn acquire(name: &str, config: &ClientConfig) -> Result<Arc<PoolHandle>> {
    let existing = {
        let mut pools = registry();
        pools.get_mut(name).map(|entry| {
            entry.refs += 1;
            (Arc::clone(&entry.handle), entry.refs)
        })
    };
    if let Some((handle, refs)) = existing {
        debug!("Reusing pool '{}' ({} clients)", name, refs);
        return Ok(handle);
    }

    let opened = Arc::new(PoolHandle::open(name, config).await?);

    // Another task may have registered the same name while we were opening.
    let mut pools = registry();
    let entry = pools.entry(name.to_string()).or_insert_with(|| PoolEntry {
        handle: Arc::clone(&opened),
        refs: 0,
    });
    entry.refs += 1;

    if Arc::ptr_eq(&entry.handle, &opened) {
        info!(
            "Created pool '{}' for database '{}'",
            name, opened.db_name
        );
    } else {
        debug!("Pool '{}' was created concurrently, reusing it", name);
    }
    Ok(Arc::clone(&entry.handle))
}

/// Detach one client from the pool registered under `name`.
///
/// Returns the handle when this was the last client, after removing it from
/// the registry; the caller decides whether to shut it down.
pub fn release(name: &str) -> Option<Arc<PoolHandle>> {
    let mut pools = registry();
    let entry = pools.get_mut(name)?;
    entry.refs = entry.refs.saturating_sub(1);
    if entry.refs > 0 {
        debug!("Released pool '{}' ({} clients left)", name, entry.refs);
        return None;
    }
    pools.remove(name).map(|entry| entry.handle)
}

/// Number of clients attached to the pool registered under `name`.
pub fn ref_count(name: &str) -> usize {
    registry().get(name).map_or(0, |entry| entry.refs)
}
