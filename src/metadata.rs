//! Install and usage bookkeeping, kept under its own key.
//!
//! Expiry never touches this record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::kv::KeyValueStore;

pub const METADATA_KEY: &str = "sync_metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub installed_at: i64,
    pub version: String,
    #[serde(default)]
    pub total_syncs: u64,
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub last_maintenance: Option<i64>,
}

impl SyncMetadata {
    fn fresh(now: i64) -> Self {
        Self {
            installed_at: now,
            version: env!("CARGO_PKG_VERSION").to_string(),
            total_syncs: 0,
            last_update: None,
            last_maintenance: None,
        }
    }
}

pub struct MetadataStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<Option<SyncMetadata>> {
        let Some(value) = self.store.get(METADATA_KEY).await? else {
            return Ok(None);
        };
        let metadata = serde_json::from_value(value).map_err(|source| StoreError::Decode {
            key: METADATA_KEY.to_string(),
            source,
        })?;
        Ok(Some(metadata))
    }

    /// Create the record on first use, otherwise return what is stored.
    pub async fn ensure_initialized(&self) -> Result<SyncMetadata> {
        self.update(|_| {}).await
    }

    pub async fn touch_update(&self) -> Result<SyncMetadata> {
        let now = self.clock.now_millis();
        self.update(|m| m.last_update = Some(now)).await
    }

    pub async fn record_sync(&self) -> Result<SyncMetadata> {
        self.update(|m| m.total_syncs += 1).await
    }

    pub async fn record_maintenance(&self) -> Result<SyncMetadata> {
        let now = self.clock.now_millis();
        self.update(|m| m.last_maintenance = Some(now)).await
    }

    /// Read-modify-write under the store lock.
    async fn update(&self, apply: impl FnOnce(&mut SyncMetadata) + Send) -> Result<SyncMetadata> {
        let _guard = self.lock.lock().await;

        let mut metadata = match self.load().await? {
            Some(existing) => existing,
            None => {
                info!("📋 First run, initialising metadata");
                SyncMetadata::fresh(self.clock.now_millis())
            }
        };
        apply(&mut metadata);

        let value = serde_json::to_value(&metadata).map_err(|source| StoreError::Encode {
            key: METADATA_KEY.to_string(),
            source,
        })?;
        self.store.set(METADATA_KEY, value).await?;
        Ok(metadata)
    }
}
