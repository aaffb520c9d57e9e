//! The single staged snapshot.
//!
//! Exactly one snapshot exists at a time under [`SNAPSHOT_KEY`]. Every write
//! replaces it whole. Writes and the expiry check-then-remove share one lock,
//! so a stale read can never delete a snapshot written after it.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bookmark::BookmarkRecord;
use crate::clock::Clock;
use crate::dedupe::dedupe;
use crate::error::{Result, StoreError};
use crate::kv::KeyValueStore;
use crate::validator::is_valid_url;

pub const SNAPSHOT_KEY: &str = "bookmarks_data";

/// Where older releases kept the stage for the lifetime of a browser session.
pub const LEGACY_SESSION_KEY: &str = "session:bookmarks_data";

pub fn default_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedSnapshot {
    #[serde(alias = "data")]
    pub records: Vec<BookmarkRecord>,
    /// Epoch milliseconds.
    #[serde(rename = "capturedAt", alias = "savedAt")]
    pub captured_at: i64,
    pub count: usize,
}

impl StagedSnapshot {
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.captured_at
    }
}

pub struct StagingStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl StagingStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Dedupe and replace the snapshot, stamped with the current time.
    pub async fn save(&self, records: Vec<BookmarkRecord>) -> Result<StagedSnapshot> {
        let _guard = self.write_lock.lock().await;

        let records = dedupe(records);
        let snapshot = StagedSnapshot {
            count: records.len(),
            records,
            captured_at: self.clock.now_millis(),
        };

        self.write(&snapshot).await?;

        debug!("Staged {} bookmarks", snapshot.count);
        Ok(snapshot)
    }

    pub async fn snapshot(&self) -> Result<Option<StagedSnapshot>> {
        read_snapshot(self.store.as_ref(), SNAPSHOT_KEY).await
    }

    /// Staged records, or an empty list when nothing is staged.
    pub async fn load(&self) -> Result<Vec<BookmarkRecord>> {
        Ok(self.snapshot().await?.map(|s| s.records).unwrap_or_default())
    }

    /// True iff a snapshot exists and is older than `ttl`.
    pub async fn is_expired(&self, ttl: Duration) -> Result<bool> {
        let snapshot = self.snapshot().await?;
        Ok(self.is_stale(snapshot.as_ref(), ttl))
    }

    /// Remove the snapshot if it is stale. Returns whether it was removed.
    pub async fn expire_if_stale(&self, ttl: Duration) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let snapshot = self.snapshot().await?;
        if !self.is_stale(snapshot.as_ref(), ttl) {
            return Ok(false);
        }

        self.store.remove(SNAPSHOT_KEY).await?;
        if let Some(snapshot) = snapshot {
            info!(
                "🗑️  Expired staged snapshot of {} bookmarks ({} h old)",
                snapshot.count,
                snapshot.age_millis(self.clock.now_millis()) / 3_600_000
            );
        }
        Ok(true)
    }

    /// Move a snapshot left under the legacy session key into the durable slot.
    ///
    /// Migrated records go through the same URL check and dedupe as a fresh
    /// write, but keep their original capture time. An existing durable
    /// snapshot is left alone; the legacy entry is removed either way.
    pub async fn migrate_legacy(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(legacy) = read_snapshot(self.store.as_ref(), LEGACY_SESSION_KEY).await? else {
            return Ok(false);
        };

        let migrated = if self.store.get(SNAPSHOT_KEY).await?.is_none() {
            let before = legacy.records.len();
            let records = dedupe(legacy.records.into_iter().filter(|r| is_valid_url(&r.url)));
            let snapshot = StagedSnapshot {
                count: records.len(),
                records,
                captured_at: legacy.captured_at,
            };
            self.write(&snapshot).await?;
            info!(
                "📦 Migrated {} staged bookmarks from session storage ({} dropped)",
                snapshot.count,
                before - snapshot.count
            );
            true
        } else {
            false
        };

        self.store.remove(LEGACY_SESSION_KEY).await?;
        Ok(migrated)
    }

    async fn write(&self, snapshot: &StagedSnapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot).map_err(|source| StoreError::Encode {
            key: SNAPSHOT_KEY.to_string(),
            source,
        })?;
        self.store.set(SNAPSHOT_KEY, value).await?;
        Ok(())
    }

    fn is_stale(&self, snapshot: Option<&StagedSnapshot>, ttl: Duration) -> bool {
        snapshot
            .map(|s| s.age_millis(self.clock.now_millis()) > ttl.num_milliseconds())
            .unwrap_or(false)
    }
}

async fn read_snapshot(store: &dyn KeyValueStore, key: &str) -> Result<Option<StagedSnapshot>> {
    let Some(value) = store.get(key).await? else {
        return Ok(None);
    };
    let mut snapshot: StagedSnapshot =
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })?;
    snapshot.count = snapshot.records.len();
    Ok(Some(snapshot))
}
