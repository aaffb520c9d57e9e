//! Capture, push, import and export against one staged snapshot.
//!
//! Only one operation runs at a time per engine. A trigger that arrives while
//! another is in flight is rejected with [`StageError::Busy`] instead of being
//! interleaved with it.

use chrono::Duration;
use indicatif::ProgressBar;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::bookmark::BookmarkRecord;
use crate::clock::Clock;
use crate::codec::{self, Format};
use crate::dedupe::duplicate_count;
use crate::error::{Result, StageError};
use crate::host::BookmarkHost;
use crate::kv::KeyValueStore;
use crate::metadata::{MetadataStore, SyncMetadata};
use crate::notify::{Notifier, StageEvent};
use crate::progress;
use crate::resolver::{FolderResolver, DEFAULT_FOLDER_TITLE};
use crate::staging::{default_ttl, StagedSnapshot, StagingStore};
use crate::tree::{collect_urls, flatten_links, BookmarkNode, NodeId};
use crate::validator::is_valid_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Idle,
    Capturing,
    Applying,
    Importing,
    Exporting,
    Expiring,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Idle => "idle",
            OperationState::Capturing => "capturing",
            OperationState::Applying => "applying",
            OperationState::Importing => "importing",
            OperationState::Exporting => "exporting",
            OperationState::Expiring => "expiring",
        };
        f.write_str(name)
    }
}

/// Puts the engine back to `Idle` however the operation ends.
struct StateGuard<'a> {
    state: &'a Mutex<OperationState>,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = OperationState::Idle;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub count: usize,
    /// Links collapsed because their URL appeared more than once in the tree.
    pub duplicates: usize,
    /// Links left out because their URL is not `http`/`https`.
    pub skipped: usize,
    pub captured_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingToSync {
    /// Nothing is staged.
    EmptyStage,
    /// Every staged URL is already in the live tree.
    AllPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Defined success with no container created.
    NothingToSync(NothingToSync),
    /// Links were requested under `container`; `failed` lists the ones the
    /// host refused.
    Applied {
        container: NodeId,
        added: usize,
        failed: Vec<PushFailure>,
    },
}

impl PushOutcome {
    pub fn added(&self) -> usize {
        match self {
            PushOutcome::NothingToSync(_) => 0,
            PushOutcome::Applied { added, .. } => *added,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, PushOutcome::Applied { failed, .. } if !failed.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    EmptyStage,
    Exported { payload: String, count: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageStatus {
    pub snapshot: Option<StagedSnapshot>,
    pub expired: bool,
    pub metadata: Option<SyncMetadata>,
    pub state: OperationState,
}

impl StageStatus {
    pub fn count(&self) -> usize {
        self.snapshot.as_ref().map(|s| s.count).unwrap_or(0)
    }
}

/// Staged records whose URL is not already live, in staged order.
///
/// A URL repeated inside `staged` is planned once.
pub fn plan_push(staged: &[BookmarkRecord], live: &BookmarkNode) -> Vec<BookmarkRecord> {
    let mut seen = collect_urls(live);
    staged
        .iter()
        .filter(|record| seen.insert(record.url.clone()))
        .cloned()
        .collect()
}

pub struct StageEngine {
    host: Arc<dyn BookmarkHost>,
    staging: StagingStore,
    metadata: MetadataStore,
    resolver: FolderResolver,
    notifier: Notifier,
    folder_title: String,
    ttl: Duration,
    show_progress: bool,
    state: Mutex<OperationState>,
}

impl StageEngine {
    pub fn new(host: Arc<dyn BookmarkHost>, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            host,
            staging: StagingStore::new(store.clone(), clock.clone()),
            metadata: MetadataStore::new(store, clock),
            resolver: FolderResolver::default(),
            notifier: Notifier::default(),
            folder_title: DEFAULT_FOLDER_TITLE.to_string(),
            ttl: default_ttl(),
            show_progress: false,
            state: Mutex::new(OperationState::Idle),
        }
    }

    pub fn with_resolver(mut self, resolver: FolderResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_folder_title(mut self, title: impl Into<String>) -> Self {
        self.folder_title = title.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn state(&self) -> OperationState {
        *self.lock_state()
    }

    /// First-run bookkeeping and migration of a session-scoped stage.
    pub async fn initialize(&self) -> Result<()> {
        self.metadata.ensure_initialized().await?;
        self.staging.migrate_legacy().await?;
        Ok(())
    }

    /// Replace the stage with every `http`/`https` link currently in the live tree.
    pub async fn capture_pull(&self) -> Result<CaptureOutcome> {
        let _guard = self.begin(OperationState::Capturing)?;

        info!("📖 Reading live bookmark tree");
        let tree = self.host.get_tree().await?;
        let (links, rejected): (Vec<_>, Vec<_>) =
            flatten_links(&tree).into_iter().partition(|record| is_valid_url(&record.url));
        for record in &rejected {
            debug!("Not staging {}: scheme not allowed", record.url);
        }
        let duplicates = duplicate_count(&links);

        let snapshot = self.staging.save(links).await?;
        self.after_stage_write(&snapshot).await;

        info!(
            "✅ Staged {} bookmarks ({} duplicates collapsed, {} skipped)",
            snapshot.count,
            duplicates,
            rejected.len()
        );
        Ok(CaptureOutcome {
            count: snapshot.count,
            duplicates,
            skipped: rejected.len(),
            captured_at: snapshot.captured_at,
        })
    }

    /// Staged records missing from the live tree, without changing anything.
    pub async fn pending_push(&self) -> Result<Vec<BookmarkRecord>> {
        let _guard = self.begin(OperationState::Applying)?;

        let staged = self.staging.load().await?;
        if staged.is_empty() {
            return Ok(Vec::new());
        }
        let tree = self.host.get_tree().await?;
        Ok(plan_push(&staged, &tree))
    }

    /// Add staged links missing from the live tree under `folder`, or the
    /// configured folder title.
    pub async fn push(&self, folder: Option<&str>) -> Result<PushOutcome> {
        let _guard = self.begin(OperationState::Applying)?;

        let staged = self.staging.load().await?;
        if staged.is_empty() {
            info!("📭 Nothing staged, nothing to push");
            return Ok(PushOutcome::NothingToSync(NothingToSync::EmptyStage));
        }

        let tree = self.host.get_tree().await?;
        let to_add = plan_push(&staged, &tree);
        info!("🔄 {} of {} staged bookmarks are missing from the live tree", to_add.len(), staged.len());

        self.apply(&to_add, &tree, folder).await
    }

    /// Create one link per record under the resolved container.
    ///
    /// The live tree is read again so the container lookup sees current state.
    pub async fn execute_push(&self, to_add: &[BookmarkRecord], folder: Option<&str>) -> Result<PushOutcome> {
        let _guard = self.begin(OperationState::Applying)?;

        if to_add.is_empty() {
            return Ok(PushOutcome::NothingToSync(NothingToSync::AllPresent));
        }
        let tree = self.host.get_tree().await?;
        self.apply(to_add, &tree, folder).await
    }

    async fn apply(&self, to_add: &[BookmarkRecord], tree: &BookmarkNode, folder: Option<&str>) -> Result<PushOutcome> {
        if to_add.is_empty() {
            info!("✅ Every staged bookmark is already present");
            return Ok(PushOutcome::NothingToSync(NothingToSync::AllPresent));
        }

        let title = folder.unwrap_or(&self.folder_title);
        let container = self.resolver.resolve(self.host.as_ref(), tree, title).await?;

        let pb = self.progress_bar(to_add.len() as u64, "Pushing bookmarks");
        let mut added = 0;
        let mut failed = Vec::new();

        for record in to_add {
            match self.host.create_link(&container, &record.title, &record.url).await {
                Ok(id) => {
                    debug!("Added {} as {}", record.url, id);
                    added += 1;
                }
                Err(e) => {
                    warn!("⚠️  Failed to add {}: {}", record.url, e);
                    failed.push(PushFailure {
                        url: record.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
            pb.inc(1);
        }

        if failed.is_empty() {
            progress::finish_with_success(&pb, &format!("Added {} bookmarks", added));
        } else {
            progress::finish_with_error(&pb, &format!("Added {}, {} failed", added, failed.len()));
        }

        if added > 0 {
            if let Err(e) = self.metadata.record_sync().await {
                warn!("⚠️  Could not update sync counter: {}", e);
            }
        }

        info!("✅ Push finished: {} added, {} failed", added, failed.len());
        Ok(PushOutcome::Applied {
            container,
            added,
            failed,
        })
    }

    /// Decode `payload` and replace the stage with its valid records.
    pub async fn import(&self, payload: &str, format: Format) -> Result<ImportOutcome> {
        let _guard = self.begin(OperationState::Importing)?;

        let outcome = codec::decode(payload, format)?;
        if outcome.skipped > 0 {
            warn!("⚠️  Skipped {} invalid bookmarks", outcome.skipped);
        }

        let snapshot = self.staging.save(outcome.records).await?;
        self.after_stage_write(&snapshot).await;

        info!("📥 Imported {} bookmarks from {}", snapshot.count, format);
        Ok(ImportOutcome {
            imported: snapshot.count,
            skipped: outcome.skipped,
            duplicates: outcome.duplicates,
        })
    }

    pub async fn export(&self, format: Format) -> Result<ExportOutcome> {
        let _guard = self.begin(OperationState::Exporting)?;

        let records = self.staging.load().await?;
        if records.is_empty() {
            return Ok(ExportOutcome::EmptyStage);
        }

        let payload = codec::encode(&records, format)?;
        info!("📤 Exported {} bookmarks as {}", records.len(), format);
        Ok(ExportOutcome::Exported {
            payload,
            count: records.len(),
        })
    }

    pub async fn status(&self) -> Result<StageStatus> {
        let snapshot = self.staging.snapshot().await?;
        let expired = self.staging.is_expired(self.ttl).await?;
        Ok(StageStatus {
            snapshot,
            expired,
            metadata: self.metadata.load().await?,
            state: self.state(),
        })
    }

    /// Drop the stage if it is older than the configured TTL.
    pub async fn expire_if_stale(&self) -> Result<bool> {
        let _guard = self.begin(OperationState::Expiring)?;
        self.staging.expire_if_stale(self.ttl).await
    }

    /// Bookkeeping once a new snapshot is durable. The write already happened,
    /// so a metadata failure only warns.
    async fn after_stage_write(&self, snapshot: &StagedSnapshot) {
        if let Err(e) = self.metadata.touch_update().await {
            warn!("⚠️  Could not record update time: {}", e);
        }
        self.notifier.notify(StageEvent::StagedDataChanged { count: snapshot.count });
    }

    fn begin(&self, next: OperationState) -> Result<StateGuard<'_>> {
        let mut state = self.lock_state();
        if *state != OperationState::Idle {
            return Err(StageError::Busy { state: *state });
        }
        *state = next;
        Ok(StateGuard { state: &self.state })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, OperationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn progress_bar(&self, total: u64, message: &str) -> ProgressBar {
        if self.show_progress {
            progress::create_bookmark_progress_bar(total, message)
        } else {
            ProgressBar::hidden()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::host::MemoryHost;
    use crate::kv::{MemoryStore, StoreResult};
    use crate::metadata::METADATA_KEY;
    use chrono::Utc;
    use serde_json::Value;

    /// Refuses every write to the metadata key.
    #[derive(Default)]
    struct ReadOnlyMetadata {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for ReadOnlyMetadata {
        async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
            if key == METADATA_KEY {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "metadata is read-only",
                )));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StoreResult<()> {
            self.inner.remove(key).await
        }
    }

    fn rec(title: &str, url: &str) -> BookmarkRecord {
        BookmarkRecord::new(title, url, 1)
    }

    fn engine_with(host: Arc<MemoryHost>) -> StageEngine {
        StageEngine::new(
            host,
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    #[test]
    fn test_plan_push_skips_live_urls() {
        let live = BookmarkNode::container(
            "0",
            "",
            vec![
                BookmarkNode::link("1", "u1", "https://u1.test/"),
                BookmarkNode::link("2", "u2", "https://u2.test/"),
            ],
        );
        let staged = vec![rec("u1", "https://u1.test/"), rec("u3", "https://u3.test/")];
        let plan = plan_push(&staged, &live);
        assert_eq!(plan, vec![rec("u3", "https://u3.test/")]);
    }

    #[test]
    fn test_plan_push_keeps_staged_order() {
        let live = BookmarkNode::container("0", "", vec![]);
        let staged = vec![
            rec("c", "https://c.test/"),
            rec("a", "https://a.test/"),
            rec("c again", "https://c.test/"),
            rec("b", "https://b.test/"),
        ];
        let urls: Vec<_> = plan_push(&staged, &live).into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://c.test/", "https://a.test/", "https://b.test/"]);
    }

    #[tokio::test]
    async fn test_capture_replaces_stage_and_notifies() {
        let host = Arc::new(MemoryHost::chromium_with(vec![
            BookmarkNode::link("10", "A", "https://a.test/"),
            BookmarkNode::link("11", "A again", "https://a.test/"),
            BookmarkNode::link("12", "B", "https://b.test/"),
        ]));
        let engine = engine_with(host);
        let mut events = engine.notifier().subscribe();

        let outcome = engine.capture_pull().await.unwrap();
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(events.recv().await.unwrap(), StageEvent::StagedDataChanged { count: 2 });
        assert_eq!(engine.state(), OperationState::Idle);

        let staged = engine.staging().load().await.unwrap();
        assert_eq!(staged[0].title, "A again");
        assert!(engine.metadata().load().await.unwrap().unwrap().last_update.is_some());
    }

    #[tokio::test]
    async fn test_capture_leaves_out_non_web_links() {
        let host = Arc::new(MemoryHost::chromium_with(vec![
            BookmarkNode::link("10", "Site", "https://site.test/"),
            BookmarkNode::link("11", "Bookmarklet", "javascript:alert(document.cookie)"),
            BookmarkNode::link("12", "Local", "file:///etc/passwd"),
        ]));
        let engine = engine_with(host);

        let outcome = engine.capture_pull().await.unwrap();
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.duplicates, 0);

        let ExportOutcome::Exported { payload, .. } = engine.export(Format::Html).await.unwrap() else {
            panic!("expected export");
        };
        assert!(!payload.contains("javascript:"));
        assert!(!payload.contains("file:"));
        assert!(payload.contains("HREF=\"https://site.test/\""));
    }

    #[tokio::test]
    async fn test_stage_write_survives_metadata_failure() {
        let host = Arc::new(MemoryHost::chromium_with(vec![BookmarkNode::link(
            "10",
            "A",
            "https://a.test/",
        )]));
        let engine = StageEngine::new(
            host,
            Arc::new(ReadOnlyMetadata::default()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let mut events = engine.notifier().subscribe();

        let outcome = engine.capture_pull().await.unwrap();
        assert_eq!(outcome.count, 1);
        assert_eq!(events.recv().await.unwrap(), StageEvent::StagedDataChanged { count: 1 });

        let outcome = engine
            .import(r#"[{"title":"B","url":"https://b.test/"}]"#, Format::Json)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(events.recv().await.unwrap(), StageEvent::StagedDataChanged { count: 1 });
        assert_eq!(engine.staging().load().await.unwrap()[0].url, "https://b.test/");
        assert!(engine.metadata().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_empty_stage_creates_nothing() {
        let host = Arc::new(MemoryHost::chromium_with(vec![]));
        let engine = engine_with(host.clone());
        let outcome = engine.push(None).await.unwrap();
        assert_eq!(outcome, PushOutcome::NothingToSync(NothingToSync::EmptyStage));
        assert_eq!(host.containers_created(), 0);
    }

    #[tokio::test]
    async fn test_execute_push_empty_plan_creates_nothing() {
        let host = Arc::new(MemoryHost::chromium_with(vec![]));
        let engine = engine_with(host.clone());
        let outcome = engine.execute_push(&[], None).await.unwrap();
        assert_eq!(outcome, PushOutcome::NothingToSync(NothingToSync::AllPresent));
        assert_eq!(host.containers_created(), 0);
    }

    #[tokio::test]
    async fn test_host_read_failure_aborts_and_resets_state() {
        let host = Arc::new(MemoryHost::chromium_with(vec![]));
        host.set_fail_reads(true);
        let engine = engine_with(host);

        let err = engine.capture_pull().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.state(), OperationState::Idle);
    }

    #[tokio::test]
    async fn test_push_counts_sync_in_metadata() {
        let host = Arc::new(MemoryHost::chromium_with(vec![]));
        let engine = engine_with(host);
        engine.staging().save(vec![rec("a", "https://a.test/")]).await.unwrap();

        engine.push(Some("Restored")).await.unwrap();
        engine.push(Some("Restored")).await.unwrap();

        let meta = engine.metadata().load().await.unwrap().unwrap();
        assert_eq!(meta.total_syncs, 1);
    }

    #[tokio::test]
    async fn test_export_empty_stage() {
        let engine = engine_with(Arc::new(MemoryHost::chromium_with(vec![])));
        assert_eq!(engine.export(Format::Json).await.unwrap(), ExportOutcome::EmptyStage);
    }

    #[tokio::test]
    async fn test_import_then_export_json() {
        let engine = engine_with(Arc::new(MemoryHost::chromium_with(vec![])));
        let outcome = engine
            .import(
                r#"[{"title":"A","url":"https://a.test/","addedAt":5},
                    {"title":"Bad","url":"file:///etc/passwd"}]"#,
                Format::Json,
            )
            .await
            .unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);

        let ExportOutcome::Exported { payload, count } = engine.export(Format::Json).await.unwrap() else {
            panic!("expected export");
        };
        assert_eq!(count, 1);
        assert!(payload.contains("\"addedAt\": 5"));
    }

    #[tokio::test]
    async fn test_failed_import_keeps_previous_stage() {
        let engine = engine_with(Arc::new(MemoryHost::chromium_with(vec![])));
        engine.staging().save(vec![rec("keep", "https://keep.test/")]).await.unwrap();

        let err = engine.import("{}", Format::Json).await.unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
        assert_eq!(engine.staging().load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_when_not_idle() {
        let engine = engine_with(Arc::new(MemoryHost::chromium_with(vec![])));
        let guard = engine.begin(OperationState::Capturing).unwrap();

        let err = engine.push(None).await.unwrap_err();
        assert!(matches!(err, StageError::Busy { state: OperationState::Capturing }));

        drop(guard);
        assert!(engine.push(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_reports_expiry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = StageEngine::new(
            Arc::new(MemoryHost::chromium_with(vec![])),
            Arc::new(MemoryStore::new()),
            clock.clone(),
        );
        engine.staging().save(vec![rec("a", "https://a.test/")]).await.unwrap();

        assert!(!engine.status().await.unwrap().expired);
        clock.advance(Duration::hours(30));
        let status = engine.status().await.unwrap();
        assert!(status.expired);
        assert_eq!(status.count(), 1);

        assert!(engine.expire_if_stale().await.unwrap());
        assert_eq!(engine.status().await.unwrap().count(), 0);
    }
}
