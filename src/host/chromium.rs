//! Chromium profile `Bookmarks` file as a bookmark host.
//!
//! Reads go to disk every time so the tree reflects edits made by the browser
//! between calls. Writes append a node, drop the stale checksum (Chromium
//! recomputes it) and replace the file through a temp file + rename. The first
//! write of a session copies the original to `Bookmarks.backup`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BookmarkHost, HostFlavor, HostResult};
use crate::error::HostError;
use crate::tree::{BookmarkNode, NodeId};

/// Microseconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

/// Root keys in display order.
const ROOT_KEYS: &[&str] = &["bookmark_bar", "other", "synced"];

pub struct ChromiumHost {
    path: PathBuf,
    /// Held across each read-modify-write; the flag records whether the
    /// session backup exists yet.
    write_lock: Mutex<bool>,
}

impl ChromiumHost {
    pub fn open(path: impl Into<PathBuf>) -> HostResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(HostError::Unavailable(format!(
                "Chromium bookmarks file not found: {:?}",
                path
            )));
        }
        debug!("Found Chromium bookmarks at: {:?}", path);

        if let Some(profile_dir) = path.parent() {
            let status = CloudSyncStatus::detect(profile_dir);
            status.show_warning();
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> HostResult<Value> {
        let data = tokio::fs::read_to_string(&self.path).await?;
        let document: Value = serde_json::from_str(&data)
            .map_err(|e| HostError::Corrupt(format!("{:?}: {}", self.path, e)))?;
        if document.get("roots").and_then(Value::as_object).is_none() {
            return Err(HostError::Corrupt(format!("{:?}: missing `roots`", self.path)));
        }
        Ok(document)
    }

    async fn write_document(&self, document: &Value, backed_up: &mut bool) -> HostResult<()> {
        if !*backed_up {
            let backup_path = self.path.with_extension("backup");
            tokio::fs::copy(&self.path, &backup_path).await?;
            info!("💾 Backup created: {:?}", backup_path);
            *backed_up = true;
        }

        let data = serde_json::to_string_pretty(document)
            .map_err(|e| HostError::Corrupt(e.to_string()))?;
        let tmp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read, append `node` under `parent`, write back. Returns the new id.
    async fn append(&self, parent: &NodeId, mut node: Map<String, Value>) -> HostResult<NodeId> {
        let mut backed_up = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        let id = max_node_id(&document) + 1;
        node.insert("id".into(), Value::String(id.to_string()));
        node.insert("guid".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        node.insert("date_added".into(), Value::String(chromium_now().to_string()));

        let parent_node = document
            .get_mut("roots")
            .and_then(Value::as_object_mut)
            .and_then(|roots| {
                roots
                    .values_mut()
                    .find_map(|root| find_folder_mut(root, parent.as_str()))
            })
            .ok_or_else(|| HostError::ParentNotFound(parent.to_string()))?;

        let children = parent_node
            .as_object_mut()
            .ok_or_else(|| HostError::Corrupt("folder is not an object".into()))?
            .entry("children")
            .or_insert_with(|| Value::Array(Vec::new()));
        children
            .as_array_mut()
            .ok_or_else(|| HostError::Corrupt("children is not an array".into()))?
            .push(Value::Object(node));

        if let Some(obj) = document.as_object_mut() {
            obj.remove("checksum");
        }
        self.write_document(&document, &mut *backed_up).await?;
        Ok(NodeId(id.to_string()))
    }
}

#[async_trait]
impl BookmarkHost for ChromiumHost {
    async fn get_tree(&self) -> HostResult<BookmarkNode> {
        let document = self.read_document().await?;
        let tree = parse_chromium_tree(&document);
        debug!(
            "Read {} links from Chromium bookmarks",
            tree.links().count()
        );
        Ok(tree)
    }

    async fn create_container(&self, parent: &NodeId, title: &str) -> HostResult<NodeId> {
        let mut node = Map::new();
        node.insert("type".into(), json!("folder"));
        node.insert("name".into(), json!(title));
        node.insert("children".into(), json!([]));
        node.insert("date_modified".into(), json!(chromium_now().to_string()));
        self.append(parent, node).await
    }

    async fn create_link(&self, parent: &NodeId, title: &str, url: &str) -> HostResult<NodeId> {
        let mut node = Map::new();
        node.insert("type".into(), json!("url"));
        node.insert("name".into(), json!(title));
        node.insert("url".into(), json!(url));
        self.append(parent, node).await
    }

    fn flavor(&self) -> HostFlavor {
        HostFlavor::Chromium
    }
}

/// First existing `Default/Bookmarks` among the common Chromium-family profiles.
pub fn detect_default_bookmarks() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(config) = dirs::config_dir() {
        for profile in [
            "Google/Chrome",
            "google-chrome",
            "chromium",
            "BraveSoftware/Brave-Browser",
            "Microsoft Edge",
            "microsoft-edge",
        ] {
            candidates.push(config.join(profile).join("Default").join("Bookmarks"));
        }
    }

    if let Some(local) = dirs::data_local_dir() {
        for profile in [
            "Google/Chrome/User Data",
            "BraveSoftware/Brave-Browser/User Data",
            "Microsoft/Edge/User Data",
        ] {
            candidates.push(local.join(profile).join("Default").join("Bookmarks"));
        }
    }

    let found = candidates.into_iter().find(|p| p.exists());
    if let Some(path) = &found {
        debug!("Detected Chromium bookmarks at: {:?}", path);
    }
    found
}

/// Build the tree: a synthetic root "0" over the profile's root folders.
pub fn parse_chromium_tree(document: &Value) -> BookmarkNode {
    let mut root = BookmarkNode::container("0", "", Vec::new());

    if let Some(roots) = document.get("roots").and_then(Value::as_object) {
        for key in ROOT_KEYS {
            if let Some(node) = roots.get(*key) {
                root.children.push(parse_chromium_node(node));
            }
        }
    }

    root
}

fn parse_chromium_node(node: &Value) -> BookmarkNode {
    let is_folder = node.get("type").and_then(Value::as_str) != Some("url");

    BookmarkNode {
        id: node.get("id").and_then(Value::as_str).map(NodeId::new),
        title: node.get("name").and_then(Value::as_str).map(str::to_string),
        url: if is_folder {
            None
        } else {
            node.get("url").and_then(Value::as_str).map(str::to_string)
        },
        date_added: node.get("date_added").and_then(parse_chromium_time),
        children: node
            .get("children")
            .and_then(Value::as_array)
            .map(|children| children.iter().map(parse_chromium_node).collect())
            .unwrap_or_default(),
    }
}

/// Chromium stores microseconds since 1601 as a decimal string.
fn parse_chromium_time(value: &Value) -> Option<i64> {
    let micros = match value {
        Value::String(s) => s.parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    if micros <= 0 {
        return None;
    }
    Some((micros - WINDOWS_EPOCH_OFFSET_MICROS) / 1000)
}

fn chromium_now() -> i64 {
    chrono::Utc::now().timestamp_micros() + WINDOWS_EPOCH_OFFSET_MICROS
}

fn max_node_id(document: &Value) -> u64 {
    fn walk(node: &Value, max: &mut u64) {
        if let Some(id) = node.get("id").and_then(Value::as_str).and_then(|s| s.parse::<u64>().ok()) {
            *max = (*max).max(id);
        }
        if let Some(children) = node.get("children").and_then(Value::as_array) {
            for child in children {
                walk(child, max);
            }
        }
    }

    let mut max = 0;
    if let Some(roots) = document.get("roots").and_then(Value::as_object) {
        for root in roots.values() {
            walk(root, &mut max);
        }
    }
    max
}

fn find_folder_mut<'a>(node: &'a mut Value, id: &str) -> Option<&'a mut Value> {
    let is_folder = node.get("type").and_then(Value::as_str) != Some("url");
    if is_folder && node.get("id").and_then(Value::as_str) == Some(id) {
        return Some(node);
    }
    node.get_mut("children")?
        .as_array_mut()?
        .iter_mut()
        .find_map(|child| find_folder_mut(child, id))
}

/// Browser cloud sync can overwrite local edits to the bookmarks file.
#[derive(Debug)]
pub struct CloudSyncStatus {
    pub sync_enabled: bool,
    pub signed_in_email: Option<String>,
}

impl CloudSyncStatus {
    /// Inspect the profile's `Preferences` file. Missing or unreadable means "off".
    pub fn detect(profile_dir: &Path) -> Self {
        let preferences_path = profile_dir.join("Preferences");
        let json = std::fs::read_to_string(&preferences_path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok());

        let Some(json) = json else {
            return Self {
                sync_enabled: false,
                signed_in_email: None,
            };
        };

        let email = json["account_info"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|acc| acc["email"].as_str())
            .map(|s| s.to_string());

        let sync_enabled = json["sync"]["has_setup_completed"]
            .as_bool()
            .unwrap_or(false)
            || email.is_some();

        Self {
            sync_enabled,
            signed_in_email: email,
        }
    }

    pub fn show_warning(&self) {
        if !self.sync_enabled {
            return;
        }
        warn!("⚠️  Browser cloud sync detected for this profile");
        if let Some(email) = &self.signed_in_email {
            warn!("   📧 Account: {}", email);
        }
        warn!("   Cloud data may overwrite links pushed while the browser is closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Value {
        json!({
            "checksum": "abc",
            "roots": {
                "bookmark_bar": {
                    "id": "1", "name": "Bookmarks bar", "type": "folder",
                    "children": [
                        {
                            "id": "4", "name": "Rust", "type": "url",
                            "url": "https://www.rust-lang.org/",
                            "date_added": "13300000000000000"
                        },
                        {
                            "id": "5", "name": "Docs", "type": "folder",
                            "children": [
                                { "id": "6", "name": "docs.rs", "type": "url", "url": "https://docs.rs/" }
                            ]
                        }
                    ]
                },
                "other": { "id": "2", "name": "Other bookmarks", "type": "folder", "children": [] },
                "synced": { "id": "3", "name": "Mobile bookmarks", "type": "folder", "children": [] }
            },
            "version": 1
        })
    }

    #[test]
    fn test_parse_tree_shape() {
        let tree = parse_chromium_tree(&sample_document());
        assert_eq!(tree.children.len(), 3);
        assert_eq!(tree.links().count(), 2);
        assert_eq!(
            tree.find_container("Docs").and_then(|n| n.id.clone()),
            Some(NodeId::new("5"))
        );
    }

    #[test]
    fn test_chromium_time_conversion() {
        let millis = parse_chromium_time(&json!("13300000000000000")).unwrap();
        assert_eq!(millis, (13_300_000_000_000_000 - WINDOWS_EPOCH_OFFSET_MICROS) / 1000);
        assert!(parse_chromium_time(&json!("0")).is_none());
        assert!(parse_chromium_time(&json!("garbage")).is_none());
    }

    #[test]
    fn test_max_node_id() {
        assert_eq!(max_node_id(&sample_document()), 6);
    }

    #[tokio::test]
    async fn test_create_writes_file_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Bookmarks");
        std::fs::write(&path, serde_json::to_string(&sample_document()).unwrap()).unwrap();

        let host = ChromiumHost::open(&path).unwrap();
        let folder = host.create_container(&NodeId::new("1"), "Imported").await.unwrap();
        assert_eq!(folder, NodeId::new("7"));
        let link = host
            .create_link(&folder, "Example", "https://example.com/")
            .await
            .unwrap();
        assert_eq!(link, NodeId::new("8"));

        let tree = host.get_tree().await.unwrap();
        let imported = tree.find_container("Imported").unwrap();
        assert_eq!(imported.children.len(), 1);
        assert_eq!(imported.children[0].url.as_deref(), Some("https://example.com/"));

        assert!(path.with_extension("backup").exists());
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.get("checksum").is_none());
    }

    #[tokio::test]
    async fn test_link_parent_must_be_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Bookmarks");
        std::fs::write(&path, serde_json::to_string(&sample_document()).unwrap()).unwrap();

        let host = ChromiumHost::open(&path).unwrap();
        let err = host
            .create_link(&NodeId::new("4"), "x", "https://x.test/")
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::ParentNotFound(_)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = ChromiumHost::open("/nonexistent/Bookmarks").err().unwrap();
        assert!(matches!(err, HostError::Unavailable(_)));
    }

    #[test]
    fn test_cloud_sync_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!CloudSyncStatus::detect(dir.path()).sync_enabled);

        std::fs::write(
            dir.path().join("Preferences"),
            r#"{"account_info":[{"email":"me@example.com"}]}"#,
        )
        .unwrap();
        let status = CloudSyncStatus::detect(dir.path());
        assert!(status.sync_enabled);
        assert_eq!(status.signed_in_email.as_deref(), Some("me@example.com"));
    }
}
