//! The live bookmark tree provider.
//!
//! The stage never deletes, moves or edits host bookmarks. The only writes it
//! may request are "create container" and "create link".

pub mod chromium;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::HostError;
use crate::tree::{BookmarkNode, NodeId};

pub use chromium::{detect_default_bookmarks, ChromiumHost};
pub use memory::MemoryHost;

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Browser-owned bookmark storage.
///
/// Every call is a suspension point that may fail; callers must not assume an
/// ordering between two calls they issue without awaiting the first.
#[async_trait]
pub trait BookmarkHost: Send + Sync {
    /// Snapshot of the whole tree, rooted at a single node.
    async fn get_tree(&self) -> HostResult<BookmarkNode>;

    async fn create_container(&self, parent: &NodeId, title: &str) -> HostResult<NodeId>;

    async fn create_link(&self, parent: &NodeId, title: &str, url: &str) -> HostResult<NodeId>;

    fn flavor(&self) -> HostFlavor;
}

/// Stand-in when no live tree is configured. Every call fails as unavailable.
#[derive(Debug, Clone)]
pub struct DetachedHost {
    reason: String,
}

impl DetachedHost {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl BookmarkHost for DetachedHost {
    async fn get_tree(&self) -> HostResult<BookmarkNode> {
        Err(HostError::Unavailable(self.reason.clone()))
    }

    async fn create_container(&self, _parent: &NodeId, _title: &str) -> HostResult<NodeId> {
        Err(HostError::Unavailable(self.reason.clone()))
    }

    async fn create_link(&self, _parent: &NodeId, _title: &str, _url: &str) -> HostResult<NodeId> {
        Err(HostError::Unavailable(self.reason.clone()))
    }

    fn flavor(&self) -> HostFlavor {
        HostFlavor::default()
    }
}

/// Which browser family owns the tree. Decides where new containers go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostFlavor {
    #[default]
    Chromium,
    Firefox,
}

impl HostFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            HostFlavor::Chromium => "Chromium",
            HostFlavor::Firefox => "Firefox",
        }
    }

    /// Where a fresh top-level container belongs when nothing else is configured.
    pub fn default_parent(&self, root: &BookmarkNode) -> Option<NodeId> {
        let preferred = match self {
            // Bookmarks bar
            HostFlavor::Chromium => root
                .children
                .iter()
                .find(|n| !n.is_link() && n.id.as_ref().map(NodeId::as_str) == Some("1")),
            HostFlavor::Firefox => root.children.iter().find(|n| {
                !n.is_link()
                    && (n.title.as_deref() == Some("toolbar")
                        || n.id.as_ref().map(NodeId::as_str) == Some("toolbar_____"))
            }),
        };

        preferred
            .or_else(|| root.children.iter().find(|n| !n.is_link()))
            .and_then(|n| n.id.clone())
            .or_else(|| root.id.clone())
    }
}

impl FromStr for HostFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" | "brave" | "edge" => Ok(HostFlavor::Chromium),
            "firefox" | "waterfox" => Ok(HostFlavor::Firefox),
            other => Err(format!("unknown host flavor: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chromium_root() -> BookmarkNode {
        BookmarkNode::container(
            "0",
            "",
            vec![
                BookmarkNode::container("1", "Bookmarks bar", vec![]),
                BookmarkNode::container("2", "Other bookmarks", vec![]),
            ],
        )
    }

    fn firefox_root() -> BookmarkNode {
        BookmarkNode::container(
            "root________",
            "",
            vec![
                BookmarkNode::container("menu________", "menu", vec![]),
                BookmarkNode::container("toolbar_____", "toolbar", vec![]),
            ],
        )
    }

    #[tokio::test]
    async fn test_detached_host_is_unavailable() {
        let host = DetachedHost::new("no bookmarks file configured");
        assert!(matches!(host.get_tree().await, Err(HostError::Unavailable(_))));
    }

    #[test]
    fn test_chromium_prefers_bookmark_bar() {
        assert_eq!(
            HostFlavor::Chromium.default_parent(&chromium_root()),
            Some(NodeId::new("1"))
        );
    }

    #[test]
    fn test_firefox_prefers_toolbar() {
        assert_eq!(
            HostFlavor::Firefox.default_parent(&firefox_root()),
            Some(NodeId::new("toolbar_____"))
        );
    }

    #[test]
    fn test_falls_back_to_first_container() {
        assert_eq!(
            HostFlavor::Chromium.default_parent(&firefox_root()),
            Some(NodeId::new("menu________"))
        );
    }

    #[test]
    fn test_empty_root_uses_root_itself() {
        let root = BookmarkNode::container("root", "", vec![]);
        assert_eq!(HostFlavor::Firefox.default_parent(&root), Some(NodeId::new("root")));
    }

    #[test]
    fn test_parse_flavor() {
        assert_eq!("Brave".parse::<HostFlavor>(), Ok(HostFlavor::Chromium));
        assert_eq!("firefox".parse::<HostFlavor>(), Ok(HostFlavor::Firefox));
        assert!("safari".parse::<HostFlavor>().is_err());
    }
}
