//! In-process bookmark tree, with optional injected failures.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{BookmarkHost, HostFlavor, HostResult};
use crate::bookmark::now_millis;
use crate::error::HostError;
use crate::tree::{BookmarkNode, NodeId};

pub struct MemoryHost {
    tree: Mutex<BookmarkNode>,
    flavor: HostFlavor,
    next_id: AtomicU64,
    fail_reads: AtomicBool,
    failing_urls: Mutex<HashSet<String>>,
    containers_created: AtomicUsize,
    links_created: AtomicUsize,
}

impl MemoryHost {
    pub fn new(tree: BookmarkNode, flavor: HostFlavor) -> Self {
        let next_id = tree
            .walk()
            .filter_map(|n| n.id.as_ref().and_then(|id| id.as_str().parse::<u64>().ok()))
            .max()
            .unwrap_or(0)
            + 1;

        Self {
            tree: Mutex::new(tree),
            flavor,
            next_id: AtomicU64::new(next_id),
            fail_reads: AtomicBool::new(false),
            failing_urls: Mutex::new(HashSet::new()),
            containers_created: AtomicUsize::new(0),
            links_created: AtomicUsize::new(0),
        }
    }

    /// A Chromium-shaped tree: root, bookmarks bar ("1"), other bookmarks ("2").
    pub fn chromium_with(links: Vec<BookmarkNode>) -> Self {
        let tree = BookmarkNode::container(
            "0",
            "",
            vec![
                BookmarkNode::container("1", "Bookmarks bar", links),
                BookmarkNode::container("2", "Other bookmarks", vec![]),
            ],
        );
        Self::new(tree, HostFlavor::Chromium)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `create_link` reject this URL.
    pub fn fail_link(&self, url: impl Into<String>) {
        self.lock_failing().insert(url.into());
    }

    pub fn clear_failures(&self) {
        self.lock_failing().clear();
        self.set_fail_reads(false);
    }

    pub fn containers_created(&self) -> usize {
        self.containers_created.load(Ordering::SeqCst)
    }

    pub fn links_created(&self) -> usize {
        self.links_created.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BookmarkNode {
        self.lock_tree().clone()
    }

    fn allocate_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    fn lock_tree(&self) -> std::sync::MutexGuard<'_, BookmarkNode> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing_urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, parent: &NodeId, node: BookmarkNode) -> HostResult<()> {
        let mut tree = self.lock_tree();
        let parent_node = tree
            .find_mut(parent)
            .filter(|n| !n.is_link())
            .ok_or_else(|| HostError::ParentNotFound(parent.to_string()))?;
        parent_node.children.push(node);
        Ok(())
    }
}

#[async_trait]
impl BookmarkHost for MemoryHost {
    async fn get_tree(&self) -> HostResult<BookmarkNode> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("injected read failure".into()));
        }
        Ok(self.snapshot())
    }

    async fn create_container(&self, parent: &NodeId, title: &str) -> HostResult<NodeId> {
        let id = self.allocate_id();
        let node = BookmarkNode::container(id.as_str(), title, vec![]).with_date_added(now_millis());
        self.insert(parent, node)?;
        self.containers_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn create_link(&self, parent: &NodeId, title: &str, url: &str) -> HostResult<NodeId> {
        if self.lock_failing().contains(url) {
            return Err(HostError::Rejected(format!("injected failure for {}", url)));
        }
        let id = self.allocate_id();
        let node = BookmarkNode::link(id.as_str(), title, url).with_date_added(now_millis());
        self.insert(parent, node)?;
        self.links_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn flavor(&self) -> HostFlavor {
        self.flavor
    }
}
