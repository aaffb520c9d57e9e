//! Live bookmark tree model and the read-only walks over it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::bookmark::{now_millis, BookmarkRecord};

/// Host-assigned node reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node in the host's tree. Nodes with a `url` are links; all others are
/// containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkNode {
    pub id: Option<NodeId>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date_added: Option<i64>,
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    pub fn container(id: impl Into<String>, title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        Self {
            id: Some(NodeId::new(id)),
            title: Some(title.into()),
            url: None,
            date_added: None,
            children,
        }
    }

    pub fn link(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Some(NodeId::new(id)),
            title: Some(title.into()),
            url: Some(url.into()),
            date_added: None,
            children: Vec::new(),
        }
    }

    pub fn with_date_added(mut self, date_added: i64) -> Self {
        self.date_added = Some(date_added);
        self
    }

    pub fn is_link(&self) -> bool {
        self.url.is_some()
    }

    /// Depth-first, children in order, links only.
    pub fn links(&self) -> Links<'_> {
        Links { stack: vec![self] }
    }

    /// Depth-first pre-order walk over every node.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    pub fn find(&self, id: &NodeId) -> Option<&BookmarkNode> {
        self.walk().find(|node| node.id.as_ref() == Some(id))
    }

    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut BookmarkNode> {
        if self.id.as_ref() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// First container (depth-first) whose title is exactly `title`.
    pub fn find_container(&self, title: &str) -> Option<&BookmarkNode> {
        self.walk()
            .find(|node| !node.is_link() && node.title.as_deref() == Some(title))
    }

    fn to_record(&self, fallback_time: i64) -> Option<BookmarkRecord> {
        let url = self.url.as_ref()?;
        Some(BookmarkRecord::new(
            self.title.clone().unwrap_or_default(),
            url.clone(),
            self.date_added.unwrap_or(fallback_time),
        ))
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a BookmarkNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a BookmarkNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub struct Links<'a> {
    stack: Vec<&'a BookmarkNode>,
}

impl<'a> Iterator for Links<'a> {
    type Item = &'a BookmarkNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            self.stack.extend(node.children.iter().rev());
            if node.is_link() {
                return Some(node);
            }
        }
        None
    }
}

/// Every link in the tree as a record, in depth-first order.
///
/// Missing titles become the placeholder and missing timestamps become "now".
pub fn flatten_links(tree: &BookmarkNode) -> Vec<BookmarkRecord> {
    let now = now_millis();
    tree.links().filter_map(|node| node.to_record(now)).collect()
}

/// The set of link URLs present in the tree.
pub fn collect_urls(tree: &BookmarkNode) -> HashSet<String> {
    tree.links().filter_map(|node| node.url.clone()).collect()
}
