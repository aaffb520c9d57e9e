//! Find-or-create the destination container for a push.

use tracing::{debug, info};

use crate::error::{HostError, Result};
use crate::host::{BookmarkHost, HostFlavor};
use crate::tree::{BookmarkNode, NodeId};

pub const DEFAULT_FOLDER_TITLE: &str = "Imported Bookmarks";

#[derive(Debug, Clone, Default)]
pub struct FolderResolver {
    /// Explicit parent for new containers; otherwise the host flavor decides.
    default_parent: Option<NodeId>,
    /// Overrides the host's own flavor when picking a default parent.
    flavor: Option<HostFlavor>,
}

impl FolderResolver {
    pub fn new(default_parent: Option<NodeId>) -> Self {
        Self {
            default_parent,
            flavor: None,
        }
    }

    pub fn with_flavor(mut self, flavor: HostFlavor) -> Self {
        self.flavor = Some(flavor);
        self
    }

    /// Return the container titled `title`, creating exactly one if none exists.
    ///
    /// `tree` must be a fresh read of the host; an existing container with the
    /// same title anywhere in it is reused.
    pub async fn resolve(
        &self,
        host: &dyn BookmarkHost,
        tree: &BookmarkNode,
        title: &str,
    ) -> Result<NodeId> {
        if let Some(existing) = tree.find_container(title).and_then(|n| n.id.clone()) {
            debug!("Reusing container \"{}\" ({})", title, existing);
            return Ok(existing);
        }

        let parent = self.parent_for(host, tree)?;
        let created = host.create_container(&parent, title).await?;
        info!("📁 Created container \"{}\" ({}) under {}", title, created, parent);
        Ok(created)
    }

    fn parent_for(&self, host: &dyn BookmarkHost, tree: &BookmarkNode) -> Result<NodeId> {
        if let Some(parent) = &self.default_parent {
            return Ok(parent.clone());
        }
        self.flavor
            .unwrap_or_else(|| host.flavor())
            .default_parent(tree)
            .ok_or_else(|| HostError::ParentNotFound("no container to create under".into()).into())
    }
}
