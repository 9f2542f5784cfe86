//! Per-volume state and the open-path bookkeeping that feeds teardown.
//!
//! There is no process-wide driver state; everything a cleanup needs is
//! carried here and passed explicitly: the directory-wide coordination lock,
//! the collaborator services, the node table, and the root pseudo-device
//! node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::node::descriptor::{ExclusiveLock, NodeDescriptor, NodeFlags, NodeId, ShareMode};
use crate::node::handle::{HandleId, HandleObject, ProcessId};
use crate::svc::Services;

pub struct Volume {
    label: String,
    services: Services,
    /// Serializes every cleanup on this volume.
    dir_lock: ExclusiveLock,
    /// Cleanup requests against this node complete immediately.
    device_node: Arc<NodeDescriptor>,
    nodes: Mutex<HashMap<String, Arc<NodeDescriptor>>>,
    next_node_id: AtomicU64,
    next_handle_id: AtomicU64,
}

impl Volume {
    pub fn new(label: impl Into<String>, services: Services) -> Arc<Self> {
        let label = label.into();
        let device_node = Arc::new(NodeDescriptor::new(
            NodeId(0),
            label.clone(),
            NodeFlags::empty(),
        ));
        Arc::new(Self {
            label,
            services,
            dir_lock: Arc::new(AsyncMutex::new(())),
            device_node,
            nodes: Mutex::new(HashMap::new()),
            next_node_id: AtomicU64::new(1),
            next_handle_id: AtomicU64::new(1),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn dir_lock(&self) -> &ExclusiveLock {
        &self.dir_lock
    }

    pub fn device_node(&self) -> &Arc<NodeDescriptor> {
        &self.device_node
    }

    /// Look a descriptor up without creating it.
    pub fn node(&self, path: &str) -> Option<Arc<NodeDescriptor>> {
        self.nodes.lock().unwrap().get(path).cloned()
    }

    /// Find or create the descriptor for a path; the first open of a path
    /// creates it.
    pub fn lookup_or_create(&self, path: &str, flags: NodeFlags) -> Arc<NodeDescriptor> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get(path) {
            return node.clone();
        }
        let id = NodeId(self.next_node_id.fetch_add(1, Ordering::AcqRel));
        let node = Arc::new(NodeDescriptor::new(id, path, flags));
        nodes.insert(path.to_string(), node.clone());
        node
    }

    /// Open a handle on a path: bumps the open-handle count and records the
    /// granted share access. Sharing-rule enforcement itself is the share
    /// service's concern.
    pub fn open(
        &self,
        path: &str,
        flags: NodeFlags,
        process: ProcessId,
        share: ShareMode,
    ) -> Arc<HandleObject> {
        let node = self.lookup_or_create(path, flags);
        node.increment_open_handles();
        let handle = Arc::new(HandleObject::new(
            self.alloc_handle_id(),
            node.clone(),
            process,
        ));
        self.services.share_access.grant_entry(&node, &handle, share);
        trace!(
            "open '{}' by process {:?}, {} handles",
            path,
            process,
            node.open_handles()
        );
        handle
    }

    /// Open a handle against the root pseudo-device. Its cleanup is a no-op
    /// by design, so no bookkeeping happens here either.
    pub fn open_device(&self, process: ProcessId) -> Arc<HandleObject> {
        Arc::new(HandleObject::new(
            self.alloc_handle_id(),
            self.device_node.clone(),
            process,
        ))
    }

    /// Install the node-level cache binding on first I/O. Loses gracefully if
    /// a concurrent caller got there first.
    pub fn bind_node_cache(&self, node: &Arc<NodeDescriptor>) {
        let binding = self.services.page_cache.bind(node);
        if let Some(extra) = node.install_cache_binding(binding) {
            self.services.page_cache.unbind(extra);
        }
    }

    /// Install a handle-level cache binding, independent of the node-level
    /// one.
    pub fn bind_handle_cache(&self, handle: &Arc<HandleObject>) {
        let binding = self.services.page_cache.bind(handle.node());
        if let Some(extra) = handle.install_cache_binding(binding) {
            self.services.page_cache.unbind(extra);
        }
    }

    fn alloc_handle_id(&self) -> HandleId {
        HandleId(self.next_handle_id.fetch_add(1, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_open_creates_descriptor() {
        let volume = Volume::new("vol0", Services::default());
        assert!(volume.node("/a.txt").is_none());

        let handle = volume.open(
            "/a.txt",
            NodeFlags::empty(),
            ProcessId(10),
            ShareMode::READ,
        );
        let node = volume.node("/a.txt").expect("created on first open");
        assert!(Arc::ptr_eq(handle.node(), &node));
        assert_eq!(node.open_handles(), 1);
        assert!(node.has_share_entry(handle.id()));

        // A second open reuses the descriptor.
        let other = volume.open(
            "/a.txt",
            NodeFlags::empty(),
            ProcessId(11),
            ShareMode::READ | ShareMode::WRITE,
        );
        assert!(Arc::ptr_eq(other.node(), &node));
        assert_eq!(node.open_handles(), 2);
        assert_eq!(node.share_entry_count(), 2);
    }

    #[test]
    fn cache_bindings_install_once() {
        let volume = Volume::new("vol0", Services::default());
        let handle = volume.open("/b.txt", NodeFlags::empty(), ProcessId(1), ShareMode::READ);
        let node = handle.node().clone();

        volume.bind_node_cache(&node);
        volume.bind_node_cache(&node);
        assert!(node.has_cache_binding());

        volume.bind_handle_cache(&handle);
        assert!(handle.has_cache_binding());
    }
}
