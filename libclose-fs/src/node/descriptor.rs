use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use tokio::sync::Mutex as AsyncMutex;

use crate::svc::CacheBinding;

use super::handle::{HandleId, ProcessId};

/// Exclusive lock as used throughout the teardown protocol. Shared ownership
/// lets guards outlive the borrow that acquired them.
pub type ExclusiveLock = Arc<AsyncMutex<()>>;

/// Stable identity of a node within its volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

bitflags! {
    /// Attribute bits carried by a node descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        /// The node is a directory.
        const DIRECTORY = 1;
        /// The node is the volume pseudo-node; cleanup takes the trivial path.
        const VOLUME = 2;
        /// Metadata changed since the directory entry was last written back.
        const DIRTY = 4;
        /// The node is to be removed once its last handle closes.
        const DELETE_PENDING = 8;
    }
}

bitflags! {
    /// Sharing rights a handle was granted at open time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareMode: u32 {
        const READ = 1;
        const WRITE = 2;
        const DELETE = 4;
    }
}

/// One byte-range lock entry, owned by the node's table and managed by the
/// range-lock service.
#[derive(Debug, Clone, Copy)]
pub struct RangeLock {
    pub process: ProcessId,
    pub start: u64,
    pub len: u64,
}

/// In-memory state for one open file or directory.
///
/// The content lock is always acquired before the paging lock, and the pair
/// is released in reverse order; `cleanup::arbiter` is the only place that
/// takes them for teardown.
pub struct NodeDescriptor {
    id: NodeId,
    path: String,
    flags: Mutex<NodeFlags>,
    open_handles: AtomicU32,
    /// Node-level cache binding, exclusively owned by this node until
    /// teardown moves it out for the final unbind.
    cache_binding: Mutex<Option<CacheBinding>>,
    content_lock: ExclusiveLock,
    paging_lock: ExclusiveLock,
    pub(crate) range_locks: Mutex<Vec<RangeLock>>,
    pub(crate) share_access: Mutex<HashMap<HandleId, ShareMode>>,
}

impl NodeDescriptor {
    pub(crate) fn new(id: NodeId, path: impl Into<String>, flags: NodeFlags) -> Self {
        Self {
            id,
            path: path.into(),
            flags: Mutex::new(flags),
            open_handles: AtomicU32::new(0),
            cache_binding: Mutex::new(None),
            content_lock: Arc::new(AsyncMutex::new(())),
            paging_lock: Arc::new(AsyncMutex::new(())),
            range_locks: Mutex::new(Vec::new()),
            share_access: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> NodeFlags {
        *self.flags.lock().unwrap()
    }

    pub fn is_volume(&self) -> bool {
        self.flags().contains(NodeFlags::VOLUME)
    }

    pub fn is_directory(&self) -> bool {
        self.flags().contains(NodeFlags::DIRECTORY)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags().contains(NodeFlags::DIRTY)
    }

    pub fn is_delete_pending(&self) -> bool {
        self.flags().contains(NodeFlags::DELETE_PENDING)
    }

    /// Arm the dirty flag; the write path calls this after touching metadata.
    pub fn mark_dirty(&self) {
        self.flags.lock().unwrap().insert(NodeFlags::DIRTY);
    }

    /// Drop the dirty flag. Intended for directory-entry flush
    /// implementations once the entry is durably written.
    pub fn clear_dirty(&self) {
        self.flags.lock().unwrap().remove(NodeFlags::DIRTY);
    }

    /// Mark the node for removal once the last handle closes.
    pub fn set_delete_pending(&self) {
        self.flags.lock().unwrap().insert(NodeFlags::DELETE_PENDING);
    }

    pub fn open_handles(&self) -> u32 {
        self.open_handles.load(Ordering::Acquire)
    }

    pub(crate) fn increment_open_handles(&self) -> u32 {
        self.open_handles.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop the open-handle count by one and return the new value. Exactly
    /// one decrement happens per handle per cleanup invocation.
    pub(crate) fn decrement_open_handles(&self) -> u32 {
        let prev = self.open_handles.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "open-handle underflow on '{}'", self.path);
        prev - 1
    }

    pub fn content_lock(&self) -> &ExclusiveLock {
        &self.content_lock
    }

    pub fn paging_lock(&self) -> &ExclusiveLock {
        &self.paging_lock
    }

    pub fn has_cache_binding(&self) -> bool {
        self.cache_binding.lock().unwrap().is_some()
    }

    /// Install the node-level cache binding. If another binding is already in
    /// place the new one is handed back so the caller can retire it.
    pub(crate) fn install_cache_binding(&self, binding: CacheBinding) -> Option<CacheBinding> {
        let mut slot = self.cache_binding.lock().unwrap();
        if slot.is_some() {
            return Some(binding);
        }
        *slot = Some(binding);
        None
    }

    /// Move the node-level cache binding out, clearing the node's reference.
    /// After this the node never sees the binding again.
    pub(crate) fn take_cache_binding(&self) -> Option<CacheBinding> {
        self.cache_binding.lock().unwrap().take()
    }

    /// Number of share-access entries currently recorded on this node.
    pub fn share_entry_count(&self) -> usize {
        self.share_access.lock().unwrap().len()
    }

    pub fn has_share_entry(&self, handle: HandleId) -> bool {
        self.share_access.lock().unwrap().contains_key(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_mutators_roundtrip() {
        let node = NodeDescriptor::new(NodeId(1), "/a", NodeFlags::empty());
        assert!(!node.is_dirty());
        node.mark_dirty();
        assert!(node.is_dirty());
        node.clear_dirty();
        assert!(!node.is_dirty());
        node.set_delete_pending();
        assert!(node.is_delete_pending());
    }

    #[test]
    fn handle_count_accounting() {
        let node = NodeDescriptor::new(NodeId(2), "/b", NodeFlags::empty());
        assert_eq!(node.increment_open_handles(), 1);
        assert_eq!(node.increment_open_handles(), 2);
        assert_eq!(node.decrement_open_handles(), 1);
        assert_eq!(node.decrement_open_handles(), 0);
        assert_eq!(node.open_handles(), 0);
    }
}
