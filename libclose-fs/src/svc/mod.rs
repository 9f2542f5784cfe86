//! Collaborator services the teardown core calls into.
//!
//! The cleanup engine does not own directory-entry persistence, byte-range
//! locking, the page cache, or share-access bookkeeping; it only issues
//! well-defined calls into them. Each concern is a trait here, paired with an
//! in-memory implementation so a volume is usable standalone. All calls are
//! infallible at this layer: an implementation that can fail must handle or
//! log the failure itself rather than surface it into teardown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::node::descriptor::{NodeDescriptor, NodeId, RangeLock, ShareMode};
use crate::node::handle::{HandleObject, ProcessId};

/// Association between a node (or handle) and its cached content pages.
///
/// Move-only on purpose: unbinding consumes the value, so a second unbind of
/// the same binding is unrepresentable in safe code.
#[derive(Debug)]
pub struct CacheBinding {
    node: NodeId,
    token: u64,
}

impl CacheBinding {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Directory-entry persistence.
pub trait DirentStore: Send + Sync {
    /// Write the node's directory entry back and clear the dirty flag.
    /// Assumed successful at this layer.
    fn flush_dirty_metadata(&self, node: &NodeDescriptor);
}

/// Byte-range locking subsystem. The lock table itself lives on the node;
/// only this service manipulates it.
pub trait RangeLockService: Send + Sync {
    /// Grant `process` a lock over `[start, start + len)`.
    fn lock_range(&self, node: &NodeDescriptor, process: ProcessId, start: u64, len: u64);

    /// Whether any process holds byte-range locks on the node.
    fn has_active_locks(&self, node: &NodeDescriptor) -> bool;

    /// Drop every lock `process` holds on the node.
    fn release_process_locks(&self, node: &NodeDescriptor, process: ProcessId);
}

/// Page-cache bind/unbind service.
pub trait PageCacheService: Send + Sync {
    /// Associate cached pages with the node and hand back the binding token.
    fn bind(&self, node: &NodeDescriptor) -> CacheBinding;

    /// Detach the binding, consuming it. Passing the same binding twice is a
    /// caller-side bug; move semantics rule it out for one value.
    fn unbind(&self, binding: CacheBinding);
}

/// Share-access bookkeeping over the node-owned table.
pub trait ShareAccessService: Send + Sync {
    /// Record the sharing rights a handle was granted at open time.
    fn grant_entry(&self, node: &NodeDescriptor, handle: &HandleObject, mode: ShareMode);

    /// Withdraw the handle's entry.
    fn remove_entry(&self, node: &NodeDescriptor, handle: &HandleObject);
}

/// The collaborator set a volume is wired with.
#[derive(Clone)]
pub struct Services {
    pub dirents: Arc<dyn DirentStore>,
    pub range_locks: Arc<dyn RangeLockService>,
    pub page_cache: Arc<dyn PageCacheService>,
    pub share_access: Arc<dyn ShareAccessService>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            dirents: Arc::new(InMemoryDirentStore::default()),
            range_locks: Arc::new(NodeRangeLocks),
            page_cache: Arc::new(InMemoryPageCache::default()),
            share_access: Arc::new(NodeShareAccess),
        }
    }
}

/// Dirent store that journals flushed paths in memory.
#[derive(Default)]
pub struct InMemoryDirentStore {
    flushed: Mutex<Vec<String>>,
}

impl InMemoryDirentStore {
    pub fn flush_count(&self) -> usize {
        self.flushed.lock().unwrap().len()
    }

    pub fn flushed_paths(&self) -> Vec<String> {
        self.flushed.lock().unwrap().clone()
    }
}

impl DirentStore for InMemoryDirentStore {
    fn flush_dirty_metadata(&self, node: &NodeDescriptor) {
        trace!("flushing dirent for '{}'", node.path());
        self.flushed.lock().unwrap().push(node.path().to_string());
        node.clear_dirty();
    }
}

/// Range-lock service backed by the table each node carries.
pub struct NodeRangeLocks;

impl RangeLockService for NodeRangeLocks {
    fn lock_range(&self, node: &NodeDescriptor, process: ProcessId, start: u64, len: u64) {
        node.range_locks.lock().unwrap().push(RangeLock {
            process,
            start,
            len,
        });
    }

    fn has_active_locks(&self, node: &NodeDescriptor) -> bool {
        !node.range_locks.lock().unwrap().is_empty()
    }

    fn release_process_locks(&self, node: &NodeDescriptor, process: ProcessId) {
        node.range_locks
            .lock()
            .unwrap()
            .retain(|l| l.process != process);
    }
}

/// Page cache that tracks live binding tokens.
#[derive(Default)]
pub struct InMemoryPageCache {
    next_token: AtomicU64,
    bound: Mutex<HashSet<u64>>,
    unbinds: AtomicUsize,
}

impl InMemoryPageCache {
    /// Bindings currently attached.
    pub fn bound_count(&self) -> usize {
        self.bound.lock().unwrap().len()
    }

    /// Total unbind calls observed.
    pub fn unbind_count(&self) -> usize {
        self.unbinds.load(Ordering::Acquire)
    }
}

impl PageCacheService for InMemoryPageCache {
    fn bind(&self, node: &NodeDescriptor) -> CacheBinding {
        let token = self.next_token.fetch_add(1, Ordering::AcqRel);
        self.bound.lock().unwrap().insert(token);
        CacheBinding {
            node: node.id(),
            token,
        }
    }

    fn unbind(&self, binding: CacheBinding) {
        debug!(
            "unbinding cache token {} of node {:?}",
            binding.token(),
            binding.node()
        );
        let removed = self.bound.lock().unwrap().remove(&binding.token());
        if !removed {
            warn!("unbind of unknown cache token {}", binding.token());
        }
        self.unbinds.fetch_add(1, Ordering::AcqRel);
    }
}

/// Share-access bookkeeping over the node-owned table.
pub struct NodeShareAccess;

impl ShareAccessService for NodeShareAccess {
    fn grant_entry(&self, node: &NodeDescriptor, handle: &HandleObject, mode: ShareMode) {
        node.share_access.lock().unwrap().insert(handle.id(), mode);
    }

    fn remove_entry(&self, node: &NodeDescriptor, handle: &HandleObject) {
        node.share_access.lock().unwrap().remove(&handle.id());
    }
}
