use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::svc::CacheBinding;

use super::descriptor::NodeDescriptor;

/// Identity of the process a handle was opened by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

/// Identity of one open handle within its volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

/// One client's open reference to a node descriptor.
pub struct HandleObject {
    id: HandleId,
    node: Arc<NodeDescriptor>,
    process: ProcessId,
    /// Handle-level cache binding, independent of the node-level one.
    cache_binding: Mutex<Option<CacheBinding>>,
    cleanup_complete: AtomicBool,
}

impl HandleObject {
    pub(crate) fn new(id: HandleId, node: Arc<NodeDescriptor>, process: ProcessId) -> Self {
        Self {
            id,
            node,
            process,
            cache_binding: Mutex::new(None),
            cleanup_complete: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn node(&self) -> &Arc<NodeDescriptor> {
        &self.node
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn has_cache_binding(&self) -> bool {
        self.cache_binding.lock().unwrap().is_some()
    }

    pub(crate) fn install_cache_binding(&self, binding: CacheBinding) -> Option<CacheBinding> {
        let mut slot = self.cache_binding.lock().unwrap();
        if slot.is_some() {
            return Some(binding);
        }
        *slot = Some(binding);
        None
    }

    pub(crate) fn take_cache_binding(&self) -> Option<CacheBinding> {
        self.cache_binding.lock().unwrap().take()
    }

    /// Whether teardown has finished for this handle.
    pub fn cleanup_complete(&self) -> bool {
        self.cleanup_complete.load(Ordering::Acquire)
    }

    /// Record that every applicable teardown step ran. Set at most once.
    pub(crate) fn mark_cleanup_complete(&self) {
        let was = self.cleanup_complete.swap(true, Ordering::AcqRel);
        debug_assert!(!was, "cleanup ran twice on handle {:?}", self.id);
    }
}
