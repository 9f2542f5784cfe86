//! Per-node teardown: the volume classifier and the cleanup engine.
//!
//! Once the lock pair is held the engine runs every remaining step without
//! suspending; the only non-success outcome is a deferral from the lock
//! acquisition itself, which leaves no observable state behind.

use super::arbiter;
use super::{CleanupRequest, CleanupStatus};

/// Tear down one handle's claim on its node.
///
/// Volume pseudo-nodes take the trivial path; everything else goes through
/// the full engine.
pub(crate) async fn cleanup_node(req: &CleanupRequest) -> CleanupStatus {
    let node = req.handle.node();
    debug!(
        "cleanup '{}' (handle {:?}, may_block={})",
        node.path(),
        req.handle.id(),
        req.may_block
    );

    if node.is_volume() {
        return cleanup_volume_node(req);
    }

    let svcs = req.volume.services();

    // Content then paging, all-or-nothing. An unavailable pair defers the
    // whole request with zero side effects.
    let Some(guards) = arbiter::acquire_node_locks(node, req.may_block).await else {
        debug!("locks busy on '{}', deferring", node.path());
        return CleanupStatus::Deferred;
    };

    let remaining = node.decrement_open_handles();

    if !node.is_directory() && svcs.range_locks.has_active_locks(node) {
        svcs.range_locks
            .release_process_locks(node, req.handle.process());
    }

    // Runs regardless of the handle count.
    if node.is_dirty() {
        svcs.dirents.flush_dirty_metadata(node);
    }

    if node.is_delete_pending() && remaining == 0 {
        // Take ownership of the node-level binding before anything else; the
        // node must never reference it again once the unbind is issued.
        if let Some(binding) = node.take_cache_binding() {
            debug!("delete pending, detaching cache of '{}'", node.path());
            svcs.page_cache.unbind(binding);
        }
    }

    if let Some(binding) = req.handle.take_cache_binding() {
        svcs.page_cache.unbind(binding);
    }

    if remaining != 0 {
        svcs.share_access.remove_entry(node, &req.handle);
    }

    req.handle.mark_cleanup_complete();

    // Paging before content, unconditionally on every path past acquisition.
    guards.release();

    trace!("cleanup '{}' complete, {} handles left", node.path(), remaining);
    CleanupStatus::Complete
}

/// Trivial path for the volume pseudo-node: account for the handle and
/// withdraw its share entry. No locks, no dirty/delete logic.
fn cleanup_volume_node(req: &CleanupRequest) -> CleanupStatus {
    let node = req.handle.node();
    let remaining = node.decrement_open_handles();
    if remaining != 0 {
        req.volume
            .services()
            .share_access
            .remove_entry(node, &req.handle);
    }
    trace!("volume node cleanup, {} handles left", remaining);
    CleanupStatus::Complete
}
