//! Top-level cleanup dispatch.
//!
//! Serializes teardown against the volume's directory-wide lock, routes the
//! request through the engine, and hands contended requests to the retry
//! scheduler so they re-run from scratch later.

use std::sync::Arc;

use crate::retry::RetryScheduler;

use super::{arbiter, engine, CleanupError, CleanupRequest, CleanupStatus};

pub struct CleanupDispatcher {
    retry: Arc<dyn RetryScheduler>,
}

impl CleanupDispatcher {
    pub fn new(retry: Arc<dyn RetryScheduler>) -> Self {
        Self { retry }
    }

    /// Run one cleanup request to completion or deferral.
    ///
    /// Requests against the volume's root pseudo-device complete immediately.
    /// Everything else runs under the directory-wide lock; if that lock or
    /// the node's own pair is contended in a non-blocking context, the whole
    /// request goes to the retry scheduler unchanged.
    pub async fn cleanup(&self, request: CleanupRequest) -> Result<CleanupStatus, CleanupError> {
        if Arc::ptr_eq(request.handle.node(), request.volume.device_node()) {
            trace!(
                "cleanup on root pseudo-device of '{}', nothing to do",
                request.volume.label()
            );
            return Ok(CleanupStatus::Complete);
        }

        let Some(dir_guard) =
            arbiter::acquire_exclusive(request.volume.dir_lock(), request.may_block).await
        else {
            debug!(
                "dir lock busy on '{}', deferring cleanup of '{}'",
                request.volume.label(),
                request.handle.node().path()
            );
            self.retry.defer(request)?;
            return Ok(CleanupStatus::Deferred);
        };

        let status = engine::cleanup_node(&request).await;
        drop(dir_guard);

        if status == CleanupStatus::Deferred {
            self.retry.defer(request)?;
        }
        Ok(status)
    }
}
