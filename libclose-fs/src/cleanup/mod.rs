//! The file-close teardown core.
//!
//! `arbiter` owns the ordered two-lock acquisition protocol, `engine` runs
//! the per-node teardown steps, and `dispatch` wraps both under the volume's
//! directory-wide lock and hands contended requests to the retry scheduler.

pub mod arbiter;
pub mod dispatch;
pub mod engine;

use std::sync::Arc;

use thiserror::Error;

use crate::node::handle::HandleObject;
use crate::volume::Volume;

/// Outcome of one cleanup invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStatus {
    /// Every applicable teardown step ran.
    Complete,
    /// A required lock was unavailable in a context that may not block; the
    /// request was re-submitted unchanged and will re-run from scratch.
    Deferred,
}

/// Errors surfaced at the dispatch boundary. Deferral is not an error; the
/// only failure today is a retry queue that can no longer accept work.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("deferred-cleanup queue is closed")]
    RetryQueueClosed,
}

/// One cleanup invocation's parameters: the handle being torn down, the
/// caller's blocking policy, and the owning volume. Immutable across retries.
#[derive(Clone)]
pub struct CleanupRequest {
    pub handle: Arc<HandleObject>,
    pub may_block: bool,
    pub volume: Arc<Volume>,
}

impl CleanupRequest {
    pub fn new(handle: Arc<HandleObject>, may_block: bool, volume: Arc<Volume>) -> Self {
        Self {
            handle,
            may_block,
            volume,
        }
    }
}
