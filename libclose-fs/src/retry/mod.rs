//! Deferred-cleanup retry: the queue handoff and the worker draining it.
//!
//! A request that could not take its locks in a non-blocking context is
//! enqueued whole and re-executed from scratch later; no partial progress is
//! carried between attempts. The queue makes no ordering promise relative to
//! fresh requests.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::cleanup::dispatch::CleanupDispatcher;
use crate::cleanup::{CleanupError, CleanupRequest, CleanupStatus};

/// Accepts requests whose cleanup was deferred.
pub trait RetryScheduler: Send + Sync {
    fn defer(&self, request: CleanupRequest) -> Result<(), CleanupError>;
}

/// Pacing for re-polled requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay in milliseconds before a dequeued request is attempted again,
    /// so a still-held lock does not spin the queue.
    pub repoll_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { repoll_delay_ms: 5 }
    }
}

/// Sending side of the deferred-cleanup queue.
#[derive(Clone)]
pub struct RetryQueue {
    tx: UnboundedSender<CleanupRequest>,
}

impl RetryQueue {
    pub fn channel() -> (Self, UnboundedReceiver<CleanupRequest>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RetryScheduler for RetryQueue {
    fn defer(&self, request: CleanupRequest) -> Result<(), CleanupError> {
        self.tx
            .send(request)
            .map_err(|_| CleanupError::RetryQueueClosed)
    }
}

/// Worker that re-runs deferred requests from scratch.
///
/// A request that comes back deferred lands on the same queue again and is
/// seen on a later pass; completion drops it.
pub struct RetryWorker {
    dispatcher: Arc<CleanupDispatcher>,
    config: RetryConfig,
}

impl RetryWorker {
    pub fn new(dispatcher: Arc<CleanupDispatcher>, config: RetryConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Drain the queue until every sender is gone.
    pub fn spawn(self, mut rx: UnboundedReceiver<CleanupRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                sleep(Duration::from_millis(self.config.repoll_delay_ms)).await;
                match self.dispatcher.cleanup(request).await {
                    Ok(CleanupStatus::Complete) => {}
                    Ok(CleanupStatus::Deferred) => {
                        trace!("deferred cleanup still contended, re-queued");
                    }
                    Err(e) => {
                        warn!("dropping deferred cleanup: {e}");
                    }
                }
            }
        })
    }
}
