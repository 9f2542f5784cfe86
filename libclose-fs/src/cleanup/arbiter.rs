//! Ordered two-lock acquisition with try-and-defer semantics.
//!
//! Teardown always takes a node's content lock before its paging lock and
//! gives them back in reverse order. Callers that may not block get a
//! non-blocking try instead: all-or-nothing across the pair, so an aborted
//! attempt leaves no lock held.

use tokio::sync::OwnedMutexGuard;

use crate::node::descriptor::{ExclusiveLock, NodeDescriptor};

/// Exclusive hold over a node's content and paging locks.
///
/// Field order is load-bearing: `paging` is declared first so it unlocks
/// before `content` on drop, which keeps the reverse-order release invariant
/// on every exit path, early returns and panics included.
pub struct NodeGuards {
    paging: OwnedMutexGuard<()>,
    content: OwnedMutexGuard<()>,
}

impl NodeGuards {
    /// Release the pair, paging lock first.
    pub fn release(self) {
        let NodeGuards { paging, content } = self;
        drop(paging);
        drop(content);
    }
}

/// Take one exclusive lock under the caller's blocking policy. A caller that
/// may block always gets the guard; otherwise `None` means the lock was
/// contended and nothing changed.
pub(crate) async fn acquire_exclusive(
    lock: &ExclusiveLock,
    may_block: bool,
) -> Option<OwnedMutexGuard<()>> {
    if may_block {
        Some(lock.clone().lock_owned().await)
    } else {
        lock.clone().try_lock_owned().ok()
    }
}

/// Acquire the node's content lock, then its paging lock.
///
/// Non-blocking callers get all-or-nothing: failure on the content lock
/// changes no state, failure on the paging lock releases the content lock
/// before returning. Blocking callers cannot observe an unavailable outcome.
pub async fn acquire_node_locks(node: &NodeDescriptor, may_block: bool) -> Option<NodeGuards> {
    let content = acquire_exclusive(node.content_lock(), may_block).await?;
    match acquire_exclusive(node.paging_lock(), may_block).await {
        Some(paging) => Some(NodeGuards { paging, content }),
        None => {
            drop(content);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::descriptor::{NodeFlags, NodeId};

    fn node() -> NodeDescriptor {
        NodeDescriptor::new(NodeId(1), "/x", NodeFlags::empty())
    }

    #[tokio::test]
    async fn try_acquire_takes_both_locks() {
        let n = node();
        let guards = acquire_node_locks(&n, false).await.expect("uncontended");
        assert!(n.content_lock().try_lock().is_err());
        assert!(n.paging_lock().try_lock().is_err());

        guards.release();
        assert!(n.content_lock().try_lock().is_ok());
        assert!(n.paging_lock().try_lock().is_ok());
    }

    #[tokio::test]
    async fn contended_content_lock_changes_nothing() {
        let n = node();
        let held = n.content_lock().clone().try_lock_owned().unwrap();

        assert!(acquire_node_locks(&n, false).await.is_none());
        assert!(n.paging_lock().try_lock().is_ok());
        drop(held);
    }

    #[tokio::test]
    async fn contended_paging_lock_releases_content() {
        let n = node();
        let held = n.paging_lock().clone().try_lock_owned().unwrap();

        assert!(acquire_node_locks(&n, false).await.is_none());
        // The aborted attempt must have given the content lock back.
        assert!(n.content_lock().try_lock().is_ok());
        drop(held);
    }

    #[tokio::test]
    async fn blocking_acquisition_waits_out_contention() {
        let n = std::sync::Arc::new(node());
        let held = n.content_lock().clone().lock_owned().await;

        let waiter = {
            let n = n.clone();
            tokio::spawn(async move {
                let guards = acquire_node_locks(&n, true).await.expect("blocking");
                guards.release();
            })
        };

        tokio::task::yield_now().await;
        drop(held);
        waiter.await.expect("waiter finished");
    }
}
