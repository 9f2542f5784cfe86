use std::sync::Arc;
use std::time::Duration;

use libclose_fs::cleanup::{CleanupError, CleanupRequest, CleanupStatus};
use libclose_fs::node::{NodeFlags, ProcessId, ShareMode};
use libclose_fs::retry::{RetryConfig, RetryQueue, RetryWorker};
use libclose_fs::svc::{
    InMemoryDirentStore, InMemoryPageCache, NodeRangeLocks, NodeShareAccess, Services,
};
use libclose_fs::{CleanupDispatcher, Volume};
use tokio::time::{sleep, timeout};

fn services(cache: &Arc<InMemoryPageCache>) -> Services {
    Services {
        dirents: Arc::new(InMemoryDirentStore::default()),
        range_locks: Arc::new(NodeRangeLocks),
        page_cache: cache.clone(),
        share_access: Arc::new(NodeShareAccess),
    }
}

#[tokio::test]
async fn worker_drives_deferred_request_to_completion() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = Arc::new(InMemoryPageCache::default());
    let volume = Volume::new("vol0", services(&cache));
    let (queue, rx) = RetryQueue::channel();
    let dispatcher = Arc::new(CleanupDispatcher::new(Arc::new(queue)));
    let _worker = RetryWorker::new(dispatcher.clone(), RetryConfig::default()).spawn(rx);

    let handle = volume.open(
        "/spool/job.dat",
        NodeFlags::empty(),
        ProcessId(42),
        ShareMode::READ | ShareMode::DELETE,
    );
    let node = handle.node().clone();
    node.set_delete_pending();
    volume.bind_node_cache(&node);

    let held = node.content_lock().clone().try_lock_owned().unwrap();
    let status = dispatcher
        .cleanup(CleanupRequest::new(handle.clone(), false, volume.clone()))
        .await
        .unwrap();
    assert_eq!(status, CleanupStatus::Deferred);

    // The worker keeps re-polling against the held lock without mutating
    // anything.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(node.open_handles(), 1);
    assert!(!handle.cleanup_complete());

    drop(held);
    timeout(Duration::from_secs(2), async {
        while !handle.cleanup_complete() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("deferred cleanup finished once the lock freed up");

    assert_eq!(node.open_handles(), 0);
    assert_eq!(cache.unbind_count(), 1);
    assert!(!node.has_cache_binding());
}

#[tokio::test]
async fn closed_retry_queue_surfaces_an_error() {
    let cache = Arc::new(InMemoryPageCache::default());
    let volume = Volume::new("vol0", services(&cache));
    let (queue, rx) = RetryQueue::channel();
    // No worker will ever drain this queue.
    drop(rx);
    let dispatcher = CleanupDispatcher::new(Arc::new(queue));

    let handle = volume.open(
        "/spool/other.dat",
        NodeFlags::empty(),
        ProcessId(7),
        ShareMode::READ,
    );
    let node = handle.node().clone();

    let held = node.content_lock().clone().try_lock_owned().unwrap();
    let err = dispatcher
        .cleanup(CleanupRequest::new(handle, false, volume.clone()))
        .await
        .unwrap_err();
    drop(held);

    assert!(matches!(err, CleanupError::RetryQueueClosed));
    // The engine still backed out cleanly before the failed handoff.
    assert_eq!(node.open_handles(), 1);
    assert!(node.content_lock().try_lock().is_ok());
}
