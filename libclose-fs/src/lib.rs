//! File-handle cleanup and teardown for FUSE-style filesystems.
//!
//! When a client closes its last reference to an open file or directory, the
//! in-memory state behind that handle has to be retired: the open count drops,
//! byte-range locks owned by the closing process go away, dirty metadata is
//! written back, delete-on-close nodes shed their page-cache binding, and the
//! handle's share-access entry is withdrawn. All of it runs under a fixed
//! two-lock protocol and may execute in contexts that are not allowed to
//! block, in which case the whole request is deferred and retried later from
//! scratch.
//!
//! Modules:
//! - `node`: node descriptors and handle objects (the data model)
//! - `cleanup`: the teardown core (lock arbiter, engine, top-level dispatch)
//! - `svc`: collaborator service contracts plus in-memory implementations
//! - `retry`: deferred-cleanup queue and the worker draining it
//! - `volume`: per-volume state and the open-path bookkeeping feeding teardown

#[macro_use]
extern crate log;

pub mod cleanup;
pub mod node;
pub mod retry;
pub mod svc;
pub mod volume;

pub use cleanup::dispatch::CleanupDispatcher;
pub use cleanup::{CleanupError, CleanupRequest, CleanupStatus};
pub use volume::Volume;
