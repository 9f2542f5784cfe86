//! In-memory objects the teardown core operates on.
//!
//! A [`NodeDescriptor`] carries everything the filesystem remembers about one
//! open path; a [`HandleObject`] is a single client's reference into it.

pub mod descriptor;
pub mod handle;

pub use descriptor::{NodeDescriptor, NodeFlags, NodeId, RangeLock, ShareMode};
pub use handle::{HandleId, HandleObject, ProcessId};
