//! Remote transport collaborator
//!
//! The engine never talks to a remote service directly; it goes through
//! this trait. Authentication, request pipelines, and transport-level
//! retry all live behind it. Two implementations ship with the crate: an
//! in-memory one for tests and a directory-backed one that lets the demo
//! binary and integration tests run against a real filesystem.

mod local;
mod memory;

pub use local::LocalDirTransport;
pub use memory::InMemoryTransport;

use crate::error::Result;
use crate::properties::RemoteProperties;
use std::sync::Arc;

/// Opaque request pipeline to one remote service.
///
/// `remote` names the object/file within the service (the engine treats it
/// as an opaque key). Block-oriented methods serve object stores;
/// range-oriented methods serve file shares; both serve downloads.
pub trait RemoteTransport: Send + Sync {
    /// Whether the remote item exists. An `Err` means the probe itself
    /// could not complete, which is distinct from `Ok(false)`.
    fn exists(&self, remote: &str) -> Result<bool>;

    /// Size of the remote item in bytes
    fn remote_size(&self, remote: &str) -> Result<u64>;

    /// Create the remote item with the given final size before ranged writes
    fn create_remote(&self, remote: &str, size: u64) -> Result<()>;

    /// Write `data` into the remote item at `offset`
    fn write_range(&self, remote: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Read `length` bytes of the remote item starting at `offset`.
    /// May return fewer bytes at the end of the item.
    fn read_range(&self, remote: &str, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Stage one block of an object under construction
    fn put_block(&self, remote: &str, block_index: u32, data: &[u8]) -> Result<()>;

    /// Commit previously staged blocks, in the given index order, into the
    /// final object, setting its content type
    fn commit_blocks(&self, remote: &str, order: &[u32], content_type: Option<&str>) -> Result<()>;

    /// Write the whole object in one shot (small objects skip staging)
    fn put_object(&self, remote: &str, data: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Abandon any staged, uncommitted blocks. Idempotent.
    fn abort_staged(&self, remote: &str) -> Result<()>;

    /// Delete the remote item. Missing items are not an error.
    fn delete_remote(&self, remote: &str) -> Result<()>;

    /// Apply one batch of replayed metadata to the remote item
    fn set_remote_properties(&self, remote: &str, properties: &RemoteProperties) -> Result<()>;
}

/// Shared handle to a transport
pub type SharedTransport = Arc<dyn RemoteTransport>;
