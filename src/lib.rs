//! # CloudMove - Chunked Data-Movement Engine
//!
//! CloudMove is the per-file transfer engine of a high-throughput cloud
//! storage tool. It moves one logical file between a local source and a
//! remote destination by splitting it into fixed-size chunks, executing
//! the chunks with bounded concurrency under a shared bandwidth pacer,
//! and finalizing the transfer with an exactly-once epilogue that replays
//! source metadata (timestamps, attributes, access-control state) onto
//! the destination.
//!
//! ## Features
//!
//! - **Chunked execution**: files become independently schedulable byte
//!   ranges; a zero-length file is still one (empty) chunk
//! - **Uploader/downloader endpoints**: one implementation per
//!   (direction, remote-service-kind) pair, selected by factory
//! - **Exactly-once completion**: an atomic barrier fires the epilogue
//!   from whichever worker resolves the last chunk, in any order
//! - **Shared bandwidth pacer**: token-bucket ceiling across every
//!   concurrent transfer
//! - **Property replay**: attributes, then timestamps, then the security
//!   descriptor, applied only after all chunks succeed
//!
//! ## Quick Start
//!
//! ```no_run
//! use cloudmove::config::{EngineConfig, OverwritePolicy, RemoteKind};
//! use cloudmove::transfer::{TransferInfo, TransferRunner};
//! use cloudmove::transport::LocalDirTransport;
//! use std::sync::Arc;
//!
//! let runner = TransferRunner::new(EngineConfig::default()).unwrap();
//! let transport = Arc::new(LocalDirTransport::new("/mnt/backup").unwrap());
//!
//! let report = runner.upload(
//!     TransferInfo {
//!         id: 1,
//!         source: "/data/report.pdf".to_string(),
//!         destination: "report.pdf".to_string(),
//!         size: 4_194_304,
//!         chunk_size: 1_048_576,
//!         overwrite: OverwritePolicy::Always,
//!     },
//!     RemoteKind::ObjectStore,
//!     transport,
//!     None,
//! ).unwrap();
//!
//! report.print_summary();
//! ```
//!
//! ## Throttled Transfers
//!
//! ```no_run
//! use cloudmove::config::EngineConfig;
//! use cloudmove::transfer::TransferRunner;
//!
//! let config = EngineConfig {
//!     bandwidth: Some("50M".to_string()),
//!     workers: 8,
//!     ..Default::default()
//! };
//! let runner = TransferRunner::new(config).unwrap();
//! // Every transfer driven by this runner shares one token bucket.
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod io;
pub mod pacer;
pub mod properties;
pub mod transfer;
pub mod transport;

// Re-export commonly used types
pub use config::{EngineConfig, OverwritePolicy, RemoteKind};
pub use error::{CloudMoveError, Result};
pub use pacer::Pacer;
pub use transfer::{TransferInfo, TransferReport, TransferRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use cloudmove::prelude::*;
    //! ```

    pub use crate::chunk::{chunk_ranges, num_chunks, ChunkId, ChunkOperation};
    pub use crate::config::{EngineConfig, OverwritePolicy, RemoteKind};
    pub use crate::endpoint::{create_downloader, create_uploader, Downloader, Uploader};
    pub use crate::error::{CloudMoveError, Result};
    pub use crate::pacer::Pacer;
    pub use crate::properties::{LocalFileSource, PropertyKind, PropertySource};
    pub use crate::transfer::{TransferInfo, TransferReport, TransferRunner};
    pub use crate::transport::{InMemoryTransport, LocalDirTransport, RemoteTransport};
}
