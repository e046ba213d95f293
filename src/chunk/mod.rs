//! Chunking module
//!
//! Splits a file into fixed-size byte ranges and models each range as a
//! deferred, single-shot chunk operation.

mod operation;
mod sizer;

pub use operation::{ChunkDescriptor, ChunkId, ChunkMover, ChunkOperation, ChunkOutcome};
pub use sizer::{chunk_ranges, num_chunks, ChunkRange};
