//! Deferred chunk operations
//!
//! A chunk operation is generated up front (no I/O) and executed later by
//! the scheduler's worker pool. The operation is an explicit record, not a
//! closure: it captures the chunk descriptor, an optional local range
//! reader, and a reference to the endpoint that knows how to move the
//! bytes. `execute` consumes the value, so each operation can run at most
//! once by construction.

use crate::error::{CloudMoveError, Result};
use crate::io::RangeReader;
use crate::pacer::Pacer;
use crate::transfer::TransferContext;
use std::fmt;
use std::sync::Arc;

/// Identity of one byte range of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    /// Identity of the owning transfer
    pub transfer: u64,
    /// Byte offset of the range within the file
    pub offset: u64,
    /// Range length in bytes
    pub length: u64,
}

impl ChunkId {
    /// Create a chunk identity
    pub fn new(transfer: u64, offset: u64, length: u64) -> Self {
        Self {
            transfer,
            offset,
            length,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transfer {} chunk [{}, +{})",
            self.transfer, self.offset, self.length
        )
    }
}

/// Everything an endpoint needs to know about one chunk when moving it
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Chunk identity
    pub id: ChunkId,
    /// Stable position for ordered block-list assembly at commit time
    pub block_index: u32,
    /// True when this single chunk is the entire file
    pub is_whole_file: bool,
}

/// Endpoint-side data movement for one chunk.
///
/// Implemented by each concrete endpoint; invoked exactly once per chunk by
/// [`ChunkOperation::execute`]. `reader` is present for uploads and absent
/// for downloads.
pub trait ChunkMover: Send + Sync {
    /// Move the bytes of one chunk, consulting the pacer and checking
    /// cancellation before each transmitted segment
    fn move_chunk(
        &self,
        chunk: &ChunkDescriptor,
        reader: Option<&dyn RangeReader>,
        ctx: &TransferContext,
        pacer: &Pacer,
    ) -> Result<()>;
}

/// A deferred, single-shot chunk action
pub struct ChunkOperation {
    descriptor: ChunkDescriptor,
    reader: Option<Box<dyn RangeReader>>,
    mover: Arc<dyn ChunkMover>,
}

impl ChunkOperation {
    /// Build a deferred operation. Performs no I/O.
    pub fn new(
        descriptor: ChunkDescriptor,
        reader: Option<Box<dyn RangeReader>>,
        mover: Arc<dyn ChunkMover>,
    ) -> Self {
        Self {
            descriptor,
            reader,
            mover,
        }
    }

    /// The descriptor this operation will act on
    pub fn descriptor(&self) -> &ChunkDescriptor {
        &self.descriptor
    }

    /// Run the data movement for this chunk.
    ///
    /// Consumes the operation; invoking a chunk twice is unrepresentable.
    /// Cancellation observed before any I/O resolves the chunk as failed
    /// with [`CloudMoveError::Cancelled`].
    pub fn execute(self, ctx: &TransferContext, pacer: &Pacer) -> ChunkOutcome {
        ctx.note_chunk_invoked();

        let ChunkOperation {
            descriptor,
            reader,
            mover,
        } = self;

        let result = if ctx.is_cancelled() {
            Err(CloudMoveError::Cancelled)
        } else {
            mover.move_chunk(&descriptor, reader.as_deref(), ctx, pacer)
        };

        let bytes = if result.is_ok() { descriptor.id.length } else { 0 };
        ChunkOutcome {
            id: descriptor.id,
            block_index: descriptor.block_index,
            bytes,
            result,
        }
    }
}

impl fmt::Debug for ChunkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkOperation")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Resolution of one chunk operation
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Identity of the resolved chunk
    pub id: ChunkId,
    /// Block position of the resolved chunk
    pub block_index: u32,
    /// Bytes moved (zero on failure)
    pub bytes: u64,
    /// Success or the failure reason
    pub result: Result<()>,
}

impl ChunkOutcome {
    /// True if the chunk moved its bytes
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Failure message, if the chunk failed
    pub fn failure_message(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.to_string())
    }
}
