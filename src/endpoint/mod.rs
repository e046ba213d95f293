//! Transfer endpoints
//!
//! An endpoint is the per-transfer, per-direction object that knows how to
//! move one file against one kind of remote service. Uploaders and
//! downloaders share the probe/sizing/epilogue capability set and differ
//! only in how chunks are generated; one concrete type exists per
//! (direction, service kind) pair, selected by the factories at the bottom
//! of this module.

mod file_share;
mod object_store;

pub use file_share::{FileShareDownloader, FileShareUploader, RemotePropertyApplier};
pub use object_store::{ObjectStoreDownloader, ObjectStoreUploader};

use crate::chunk::{ChunkDescriptor, ChunkId, ChunkOperation};
use crate::config::RemoteKind;
use crate::error::{CloudMoveError, Result};
use crate::io::{sniff_content_type, FileRangeWriter, RangeReader};
use crate::pacer::Pacer;
use crate::properties::{PropertyReplayReport, PropertySource};
use crate::transfer::TransferContext;
use crate::transport::{RemoteTransport, SharedTransport};
use std::sync::{Arc, Mutex};

/// Bytes admitted through the pacer per transmitted segment
pub(crate) const TRANSMIT_SEGMENT: usize = 256 * 1024;

/// Capability set shared by every endpoint
pub trait TransferEndpoint: Send + Sync {
    /// The fixed chunk size this endpoint was configured with
    fn chunk_size(&self) -> u64;

    /// Number of chunk operations this transfer needs (at least one)
    fn num_chunks(&self) -> u32;

    /// Probe whether the remote item exists, so the scheduler can apply
    /// overwrite policy before any chunk runs. For downloads the probe
    /// targets the remote source. An `Err` means the probe itself could
    /// not complete.
    fn remote_exists(&self) -> Result<bool>;

    /// Finalize the transfer after every chunk operation has resolved.
    ///
    /// Commit path when all chunks succeeded (block-list commit, content
    /// headers, property replay); cleanup path otherwise. The cleanup path
    /// is an expected outcome for failed transfers and never errors merely
    /// because the transfer failed. Must be invoked exactly once.
    fn epilogue(&self) -> Result<EpilogueOutcome>;
}

/// Upload-direction endpoint
pub trait Uploader: TransferEndpoint {
    /// Remember the first bytes of the file for content-type sniffing.
    /// Must be called at most once, before the first chunk operation is
    /// invoked; anything else is a contract violation.
    fn set_leading_bytes(&self, bytes: Vec<u8>) -> Result<()>;

    /// Produce the deferred operation for one byte range. Generation
    /// performs no I/O; only executing the returned operation does.
    /// `is_whole_file` lets the endpoint use a single-shot write when the
    /// file fits in one chunk.
    fn generate_chunk(
        self: Arc<Self>,
        id: ChunkId,
        block_index: u32,
        reader: Box<dyn RangeReader>,
        is_whole_file: bool,
    ) -> ChunkOperation;
}

/// Download-direction endpoint
pub trait Downloader: TransferEndpoint {
    /// Produce the deferred operation that pulls one byte range from the
    /// remote source into the local destination. Generation performs no
    /// I/O.
    fn generate_chunk(self: Arc<Self>, id: ChunkId, block_index: u32) -> ChunkOperation;
}

/// What the epilogue did
#[derive(Debug, Clone, Default)]
pub struct EpilogueOutcome {
    /// True if the commit path ran (all chunks succeeded)
    pub committed: bool,
    /// Content type sniffed from the leading bytes, when one was set
    pub content_type: Option<String>,
    /// Result of property replay, when the endpoint performed one
    pub properties: Option<PropertyReplayReport>,
}

/// Leading-byte buffer shared by the uploaders.
///
/// Set at most once, and only before the first chunk operation of the
/// transfer is invoked.
#[derive(Default)]
pub(crate) struct LeadingBytes {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl LeadingBytes {
    pub(crate) fn set(&self, ctx: &TransferContext, bytes: Vec<u8>) -> Result<()> {
        if ctx.chunk_invoked() {
            return Err(CloudMoveError::contract(
                "leading bytes set after the first chunk operation was invoked",
            ));
        }

        let mut slot = self.bytes.lock().unwrap();
        if slot.is_some() {
            return Err(CloudMoveError::contract("leading bytes set more than once"));
        }
        *slot = Some(bytes);
        Ok(())
    }

    pub(crate) fn content_type(&self) -> Option<String> {
        self.bytes
            .lock()
            .unwrap()
            .as_deref()
            .map(|b| sniff_content_type(b).to_string())
    }
}

/// Admit `len` bytes through the pacer in bounded segments, re-checking
/// cancellation before every acquisition.
pub(crate) fn pace_transmit(pacer: &Pacer, ctx: &TransferContext, len: u64) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(CloudMoveError::Cancelled);
    }

    let mut remaining = len;
    while remaining > 0 {
        if ctx.is_cancelled() {
            return Err(CloudMoveError::Cancelled);
        }
        let step = remaining.min(TRANSMIT_SEGMENT as u64);
        pacer.acquire_blocking(step as usize);
        remaining -= step;
    }
    Ok(())
}

/// Run an existence probe, normalizing transport failures into probe errors
pub(crate) fn probe_remote(transport: &dyn RemoteTransport, location: &str) -> Result<bool> {
    transport.exists(location).map_err(|e| match e {
        CloudMoveError::ProbeFailed { .. } => e,
        other => CloudMoveError::probe(location, other.to_string()),
    })
}

/// Pull one chunk of a remote item into the local destination writer,
/// paced and cancellation-aware per segment.
pub(crate) fn pull_chunk(
    transport: &dyn RemoteTransport,
    remote: &str,
    writer: &FileRangeWriter,
    chunk: &ChunkDescriptor,
    ctx: &TransferContext,
    pacer: &Pacer,
) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(CloudMoveError::Cancelled);
    }

    // The single chunk of an empty file still materializes the destination.
    if chunk.id.length == 0 {
        return writer.write_at(0, &[]);
    }

    let mut done = 0u64;
    while done < chunk.id.length {
        if ctx.is_cancelled() {
            return Err(CloudMoveError::Cancelled);
        }

        let step = (chunk.id.length - done).min(TRANSMIT_SEGMENT as u64) as usize;
        pacer.acquire_blocking(step);

        let data = transport.read_range(remote, chunk.id.offset + done, step)?;
        if data.is_empty() {
            return Err(CloudMoveError::chunk_io(
                chunk.id.offset,
                chunk.id.length,
                "unexpected end of remote data",
            ));
        }

        writer.write_at(chunk.id.offset + done, &data)?;
        done += data.len() as u64;
    }

    Ok(())
}

/// Build the uploader for the given remote service kind.
///
/// `properties` is the already-resolved source property capability; it is
/// consumed only by destinations that can accept metadata.
pub fn create_uploader(
    kind: RemoteKind,
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    properties: Option<Arc<dyn PropertySource>>,
) -> Arc<dyn Uploader> {
    match kind {
        RemoteKind::ObjectStore => Arc::new(ObjectStoreUploader::new(ctx, transport)),
        RemoteKind::FileShare => Arc::new(FileShareUploader::new(ctx, transport, properties)),
    }
}

/// Build the downloader for the given remote service kind
pub fn create_downloader(
    kind: RemoteKind,
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    properties: Option<Arc<dyn PropertySource>>,
) -> Arc<dyn Downloader> {
    match kind {
        RemoteKind::ObjectStore => Arc::new(ObjectStoreDownloader::new(ctx, transport)),
        RemoteKind::FileShare => Arc::new(FileShareDownloader::new(ctx, transport, properties)),
    }
}
