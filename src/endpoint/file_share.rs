//! File-share endpoints
//!
//! Shares take ranged writes against a pre-created file instead of staged
//! blocks, and they accept replayed metadata: the upload epilogue pushes
//! attributes, timestamps, and the security descriptor through the
//! transport, and the download epilogue replays them onto the local
//! destination file.

use crate::chunk::{ChunkDescriptor, ChunkId, ChunkMover, ChunkOperation};
use crate::endpoint::{
    probe_remote, pull_chunk, Downloader, EpilogueOutcome, LeadingBytes, TransferEndpoint,
    Uploader, TRANSMIT_SEGMENT,
};
use crate::error::{CloudMoveError, Result};
use crate::io::{FileRangeWriter, RangeReader};
use crate::pacer::Pacer;
use crate::properties::{
    replay_properties, LocalFileApplier, PropertyApplier, PropertySource, RemoteProperties,
    SecurityDescriptor,
};
use crate::transfer::TransferContext;
use crate::transport::SharedTransport;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Uploads one file to a file share with ranged writes
pub struct FileShareUploader {
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    remote: String,
    leading: LeadingBytes,
    properties: Option<Arc<dyn PropertySource>>,
    created: Mutex<bool>,
}

impl FileShareUploader {
    /// Create the uploader for one transfer. `properties` is the resolved
    /// source capability; absent means no replay at epilogue time.
    pub fn new(
        ctx: Arc<TransferContext>,
        transport: SharedTransport,
        properties: Option<Arc<dyn PropertySource>>,
    ) -> Self {
        let remote = ctx.info().destination.clone();
        Self {
            ctx,
            transport,
            remote,
            leading: LeadingBytes::default(),
            properties,
            created: Mutex::new(false),
        }
    }

    /// The remote file must exist at its final size before any ranged
    /// write lands; the first chunk to run creates it.
    fn ensure_remote(&self) -> Result<()> {
        let mut created = self.created.lock().unwrap();
        if !*created {
            self.transport
                .create_remote(&self.remote, self.ctx.info().size)?;
            *created = true;
        }
        Ok(())
    }
}

impl TransferEndpoint for FileShareUploader {
    fn chunk_size(&self) -> u64 {
        self.ctx.info().chunk_size
    }

    fn num_chunks(&self) -> u32 {
        self.ctx.num_chunks()
    }

    fn remote_exists(&self) -> Result<bool> {
        probe_remote(self.transport.as_ref(), &self.remote)
    }

    fn epilogue(&self) -> Result<EpilogueOutcome> {
        if !self.ctx.begin_epilogue() {
            return Err(CloudMoveError::contract("epilogue invoked more than once"));
        }

        if self.ctx.all_chunks_succeeded() {
            let mut replay = None;
            if let Some(source) = &self.properties {
                let mut applier =
                    RemotePropertyApplier::new(self.transport.clone(), self.remote.clone());
                let report = replay_properties(source.as_ref(), &mut applier);
                for (kind, message) in &report.warnings {
                    tracing::warn!(remote = %self.remote, %kind, message = %message,
                        "property replay degraded");
                }
                replay = Some(report);
            }

            tracing::debug!(remote = %self.remote, "file share upload finalized");
            Ok(EpilogueOutcome {
                committed: true,
                content_type: self.leading.content_type(),
                properties: replay,
            })
        } else {
            if let Err(e) = self.transport.delete_remote(&self.remote) {
                tracing::warn!(remote = %self.remote, error = %e,
                    "failed to remove partially written file");
            }
            Ok(EpilogueOutcome::default())
        }
    }
}

impl Uploader for FileShareUploader {
    fn set_leading_bytes(&self, bytes: Vec<u8>) -> Result<()> {
        self.leading.set(&self.ctx, bytes)
    }

    fn generate_chunk(
        self: Arc<Self>,
        id: ChunkId,
        block_index: u32,
        reader: Box<dyn RangeReader>,
        is_whole_file: bool,
    ) -> ChunkOperation {
        ChunkOperation::new(
            ChunkDescriptor {
                id,
                block_index,
                is_whole_file,
            },
            Some(reader),
            self,
        )
    }
}

impl ChunkMover for FileShareUploader {
    fn move_chunk(
        &self,
        chunk: &ChunkDescriptor,
        reader: Option<&dyn RangeReader>,
        ctx: &TransferContext,
        pacer: &Pacer,
    ) -> Result<()> {
        let reader = reader.ok_or_else(|| {
            CloudMoveError::contract("upload chunk generated without a range reader")
        })?;

        self.ensure_remote()?;

        let data = reader.read_range(chunk.id.offset, chunk.id.length as usize)?;
        if data.is_empty() {
            return Ok(());
        }

        let mut written = 0u64;
        for segment in data.chunks(TRANSMIT_SEGMENT) {
            if ctx.is_cancelled() {
                return Err(CloudMoveError::Cancelled);
            }
            pacer.acquire_blocking(segment.len());
            self.transport
                .write_range(&self.remote, chunk.id.offset + written, segment)?;
            written += segment.len() as u64;
        }

        Ok(())
    }
}

/// Pushes replayed metadata through the transport, one kind per batch so
/// the destination observes the replay order
pub struct RemotePropertyApplier {
    transport: SharedTransport,
    remote: String,
}

impl RemotePropertyApplier {
    /// Create an applier for the remote file
    pub fn new(transport: SharedTransport, remote: String) -> Self {
        Self { transport, remote }
    }
}

impl PropertyApplier for RemotePropertyApplier {
    fn apply_attributes(&mut self, attributes: crate::properties::FileAttributes) -> Result<()> {
        self.transport.set_remote_properties(
            &self.remote,
            &RemoteProperties {
                attributes: Some(attributes),
                ..Default::default()
            },
        )
    }

    fn apply_times(
        &mut self,
        creation: Option<SystemTime>,
        last_write: Option<SystemTime>,
    ) -> Result<()> {
        self.transport.set_remote_properties(
            &self.remote,
            &RemoteProperties {
                creation_time: creation,
                last_write_time: last_write,
                ..Default::default()
            },
        )
    }

    fn apply_security(&mut self, descriptor: &SecurityDescriptor) -> Result<()> {
        self.transport.set_remote_properties(
            &self.remote,
            &RemoteProperties {
                security_descriptor: Some(descriptor.to_string()),
                ..Default::default()
            },
        )
    }
}

/// Downloads one file from a share, replaying metadata onto the local copy
pub struct FileShareDownloader {
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    remote: String,
    writer: FileRangeWriter,
    properties: Option<Arc<dyn PropertySource>>,
}

impl FileShareDownloader {
    /// Create the downloader for one transfer
    pub fn new(
        ctx: Arc<TransferContext>,
        transport: SharedTransport,
        properties: Option<Arc<dyn PropertySource>>,
    ) -> Self {
        let remote = ctx.info().source.clone();
        let writer = FileRangeWriter::new(ctx.info().destination.clone(), ctx.info().size);
        Self {
            ctx,
            transport,
            remote,
            writer,
            properties,
        }
    }
}

impl TransferEndpoint for FileShareDownloader {
    fn chunk_size(&self) -> u64 {
        self.ctx.info().chunk_size
    }

    fn num_chunks(&self) -> u32 {
        self.ctx.num_chunks()
    }

    fn remote_exists(&self) -> Result<bool> {
        probe_remote(self.transport.as_ref(), &self.remote)
    }

    fn epilogue(&self) -> Result<EpilogueOutcome> {
        if !self.ctx.begin_epilogue() {
            return Err(CloudMoveError::contract("epilogue invoked more than once"));
        }

        if self.ctx.all_chunks_succeeded() {
            let mut replay = None;
            if let Some(source) = &self.properties {
                let mut applier = LocalFileApplier::new(self.writer.path());
                let report = replay_properties(source.as_ref(), &mut applier);
                for (kind, message) in &report.warnings {
                    tracing::warn!(path = %self.writer.path().display(), %kind, message = %message,
                        "property replay degraded");
                }
                replay = Some(report);
            }

            Ok(EpilogueOutcome {
                committed: true,
                content_type: None,
                properties: replay,
            })
        } else {
            if let Err(e) = self.writer.discard() {
                tracing::warn!(path = %self.writer.path().display(), error = %e,
                    "failed to remove partial download");
            }
            Ok(EpilogueOutcome::default())
        }
    }
}

impl Downloader for FileShareDownloader {
    fn generate_chunk(self: Arc<Self>, id: ChunkId, block_index: u32) -> ChunkOperation {
        let is_whole_file = self.num_chunks() == 1;
        ChunkOperation::new(
            ChunkDescriptor {
                id,
                block_index,
                is_whole_file,
            },
            None,
            self,
        )
    }
}

impl ChunkMover for FileShareDownloader {
    fn move_chunk(
        &self,
        chunk: &ChunkDescriptor,
        _reader: Option<&dyn RangeReader>,
        ctx: &TransferContext,
        pacer: &Pacer,
    ) -> Result<()> {
        pull_chunk(
            self.transport.as_ref(),
            &self.remote,
            &self.writer,
            chunk,
            ctx,
            pacer,
        )
    }
}
