//! Object-store endpoints
//!
//! Uploads stage one block per chunk and commit an ordered block list at
//! epilogue time; a file that fits in one chunk is written with a
//! single-shot put instead. Object stores accept no replayed file
//! metadata, so neither direction carries the property capability.

use crate::chunk::{ChunkDescriptor, ChunkId, ChunkMover, ChunkOperation};
use crate::endpoint::{
    pace_transmit, probe_remote, pull_chunk, Downloader, EpilogueOutcome, LeadingBytes,
    TransferEndpoint, Uploader,
};
use crate::error::{CloudMoveError, Result};
use crate::io::{FileRangeWriter, RangeReader};
use crate::pacer::Pacer;
use crate::transfer::TransferContext;
use crate::transport::SharedTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Uploads one file into an object store as a staged block list
pub struct ObjectStoreUploader {
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    remote: String,
    leading: LeadingBytes,
    staged: Mutex<Vec<u32>>,
    wrote_whole: AtomicBool,
}

impl ObjectStoreUploader {
    /// Create the uploader for one transfer
    pub fn new(ctx: Arc<TransferContext>, transport: SharedTransport) -> Self {
        let remote = ctx.info().destination.clone();
        Self {
            ctx,
            transport,
            remote,
            leading: LeadingBytes::default(),
            staged: Mutex::new(Vec::new()),
            wrote_whole: AtomicBool::new(false),
        }
    }
}

impl TransferEndpoint for ObjectStoreUploader {
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

        let content_type = self.leading.content_type();

        if self.ctx.all_chunks_succeeded() {
            if !self.wrote_whole.load(Ordering::SeqCst) {
                // Blocks may have completed in any order; the commit list
                // is keyed by block index, not completion order.
                let mut order = self.staged.lock().unwrap().clone();
                order.sort_unstable();
                self.transport
                    .commit_blocks(&self.remote, &order, content_type.as_deref())?;
            }
            tracing::debug!(remote = %self.remote, "object store upload committed");
            Ok(EpilogueOutcome {
                committed: true,
                content_type,
                properties: None,
            })
        } else {
            if let Err(e) = self.transport.abort_staged(&self.remote) {
                tracing::warn!(remote = %self.remote, error = %e, "failed to abandon staged blocks");
            }
            Ok(EpilogueOutcome::default())
        }
    }
}

impl Uploader for ObjectStoreUploader {
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

impl ChunkMover for ObjectStoreUploader {
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

        let data = reader.read_range(chunk.id.offset, chunk.id.length as usize)?;
        pace_transmit(pacer, ctx, data.len() as u64)?;

        if chunk.is_whole_file {
            // Small enough for a single-shot write; skips the staging round trip.
            let content_type = self.leading.content_type();
            self.transport
                .put_object(&self.remote, &data, content_type.as_deref())?;
            self.wrote_whole.store(true, Ordering::SeqCst);
        } else {
            self.transport
                .put_block(&self.remote, chunk.block_index, &data)?;
            self.staged.lock().unwrap().push(chunk.block_index);
        }

        Ok(())
    }
}

/// Downloads one object into a local file with positioned writes
pub struct ObjectStoreDownloader {
    ctx: Arc<TransferContext>,
    transport: SharedTransport,
    remote: String,
    writer: FileRangeWriter,
}

impl ObjectStoreDownloader {
    /// Create the downloader for one transfer
    pub fn new(ctx: Arc<TransferContext>, transport: SharedTransport) -> Self {
        let remote = ctx.info().source.clone();
        let writer = FileRangeWriter::new(ctx.info().destination.clone(), ctx.info().size);
        Self {
            ctx,
            transport,
            remote,
            writer,
        }
    }
}

impl TransferEndpoint for ObjectStoreDownloader {
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
            Ok(EpilogueOutcome {
                committed: true,
                ..Default::default()
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

impl Downloader for ObjectStoreDownloader {
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

impl ChunkMover for ObjectStoreDownloader {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverwritePolicy;
    use crate::io::FileRangeReader;
    use crate::transfer::TransferInfo;
    use crate::transport::InMemoryTransport;
    use tempfile::TempDir;

    fn upload_fixture(
        size: u64,
        chunk_size: u64,
        content: &[u8],
    ) -> (TempDir, Arc<TransferContext>, Arc<InMemoryTransport>, Arc<ObjectStoreUploader>) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, content).unwrap();

        let ctx = Arc::new(TransferContext::new(TransferInfo {
            id: 42,
            source: source.to_string_lossy().to_string(),
            destination: "bucket/object.bin".to_string(),
            size,
            chunk_size,
            overwrite: OverwritePolicy::Always,
        }));
        let transport = Arc::new(InMemoryTransport::new());
        let uploader = Arc::new(ObjectStoreUploader::new(ctx.clone(), transport.clone()));
        (dir, ctx, transport, uploader)
    }

    fn generate_ops(
        ctx: &Arc<TransferContext>,
        uploader: &Arc<ObjectStoreUploader>,
    ) -> Vec<ChunkOperation> {
        let info = ctx.info().clone();
        let ranges = crate::chunk::chunk_ranges(info.size, info.chunk_size);
        let whole = ranges.len() == 1;
        ranges
            .iter()
            .map(|r| {
                Arc::clone(uploader).generate_chunk(
                    ChunkId::new(info.id, r.offset, r.length),
                    r.index,
                    Box::new(FileRangeReader::new(&info.source)),
                    whole,
                )
            })
            .collect()
    }

    #[test]
    fn test_upload_commits_blocks_in_index_order() {
        let content = b"0123456789";
        let (_dir, ctx, transport, uploader) = upload_fixture(10, 4, content);
        let pacer = Pacer::unlimited();

        uploader.set_leading_bytes(content.to_vec()).unwrap();

        // Execute chunks in reverse to prove commit order is index-keyed.
        let mut ops = generate_ops(&ctx, &uploader);
        ops.reverse();
        for op in ops {
            let outcome = op.execute(&ctx, &pacer);
            assert!(outcome.is_success());
            if ctx.resolve_chunk(&outcome) {
                let epilogue = uploader.epilogue().unwrap();
                assert!(epilogue.committed);
                assert_eq!(epilogue.content_type.as_deref(), Some("text/plain"));
            }
        }

        assert_eq!(transport.object_bytes("bucket/object.bin").unwrap(), content);
        assert_eq!(transport.committed_order("bucket/object.bin").unwrap(), vec![0, 1, 2]);
        assert_eq!(transport.commit_calls(), 1);
    }

    #[test]
    fn test_epilogue_fires_once_for_every_completion_order() {
        let content = b"0123456789";
        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in permutations {
            let (_dir, ctx, transport, uploader) = upload_fixture(10, 4, content);
            let pacer = Pacer::unlimited();
            uploader.set_leading_bytes(content.to_vec()).unwrap();

            let mut ops: Vec<Option<ChunkOperation>> =
                generate_ops(&ctx, &uploader).into_iter().map(Some).collect();

            let mut epilogues = 0;
            for index in order {
                let op = ops[index].take().unwrap();
                let outcome = op.execute(&ctx, &pacer);
                if ctx.resolve_chunk(&outcome) {
                    uploader.epilogue().unwrap();
                    epilogues += 1;
                }
            }

            assert_eq!(epilogues, 1, "order {order:?}");
            assert_eq!(transport.commit_calls(), 1, "order {order:?}");
            assert_eq!(transport.object_bytes("bucket/object.bin").unwrap(), content);
        }
    }

    #[test]
    fn test_second_epilogue_is_a_contract_violation() {
        let (_dir, ctx, _transport, uploader) = upload_fixture(10, 4, b"0123456789");
        let pacer = Pacer::unlimited();

        for op in generate_ops(&ctx, &uploader) {
            let outcome = op.execute(&ctx, &pacer);
            ctx.resolve_chunk(&outcome);
        }

        uploader.epilogue().unwrap();
        assert!(matches!(
            uploader.epilogue(),
            Err(CloudMoveError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_failed_chunk_takes_cleanup_path() {
        let content = b"0123456789";
        let (_dir, ctx, transport, uploader) = upload_fixture(10, 4, content);
        let pacer = Pacer::unlimited();
        transport.fail_block(1);

        for op in generate_ops(&ctx, &uploader) {
            let outcome = op.execute(&ctx, &pacer);
            if ctx.resolve_chunk(&outcome) {
                let epilogue = uploader.epilogue().unwrap();
                assert!(!epilogue.committed);
            }
        }

        assert!(!ctx.all_chunks_succeeded());
        assert_eq!(transport.commit_calls(), 0);
        assert!(transport.was_aborted("bucket/object.bin"));
        assert!(transport.object_bytes("bucket/object.bin").is_none());
    }

    #[test]
    fn test_whole_file_uses_single_shot_put() {
        let content = b"tiny";
        let (_dir, ctx, transport, uploader) = upload_fixture(4, 1024, content);
        let pacer = Pacer::unlimited();
        uploader.set_leading_bytes(content.to_vec()).unwrap();

        for op in generate_ops(&ctx, &uploader) {
            let outcome = op.execute(&ctx, &pacer);
            assert!(outcome.is_success());
            if ctx.resolve_chunk(&outcome) {
                let epilogue = uploader.epilogue().unwrap();
                assert!(epilogue.committed);
            }
        }

        assert_eq!(transport.object_bytes("bucket/object.bin").unwrap(), content);
        // Single-shot path never stages or commits a block list.
        assert_eq!(transport.commit_calls(), 0);
    }

    #[test]
    fn test_zero_length_file_still_commits() {
        let (_dir, ctx, transport, uploader) = upload_fixture(0, 4, b"");
        let pacer = Pacer::unlimited();
        uploader.set_leading_bytes(Vec::new()).unwrap();

        assert_eq!(ctx.num_chunks(), 1);
        for op in generate_ops(&ctx, &uploader) {
            let outcome = op.execute(&ctx, &pacer);
            assert!(outcome.is_success());
            if ctx.resolve_chunk(&outcome) {
                let epilogue = uploader.epilogue().unwrap();
                assert!(epilogue.committed);
            }
        }

        assert_eq!(transport.object_bytes("bucket/object.bin").unwrap(), b"");
    }

    #[test]
    fn test_leading_bytes_rejected_after_first_chunk() {
        let (_dir, ctx, _transport, uploader) = upload_fixture(10, 4, b"0123456789");
        let pacer = Pacer::unlimited();

        let mut ops = generate_ops(&ctx, &uploader);
        let first = ops.remove(0);
        let outcome = first.execute(&ctx, &pacer);
        assert!(outcome.is_success());

        assert!(matches!(
            uploader.set_leading_bytes(b"0123".to_vec()),
            Err(CloudMoveError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_leading_bytes_rejected_when_set_twice() {
        let (_dir, _ctx, _transport, uploader) = upload_fixture(10, 4, b"0123456789");
        uploader.set_leading_bytes(b"0123".to_vec()).unwrap();
        assert!(matches!(
            uploader.set_leading_bytes(b"0123".to_vec()),
            Err(CloudMoveError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_probe_failure_is_distinct_from_absence() {
        let (_dir, _ctx, transport, uploader) = upload_fixture(10, 4, b"0123456789");
        assert!(!uploader.remote_exists().unwrap());

        transport.fail_probe();
        assert!(matches!(
            uploader.remote_exists(),
            Err(CloudMoveError::ProbeFailed { .. })
        ));
    }

    #[test]
    fn test_download_reassembles_object() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("restored.bin");
        let content = b"0123456789";

        let transport = Arc::new(InMemoryTransport::new());
        transport.seed_object("bucket/object.bin", content);

        let ctx = Arc::new(TransferContext::new(TransferInfo {
            id: 7,
            source: "bucket/object.bin".to_string(),
            destination: dest.to_string_lossy().to_string(),
            size: 10,
            chunk_size: 4,
            overwrite: OverwritePolicy::Always,
        }));
        let downloader = Arc::new(ObjectStoreDownloader::new(ctx.clone(), transport));
        let pacer = Pacer::unlimited();

        assert!(downloader.remote_exists().unwrap());

        let ranges = crate::chunk::chunk_ranges(10, 4);
        for range in ranges {
            let op = Arc::clone(&downloader)
                .generate_chunk(ChunkId::new(7, range.offset, range.length), range.index);
            let outcome = op.execute(&ctx, &pacer);
            assert!(outcome.is_success());
            if ctx.resolve_chunk(&outcome) {
                assert!(downloader.epilogue().unwrap().committed);
            }
        }

        assert_eq!(std::fs::read(&dest).unwrap(), content);
    }

    #[test]
    fn test_failed_download_discards_partial_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("partial.bin");

        let transport = Arc::new(InMemoryTransport::new());
        transport.seed_object("bucket/object.bin", b"0123");

        // Size claims more data than the remote can serve; the second
        // chunk hits a short read.
        let ctx = Arc::new(TransferContext::new(TransferInfo {
            id: 7,
            source: "bucket/object.bin".to_string(),
            destination: dest.to_string_lossy().to_string(),
            size: 8,
            chunk_size: 4,
            overwrite: OverwritePolicy::Always,
        }));
        let downloader = Arc::new(ObjectStoreDownloader::new(ctx.clone(), transport));
        let pacer = Pacer::unlimited();

        let ranges = crate::chunk::chunk_ranges(8, 4);
        for range in ranges {
            let op = Arc::clone(&downloader)
                .generate_chunk(ChunkId::new(7, range.offset, range.length), range.index);
            let outcome = op.execute(&ctx, &pacer);
            if ctx.resolve_chunk(&outcome) {
                assert!(!downloader.epilogue().unwrap().committed);
            }
        }

        assert!(!ctx.all_chunks_succeeded());
        assert!(!dest.exists());
    }
}
