//! Transfer execution
//!
//! The runner is the reference embodiment of the external scheduler: it
//! probes the destination, applies overwrite policy, captures leading
//! bytes, generates every chunk operation, executes them on a worker pool,
//! and lets the completion barrier fire the epilogue from whichever worker
//! resolves the last chunk.

use crate::chunk::{chunk_ranges, ChunkId, ChunkOperation, ChunkOutcome};
use crate::config::{EngineConfig, OverwritePolicy, RemoteKind};
use crate::endpoint::{
    create_downloader, create_uploader, Downloader, EpilogueOutcome, TransferEndpoint, Uploader,
};
use crate::error::{CloudMoveError, Result};
use crate::io::{read_leading_bytes, FileRangeReader, RangeReader};
use crate::pacer::Pacer;
use crate::properties::{PropertyReplayReport, PropertySource};
use crate::transfer::{TransferContext, TransferInfo, TransferState};
use crate::transport::SharedTransport;
use crossbeam::channel::bounded;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one driven transfer
#[derive(Debug)]
pub struct TransferReport {
    /// Display name of the moved file
    pub name: String,
    /// Terminal state the transfer reached
    pub status: TransferState,
    /// True when overwrite policy skipped the transfer before any chunk ran
    pub skipped: bool,
    /// Number of chunk operations generated
    pub chunks: u32,
    /// Bytes moved by successful chunks
    pub bytes_moved: u64,
    /// Wall-clock duration
    pub duration: Duration,
    /// Average throughput in bytes/second
    pub throughput: f64,
    /// Content type sniffed from the leading bytes, if any
    pub content_type: Option<String>,
    /// Property replay result, when the endpoint performed one
    pub properties: Option<PropertyReplayReport>,
    /// Failed operations as (operation, reason) pairs
    pub failures: Vec<(String, String)>,
}

impl TransferReport {
    /// True if the transfer reached `Completed`
    pub fn is_success(&self) -> bool {
        self.status == TransferState::Completed
    }

    /// True if data moved but some metadata could not be replayed
    pub fn is_degraded(&self) -> bool {
        self.is_success()
            && self
                .properties
                .as_ref()
                .is_some_and(|report| !report.is_clean())
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("File:        {}", self.name);
        println!("Status:      {:?}{}", self.status, if self.skipped { " (skipped)" } else { "" });
        println!("Bytes moved: {}", humansize::format_size(self.bytes_moved, humansize::BINARY));
        println!("Chunks:      {}", self.chunks);
        println!("Duration:    {:.2?}", self.duration);
        println!("Throughput:  {}/s", humansize::format_size(self.throughput as u64, humansize::BINARY));

        if let Some(content_type) = &self.content_type {
            println!("Content type: {content_type}");
        }

        if let Some(report) = &self.properties {
            let applied: Vec<String> = report.applied.iter().map(|k| k.to_string()).collect();
            println!("Properties:  {}", if applied.is_empty() { "none".to_string() } else { applied.join(", ") });
            for (kind, message) in &report.warnings {
                println!("  warning: {kind}: {message}");
            }
        }

        if !self.failures.is_empty() {
            println!("\nFailures: {}", self.failures.len());
            for (operation, reason) in &self.failures {
                println!("  {operation} - {reason}");
            }
        }
    }
}

enum WorkerEvent {
    Chunk(ChunkOutcome),
    Epilogue(Result<EpilogueOutcome>),
}

/// Drives whole transfers against a shared pacer and worker pool settings
pub struct TransferRunner {
    config: EngineConfig,
    pacer: Pacer,
}

impl TransferRunner {
    /// Create a runner, building the pacer from the configured bandwidth cap
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let pacer = match &config.bandwidth {
            Some(rate) => Pacer::from_rate_string(rate).ok_or_else(|| {
                CloudMoveError::config(format!("invalid bandwidth cap: {rate}"))
            })?,
            None => Pacer::unlimited(),
        };

        Ok(Self { config, pacer })
    }

    /// Create a runner that shares an existing process-wide pacer
    pub fn with_pacer(config: EngineConfig, pacer: Pacer) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pacer })
    }

    /// The pacer this runner gates chunk operations through
    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Upload one local file to the remote destination described by `info`
    pub fn upload(
        &self,
        info: TransferInfo,
        kind: RemoteKind,
        transport: SharedTransport,
        properties: Option<Arc<dyn PropertySource>>,
    ) -> Result<TransferReport> {
        let start = Instant::now();
        let ctx = Arc::new(TransferContext::new(info));
        let uploader = create_uploader(kind, Arc::clone(&ctx), transport, properties);

        // Probe first; overwrite policy is the scheduler's decision, made
        // here before anything is scheduled. A probe error blocks the
        // transfer rather than being treated as an overwrite answer.
        let exists = uploader.remote_exists()?;
        ctx.mark_probed();
        if exists {
            match ctx.info().overwrite {
                OverwritePolicy::Always => {}
                OverwritePolicy::Skip => {
                    tracing::info!(destination = %ctx.info().destination, "destination exists, skipping");
                    ctx.finish(true);
                    return Ok(self.skipped_report(&ctx, start.elapsed()));
                }
                OverwritePolicy::Fail => {
                    ctx.finish(false);
                    return Err(CloudMoveError::DestinationExists(
                        ctx.info().destination.clone(),
                    ));
                }
            }
        }

        // Leading bytes must be in place before the first chunk runs.
        let leading = read_leading_bytes(
            Path::new(&ctx.info().source),
            self.config.leading_bytes,
        )?;
        uploader.set_leading_bytes(leading)?;

        let info = ctx.info().clone();
        let ranges = chunk_ranges(info.size, info.chunk_size);
        let whole_file = ranges.len() == 1;
        let ops: Vec<ChunkOperation> = ranges
            .iter()
            .map(|range| {
                let reader: Box<dyn RangeReader> = Box::new(FileRangeReader::new(&info.source));
                Arc::clone(&uploader).generate_chunk(
                    ChunkId::new(info.id, range.offset, range.length),
                    range.index,
                    reader,
                    whole_file,
                )
            })
            .collect();
        ctx.mark_chunks_scheduled();

        let (outcomes, epilogue) = self.execute_chunks(&uploader, &ctx, ops);
        Ok(self.finish_report(&ctx, outcomes, epilogue, start.elapsed()))
    }

    /// Download one remote file to the local destination described by `info`
    pub fn download(
        &self,
        info: TransferInfo,
        kind: RemoteKind,
        transport: SharedTransport,
        properties: Option<Arc<dyn PropertySource>>,
    ) -> Result<TransferReport> {
        let start = Instant::now();
        let ctx = Arc::new(TransferContext::new(info));
        let downloader = create_downloader(kind, Arc::clone(&ctx), transport, properties);

        // For downloads the probe targets the remote source.
        let exists = downloader.remote_exists()?;
        ctx.mark_probed();
        if !exists {
            ctx.finish(false);
            return Err(CloudMoveError::NotFound(PathBuf::from(&ctx.info().source)));
        }

        // Overwrite policy applies to the local destination.
        if Path::new(&ctx.info().destination).exists() {
            match ctx.info().overwrite {
                OverwritePolicy::Always => {}
                OverwritePolicy::Skip => {
                    tracing::info!(destination = %ctx.info().destination, "destination exists, skipping");
                    ctx.finish(true);
                    return Ok(self.skipped_report(&ctx, start.elapsed()));
                }
                OverwritePolicy::Fail => {
                    ctx.finish(false);
                    return Err(CloudMoveError::DestinationExists(
                        ctx.info().destination.clone(),
                    ));
                }
            }
        }

        let info = ctx.info().clone();
        let ops: Vec<ChunkOperation> = chunk_ranges(info.size, info.chunk_size)
            .iter()
            .map(|range| {
                Arc::clone(&downloader).generate_chunk(
                    ChunkId::new(info.id, range.offset, range.length),
                    range.index,
                )
            })
            .collect();
        ctx.mark_chunks_scheduled();

        let (outcomes, epilogue) = self.execute_chunks(&downloader, &ctx, ops);
        Ok(self.finish_report(&ctx, outcomes, epilogue, start.elapsed()))
    }

    /// Execute all chunk operations on the worker pool.
    ///
    /// Whichever worker decrements the completion barrier to zero invokes
    /// the epilogue; that resolution happens-after every other chunk
    /// resolution, which is the one ordering the engine requires.
    fn execute_chunks<E>(
        &self,
        endpoint: &Arc<E>,
        ctx: &Arc<TransferContext>,
        ops: Vec<ChunkOperation>,
    ) -> (Vec<ChunkOutcome>, Option<Result<EpilogueOutcome>>)
    where
        E: TransferEndpoint + ?Sized + 'static,
    {
        let total = ops.len();
        let workers = self.config.effective_workers().min(total).max(1);

        let (op_tx, op_rx) = bounded::<ChunkOperation>(total);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(total + 1);

        for op in ops {
            op_tx.send(op).expect("channel sized to op count");
        }
        drop(op_tx);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let op_rx = op_rx.clone();
            let event_tx = event_tx.clone();
            let ctx = Arc::clone(ctx);
            let endpoint = Arc::clone(endpoint);
            let pacer = self.pacer.clone();

            let handle = thread::spawn(move || {
                while let Ok(op) = op_rx.recv() {
                    let outcome = op.execute(&ctx, &pacer);
                    let last = ctx.resolve_chunk(&outcome);
                    let _ = event_tx.send(WorkerEvent::Chunk(outcome));

                    if last {
                        let _ = event_tx.send(WorkerEvent::Epilogue(endpoint.epilogue()));
                    }
                }
                tracing::debug!("transfer worker {} drained", worker_id);
            });
            handles.push(handle);
        }
        drop(op_rx);
        drop(event_tx);

        let mut outcomes = Vec::with_capacity(total);
        let mut epilogue = None;
        for event in event_rx.iter() {
            match event {
                WorkerEvent::Chunk(outcome) => outcomes.push(outcome),
                WorkerEvent::Epilogue(result) => {
                    debug_assert!(epilogue.is_none(), "epilogue delivered twice");
                    epilogue = Some(result);
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        (outcomes, epilogue)
    }

    fn skipped_report(&self, ctx: &TransferContext, duration: Duration) -> TransferReport {
        TransferReport {
            name: ctx.info().display_name().to_string(),
            status: ctx.state(),
            skipped: true,
            chunks: 0,
            bytes_moved: 0,
            duration,
            throughput: 0.0,
            content_type: None,
            properties: None,
            failures: Vec::new(),
        }
    }

    fn finish_report(
        &self,
        ctx: &Arc<TransferContext>,
        outcomes: Vec<ChunkOutcome>,
        epilogue: Option<Result<EpilogueOutcome>>,
        duration: Duration,
    ) -> TransferReport {
        let mut bytes_moved = 0u64;
        let mut failures = Vec::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => bytes_moved += outcome.bytes,
                Err(e) => failures.push((outcome.id.to_string(), e.to_string())),
            }
        }

        let mut committed = false;
        let mut content_type = None;
        let mut properties = None;
        match epilogue {
            Some(Ok(outcome)) => {
                committed = outcome.committed;
                content_type = outcome.content_type;
                properties = outcome.properties;
            }
            Some(Err(e)) => failures.push(("epilogue".to_string(), e.to_string())),
            None => failures.push(("epilogue".to_string(), "was never invoked".to_string())),
        }

        let success = ctx.all_chunks_succeeded() && committed;
        ctx.finish(success);

        let throughput = if duration.as_secs_f64() > 0.0 {
            bytes_moved as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        TransferReport {
            name: ctx.info().display_name().to_string(),
            status: ctx.state(),
            skipped: false,
            chunks: ctx.num_chunks(),
            bytes_moved,
            duration,
            throughput,
            content_type,
            properties,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryTransport, LocalDirTransport};
    use tempfile::TempDir;

    fn engine_config() -> EngineConfig {
        EngineConfig {
            chunk_size: 4,
            workers: 2,
            ..Default::default()
        }
    }

    fn write_source(dir: &TempDir, name: &str, content: &[u8]) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    fn upload_info(source: String, destination: &str, size: u64) -> TransferInfo {
        TransferInfo {
            id: 1,
            source,
            destination: destination.to_string(),
            size,
            chunk_size: 4,
            overwrite: OverwritePolicy::Always,
        }
    }

    #[test]
    fn test_upload_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "in.txt", b"hello chunked world");
        let transport = Arc::new(InMemoryTransport::new());
        let runner = TransferRunner::new(engine_config()).unwrap();

        let report = runner
            .upload(
                upload_info(source, "bucket/out.txt", 19),
                RemoteKind::ObjectStore,
                transport.clone(),
                None,
            )
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.status, TransferState::Completed);
        assert_eq!(report.chunks, 5);
        assert_eq!(report.bytes_moved, 19);
        assert_eq!(report.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            transport.object_bytes("bucket/out.txt").unwrap(),
            b"hello chunked world"
        );
        assert_eq!(transport.commit_calls(), 1);
    }

    #[test]
    fn test_upload_zero_length_file() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "empty.bin", b"");
        let transport = Arc::new(InMemoryTransport::new());
        let runner = TransferRunner::new(engine_config()).unwrap();

        let report = runner
            .upload(
                upload_info(source, "bucket/empty.bin", 0),
                RemoteKind::ObjectStore,
                transport.clone(),
                None,
            )
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.chunks, 1);
        assert_eq!(transport.object_bytes("bucket/empty.bin").unwrap(), b"");
    }

    #[test]
    fn test_failed_chunk_fails_the_transfer_once() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "in.bin", &[0xAA; 12]);
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_block(1);
        let runner = TransferRunner::new(engine_config()).unwrap();

        let report = runner
            .upload(
                upload_info(source, "bucket/out.bin", 12),
                RemoteKind::ObjectStore,
                transport.clone(),
                None,
            )
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.status, TransferState::Failed);
        assert!(report.failures.iter().any(|(op, _)| op.contains("[4, +4)")));
        assert_eq!(transport.commit_calls(), 0);
        assert!(transport.object_bytes("bucket/out.bin").is_none());
    }

    #[test]
    fn test_probe_error_blocks_the_transfer() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "in.bin", b"data");
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_probe();
        let runner = TransferRunner::new(engine_config()).unwrap();

        let err = runner
            .upload(
                upload_info(source, "bucket/out.bin", 4),
                RemoteKind::ObjectStore,
                transport,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CloudMoveError::ProbeFailed { .. }));
    }

    #[test]
    fn test_overwrite_skip_short_circuits() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "in.bin", b"data");
        let transport = Arc::new(InMemoryTransport::new());
        transport.seed_object("bucket/out.bin", b"already here");
        let runner = TransferRunner::new(engine_config()).unwrap();

        let mut info = upload_info(source, "bucket/out.bin", 4);
        info.overwrite = OverwritePolicy::Skip;
        let report = runner
            .upload(info, RemoteKind::ObjectStore, transport.clone(), None)
            .unwrap();

        assert!(report.skipped);
        assert_eq!(report.bytes_moved, 0);
        // Destination untouched.
        assert_eq!(
            transport.object_bytes("bucket/out.bin").unwrap(),
            b"already here"
        );
    }

    #[test]
    fn test_overwrite_fail_surfaces_an_error() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "in.bin", b"data");
        let transport = Arc::new(InMemoryTransport::new());
        transport.seed_object("bucket/out.bin", b"already here");
        let runner = TransferRunner::new(engine_config()).unwrap();

        let mut info = upload_info(source, "bucket/out.bin", 4);
        info.overwrite = OverwritePolicy::Fail;
        let err = runner
            .upload(info, RemoteKind::ObjectStore, transport, None)
            .unwrap_err();
        assert!(matches!(err, CloudMoveError::DestinationExists(_)));
    }

    #[test]
    fn test_file_share_round_trip_through_directory_transport() {
        let source_dir = TempDir::new().unwrap();
        let share_dir = TempDir::new().unwrap();
        let restore_dir = TempDir::new().unwrap();

        let content: Vec<u8> = (0..100u8).collect();
        let source = write_source(&source_dir, "payload.bin", &content);
        let transport = Arc::new(LocalDirTransport::new(share_dir.path()).unwrap());
        let runner = TransferRunner::new(EngineConfig {
            chunk_size: 16,
            workers: 4,
            ..Default::default()
        })
        .unwrap();

        let report = runner
            .upload(
                TransferInfo {
                    id: 1,
                    source: source.clone(),
                    destination: "payload.bin".to_string(),
                    size: 100,
                    chunk_size: 16,
                    overwrite: OverwritePolicy::Always,
                },
                RemoteKind::FileShare,
                transport.clone(),
                Some(Arc::new(crate::properties::LocalFileSource::new(&source))),
            )
            .unwrap();
        assert!(report.is_success());
        assert_eq!(
            std::fs::read(share_dir.path().join("payload.bin")).unwrap(),
            content
        );

        let restored = restore_dir.path().join("restored.bin");
        let report = runner
            .download(
                TransferInfo {
                    id: 2,
                    source: "payload.bin".to_string(),
                    destination: restored.to_string_lossy().to_string(),
                    size: 100,
                    chunk_size: 16,
                    overwrite: OverwritePolicy::Always,
                },
                RemoteKind::FileShare,
                transport,
                None,
            )
            .unwrap();
        assert!(report.is_success());
        assert_eq!(std::fs::read(&restored).unwrap(), content);
    }

    #[test]
    fn test_download_missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(InMemoryTransport::new());
        let runner = TransferRunner::new(engine_config()).unwrap();

        let err = runner
            .download(
                TransferInfo {
                    id: 1,
                    source: "bucket/absent.bin".to_string(),
                    destination: dir.path().join("out.bin").to_string_lossy().to_string(),
                    size: 4,
                    chunk_size: 4,
                    overwrite: OverwritePolicy::Always,
                },
                RemoteKind::ObjectStore,
                transport,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CloudMoveError::NotFound(_)));
    }

    #[test]
    fn test_many_chunks_across_workers() {
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..255u8).cycle().take(4096).collect();
        let source = write_source(&dir, "big.bin", &content);
        let transport = Arc::new(InMemoryTransport::new());
        let runner = TransferRunner::new(EngineConfig {
            chunk_size: 128,
            workers: 8,
            ..Default::default()
        })
        .unwrap();

        let report = runner
            .upload(
                TransferInfo {
                    id: 1,
                    source,
                    destination: "bucket/big.bin".to_string(),
                    size: 4096,
                    chunk_size: 128,
                    overwrite: OverwritePolicy::Always,
                },
                RemoteKind::ObjectStore,
                transport.clone(),
                None,
            )
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.chunks, 32);
        assert_eq!(transport.object_bytes("bucket/big.bin").unwrap(), content);
        assert_eq!(transport.commit_calls(), 1);
        let order = transport.committed_order("bucket/big.bin").unwrap();
        assert_eq!(order, (0..32).collect::<Vec<u32>>());
    }
}
