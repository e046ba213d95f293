//! Shared per-transfer state
//!
//! The context is the one piece of state the scheduler, the endpoint, and
//! every chunk operation of a transfer share. It tracks the transfer
//! state machine, cancellation, the first chunk failure, and the
//! completion barrier that makes the epilogue fire exactly once.

use crate::chunk::{num_chunks, ChunkOutcome};
use crate::transfer::TransferInfo;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

/// Lifecycle of one transfer. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransferState {
    /// Endpoint constructed, nothing probed yet
    Created = 0,
    /// Existence probe answered
    Probed = 1,
    /// All chunk operations generated and handed to the worker pool
    ChunksScheduled = 2,
    /// At least one chunk operation has been invoked
    ChunksResolving = 3,
    /// Every chunk succeeded and the epilogue committed
    Completed = 4,
    /// A chunk, the probe, or the commit failed (or the transfer was skipped
    /// by policy before any chunk ran)
    Failed = 5,
}

impl TransferState {
    /// True for states no transition may leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }

    fn from_u8(value: u8) -> TransferState {
        match value {
            0 => TransferState::Created,
            1 => TransferState::Probed,
            2 => TransferState::ChunksScheduled,
            3 => TransferState::ChunksResolving,
            4 => TransferState::Completed,
            _ => TransferState::Failed,
        }
    }
}

/// Per-transfer mutable state shared with chunk operations and the endpoint
pub struct TransferContext {
    info: TransferInfo,
    num_chunks: u32,
    state: AtomicU8,
    cancelled: AtomicBool,
    chunk_invoked: AtomicBool,
    remaining: AtomicU32,
    failed: AtomicBool,
    first_failure: Mutex<Option<String>>,
    epilogue_fired: AtomicBool,
}

impl TransferContext {
    /// Create the context for one transfer. Computes the chunk count once;
    /// the completion barrier is initialized to it.
    pub fn new(info: TransferInfo) -> Self {
        let chunks = num_chunks(info.size, info.chunk_size);
        Self {
            info,
            num_chunks: chunks,
            state: AtomicU8::new(TransferState::Created as u8),
            cancelled: AtomicBool::new(false),
            chunk_invoked: AtomicBool::new(false),
            remaining: AtomicU32::new(chunks),
            failed: AtomicBool::new(false),
            first_failure: Mutex::new(None),
            epilogue_fired: AtomicBool::new(false),
        }
    }

    /// The immutable transfer description
    pub fn info(&self) -> &TransferInfo {
        &self.info
    }

    /// Number of chunks this transfer needs; at least one, even for a
    /// zero-length file
    pub fn num_chunks(&self) -> u32 {
        self.num_chunks
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransferState {
        TransferState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance the state machine. Transitions never leave a terminal state
    /// and never move backwards.
    fn advance(&self, next: TransferState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = TransferState::from_u8(current);
                (!current.is_terminal() && next > current).then_some(next as u8)
            });
    }

    /// Record that the existence probe has been answered
    pub fn mark_probed(&self) {
        self.advance(TransferState::Probed);
    }

    /// Record that all chunk operations were generated and dispatched
    pub fn mark_chunks_scheduled(&self) {
        self.advance(TransferState::ChunksScheduled);
    }

    /// Record that a chunk operation was invoked. Locks out late
    /// `set_leading_bytes` calls.
    pub fn note_chunk_invoked(&self) {
        self.chunk_invoked.store(true, Ordering::Release);
        self.advance(TransferState::ChunksResolving);
    }

    /// Whether any chunk operation has been invoked yet
    pub fn chunk_invoked(&self) -> bool {
        self.chunk_invoked.load(Ordering::Acquire)
    }

    /// Ask in-flight chunk operations to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record a chunk (or probe) failure. Only the first is kept.
    pub fn record_failure(&self, message: String) {
        self.failed.store(true, Ordering::Release);
        let mut slot = self.first_failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    /// First recorded failure, if any
    pub fn first_failure(&self) -> Option<String> {
        self.first_failure.lock().unwrap().clone()
    }

    /// True while no chunk has failed
    pub fn all_chunks_succeeded(&self) -> bool {
        !self.failed.load(Ordering::Acquire)
    }

    /// Resolve one chunk against the completion barrier.
    ///
    /// Records the failure (if any) and decrements the barrier; returns
    /// `true` for exactly one caller, the one that resolved the last
    /// chunk and must now invoke the epilogue.
    pub fn resolve_chunk(&self, outcome: &ChunkOutcome) -> bool {
        if let Err(e) = &outcome.result {
            self.record_failure(format!("{}: {e}", outcome.id));
        }

        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "more chunk resolutions than chunks generated");
        previous == 1
    }

    /// Latch the epilogue. Returns `true` for the first caller only;
    /// endpoints treat a second invocation as a contract violation.
    pub fn begin_epilogue(&self) -> bool {
        self.epilogue_fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the epilogue has been entered
    pub fn epilogue_fired(&self) -> bool {
        self.epilogue_fired.load(Ordering::Acquire)
    }

    /// Move to the terminal state
    pub fn finish(&self, success: bool) {
        self.advance(if success {
            TransferState::Completed
        } else {
            TransferState::Failed
        });
    }
}
