//! Per-transfer state and execution
//!
//! One transfer moves one logical file. [`TransferInfo`] describes it,
//! [`TransferContext`] carries the shared mutable state (cancellation,
//! state machine, completion barrier), and [`TransferRunner`] drives the
//! whole lifecycle on a worker pool.

mod context;
mod info;
mod runner;

pub use context::{TransferContext, TransferState};
pub use info::TransferInfo;
pub use runner::{TransferReport, TransferRunner};
