//! Per-award download jobs: the pure state machine, its filesystem-backed
//! driver, and the batch loop that sweeps it over the award index.
//!
//! Ownership model:
//! - `state` decides; it never touches the network or disk.
//! - `machine` executes effects for one entity and persists mid-flight jobs.
//! - `batch` owns chunking, retry sweeps, and the transient cooldown.

/// Batch sweeps over many entities.
pub mod batch;
/// Filesystem-backed driver for one entity.
pub mod machine;
/// Pure state transitions.
pub mod state;

pub use batch::{BatchOptions, BatchReport, download_all};
pub use machine::{DownloadMachine, DownloadOutcome, downloaded_at};
pub use state::{DownloadEffect, DownloadEvent, DownloadState, PollBudget, transition};
