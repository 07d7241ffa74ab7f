#![doc = include_str!("../README.md")]

/// Award search request and response types, and the remote API seam.
pub mod api;
/// Award families and their search field tables.
pub mod award_types;
/// Object-class categories and health program tags.
pub mod categories;
/// Command-line runner.
pub mod cli;
/// Time source, cancellation, and paced sleeps.
pub mod clock;
/// Per-tag table combiner.
pub mod combine;
/// Run configuration.
pub mod config;
/// Centralized constants: endpoints, file names, columns, pacing defaults.
pub mod constants;
/// Per-award download state machine and batch driver.
pub mod download;
/// Award index pagination and persistence.
pub mod index;
/// Filesystem layout for raw and derived artifacts.
pub mod layout;
/// Cumulative-to-incremental outlay normalization.
pub mod normalize;
/// Stage orchestration.
pub mod pipeline;
/// Category summary tree and discrepancy report.
pub mod reconcile;
/// Artifact rebuild policy.
pub mod staleness;
/// CSV tables.
pub mod table;
/// Transaction search collection and tagging.
pub mod transactions;
/// Transports: HTTP for the remote API, atomic file helpers for local state.
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use api::{
    DownloadRequestOutcome, JobLocations, JobStatus, SearchPage, SearchRequest, SearchScope,
    SpendingApi, StatusReport, TransactionRequest,
};
pub use award_types::AwardType;
pub use categories::{HealthCatalog, HealthTags};
pub use clock::{CancelFlag, Clock, Pacer, SystemClock};
pub use combine::{CombineOutcome, TableTag};
pub use config::{CodeFilter, Pacing, SyncConfig};
pub use download::{BatchOptions, BatchReport, DownloadMachine, DownloadOutcome, PollBudget};
pub use errors::SyncError;
pub use index::{AwardIndex, PaginationCollector};
pub use layout::DataLayout;
pub use pipeline::{RunSummary, SpendingSync};
pub use reconcile::{CategorySummary, Comparison, SummaryNode};
pub use staleness::BuildTimestamps;
pub use transactions::TransactionLedger;
pub use transport::http::HttpSpendingApi;
pub use types::{AwardRecord, EntityId, TreasuryAccount};
