use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::award_types::AwardType;
use crate::constants::api::DEFAULT_API_BASE;
use crate::constants::download::{
    CHUNK_SIZE, HTTP_TIMEOUT_SECS, MAX_POLL_ATTEMPTS, PAGE_DELAY_SECS, POLL_INTERVAL_SECS,
    TRANSIENT_COOLDOWN_SECS,
};
use crate::errors::SyncError;
use crate::types::{AwardKey, TreasuryAccount};

/// Code-class filter scoping a search. The two forms are mutually exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeFilter {
    /// One or more treasury account symbols; each is searched separately.
    TreasuryAccounts(Vec<TreasuryAccount>),
    /// Explicit short award identifiers.
    AwardIds(Vec<AwardKey>),
}

impl CodeFilter {
    /// True when the filter has nothing to search for.
    pub fn is_empty(&self) -> bool {
        match self {
            CodeFilter::TreasuryAccounts(accounts) => accounts.is_empty(),
            CodeFilter::AwardIds(ids) => ids.is_empty(),
        }
    }

    /// Treasury accounts used to filter extracted rows, empty for id-list filters.
    pub fn treasury_accounts(&self) -> &[TreasuryAccount] {
        match self {
            CodeFilter::TreasuryAccounts(accounts) => accounts,
            CodeFilter::AwardIds(_) => &[],
        }
    }
}

/// Fixed delays and bounds that pace traffic against the remote service.
#[derive(Clone, Debug)]
pub struct Pacing {
    /// Sleep between consecutive search pages of one category.
    pub page_delay: Duration,
    /// Sleep between status polls of one download job.
    pub poll_interval: Duration,
    /// Status polls before a job is left pending for the next sweep.
    pub max_poll_attempts: u32,
    /// Pause applied to the whole batch after a transient network failure.
    pub transient_cooldown: Duration,
    /// Entities processed per chunk.
    pub chunk_size: usize,
    /// Global timeout for a single HTTP exchange.
    pub http_timeout: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(PAGE_DELAY_SECS),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_poll_attempts: MAX_POLL_ATTEMPTS,
            transient_cooldown: Duration::from_secs(TRANSIENT_COOLDOWN_SECS),
            chunk_size: CHUNK_SIZE,
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

impl Pacing {
    /// Pacing with every delay set to zero, for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            page_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            transient_cooldown: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Process-wide configuration, built once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// API host, e.g. `https://api.usaspending.gov`.
    pub api_base: String,
    /// Root folder for raw downloads and derived artifacts.
    pub data_root: PathBuf,
    /// Name of the artifact set; derived files live under `data_root/<name>`.
    pub summary_name: String,
    /// Search scope.
    pub code_filter: CodeFilter,
    /// Award families searched, in order.
    pub award_types: Vec<AwardType>,
    /// Fiscal years covered by the category summary and reconciliation (inclusive).
    pub fiscal_years: (i32, i32),
    /// Agency toptier code used by the category summary endpoint.
    pub agency_code: String,
    /// Artifacts recorded before this instant are rebuilt.
    pub staleness_cutoff: Option<DateTime<Utc>>,
    /// Abort the batch on the first non-transient failure instead of logging it.
    pub stop_on_errors: bool,
    /// Delays and bounds.
    pub pacing: Pacing,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            data_root: PathBuf::from("data"),
            summary_name: "awards".to_string(),
            code_filter: CodeFilter::TreasuryAccounts(Vec::new()),
            award_types: AwardType::ALL.to_vec(),
            fiscal_years: (2024, 2024),
            agency_code: "072".to_string(),
            staleness_cutoff: None,
            stop_on_errors: false,
            pacing: Pacing::default(),
        }
    }
}

impl SyncConfig {
    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(self) -> Result<Self, SyncError> {
        if self.code_filter.is_empty() {
            return Err(SyncError::Configuration(
                "a treasury account or award id list is required".to_string(),
            ));
        }
        if self.award_types.is_empty() {
            return Err(SyncError::Configuration(
                "at least one award type is required".to_string(),
            ));
        }
        if self.fiscal_years.0 > self.fiscal_years.1 {
            return Err(SyncError::Configuration(format!(
                "fiscal year range {}..={} is inverted",
                self.fiscal_years.0, self.fiscal_years.1
            )));
        }
        if self.pacing.chunk_size == 0 || self.pacing.max_poll_attempts == 0 {
            return Err(SyncError::Configuration(
                "chunk size and poll attempts must be positive".to_string(),
            ));
        }
        if self.summary_name.trim().is_empty() {
            return Err(SyncError::Configuration(
                "summary name must not be empty".to_string(),
            ));
        }
        Ok(self)
    }

    /// Fiscal years covered by this run, ascending.
    pub fn fiscal_year_range(&self) -> impl Iterator<Item = i32> {
        self.fiscal_years.0..=self.fiscal_years.1
    }
}
