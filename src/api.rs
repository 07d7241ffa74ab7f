//! Remote API seam: request/response types and the `SpendingApi` trait.
//!
//! Everything the pipeline needs from the remote service goes through this
//! trait, so the state machine and batch loop can be driven by a scripted
//! implementation in tests and by `transport::http::HttpSpendingApi` in production.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::award_types::AwardType;
use crate::constants::api::PAGE_SIZE;
use crate::constants::columns::TRANSACTION_ACTION_DATE;
use crate::constants::transactions::{TRANSACTION_FIELDS, TRANSACTION_SORT_ORDER};
use crate::constants::download::{FINISHED_STATUS, QUEUED_STATUSES, RUNNING_STATUS};
use crate::errors::SyncError;
use crate::reconcile::SummaryNode;
use crate::types::{AwardKey, AwardRecord, Location, TreasuryAccount};

/// Single code-class scope for one search pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchScope {
    /// One treasury account symbol.
    TreasuryAccount(TreasuryAccount),
    /// Explicit short award identifiers.
    AwardIds(Vec<AwardKey>),
}

/// Immutable description of one search page request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    /// Code-class scope.
    pub scope: SearchScope,
    /// Award family (drives type codes and field projection).
    pub award_type: AwardType,
    /// 1-based page index.
    pub page: u32,
}

impl SearchScope {
    /// Search filters selecting this scope.
    fn filters(&self) -> serde_json::Map<String, Value> {
        let mut filters = serde_json::Map::new();
        match self {
            SearchScope::TreasuryAccount(account) => {
                filters.insert("tas_codes".to_string(), json!({ "require": [[account]] }));
            }
            SearchScope::AwardIds(ids) => {
                filters.insert("award_ids".to_string(), json!(ids));
            }
        }
        filters
    }
}

impl SearchRequest {
    /// JSON body sent to the search endpoint.
    pub fn body(&self) -> Value {
        let mut filters = self.scope.filters();
        filters.insert(
            "award_type_codes".to_string(),
            json!(self.award_type.type_codes()),
        );
        json!({
            "filters": filters,
            "fields": self.award_type.search_fields(),
            "limit": PAGE_SIZE,
            "page": self.page,
        })
    }
}

/// One page of the transaction search, limited to one fiscal year.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub scope: SearchScope,
    pub fiscal_year: i32,
    /// 1-based page index.
    pub page: u32,
}

impl TransactionRequest {
    /// JSON body sent to the transaction search endpoint.
    ///
    /// Every award family is included; the fiscal year becomes an
    /// October-to-September action date window.
    pub fn body(&self) -> Value {
        let mut filters = self.scope.filters();
        let type_codes: Vec<&str> = AwardType::ALL
            .iter()
            .flat_map(|award_type| award_type.type_codes().iter().copied())
            .collect();
        filters.insert("award_type_codes".to_string(), json!(type_codes));
        filters.insert(
            "time_period".to_string(),
            json!([{
                "start_date": format!("{}-10-01", self.fiscal_year - 1),
                "end_date": format!("{}-09-30", self.fiscal_year),
            }]),
        );
        json!({
            "filters": filters,
            "fields": TRANSACTION_FIELDS,
            "limit": PAGE_SIZE,
            "page": self.page,
            "sort": TRANSACTION_ACTION_DATE,
            "order": TRANSACTION_SORT_ORDER,
        })
    }
}

/// One page of search results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPage {
    /// Result rows.
    pub results: Vec<AwardRecord>,
    /// Whether another page follows.
    pub has_next: bool,
}

/// Status and file locations for an accepted download job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLocations {
    /// Where to poll for job status.
    pub status_url: Location,
    /// Where the finished archive will be served.
    pub file_url: Location,
}

/// Response of the download-job endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadRequestOutcome {
    /// Job accepted.
    Accepted(JobLocations),
    /// Job refused with an error detail; not retried.
    Rejected(String),
    /// Neither locations nor a refusal yet; ask again shortly.
    NotReady,
}

/// Status reported by the status endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted but not started.
    Queued,
    /// In progress.
    Running,
    /// Archive ready at the file location.
    Finished,
    /// Any other status string, treated as terminal failure.
    Other(String),
}

impl JobStatus {
    /// Map a raw status string.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if QUEUED_STATUSES.contains(&normalized.as_str()) {
            JobStatus::Queued
        } else if normalized == RUNNING_STATUS {
            JobStatus::Running
        } else if normalized == FINISHED_STATUS {
            JobStatus::Finished
        } else {
            JobStatus::Other(raw.to_string())
        }
    }
}

/// Status poll result.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    /// Parsed status.
    pub status: JobStatus,
    /// Seconds the remote job has been running, when reported.
    pub seconds_elapsed: Option<f64>,
}

/// Remote award-search and download service.
pub trait SpendingApi {
    /// Fetch one search page.
    fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, SyncError>;

    /// Fetch one transaction search page.
    fn transaction_page(&self, request: &TransactionRequest) -> Result<SearchPage, SyncError>;

    /// Ask the service to build a download archive for one entity.
    fn request_download(&self, entity_id: &str) -> Result<DownloadRequestOutcome, SyncError>;

    /// Poll a job's status location.
    fn job_status(&self, status_url: &str) -> Result<StatusReport, SyncError>;

    /// Fetch a finished archive.
    fn fetch_archive(&self, file_url: &str) -> Result<Vec<u8>, SyncError>;

    /// Fetch the category summary tree for one agency and fiscal year.
    fn category_summary(&self, agency_code: &str, fiscal_year: i32)
    -> Result<SummaryNode, SyncError>;
}
