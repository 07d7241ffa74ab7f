use std::io::Read;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use ureq::Agent;

use crate::api::{
    DownloadRequestOutcome, JobLocations, JobStatus, SearchPage, SearchRequest, SpendingApi,
    StatusReport, TransactionRequest,
};
use crate::constants::api::{
    AWARD_DOWNLOAD_PATH, OBJECT_CLASS_PATH, SPENDING_BY_AWARD_PATH, SPENDING_BY_TRANSACTION_PATH,
    TRANSIENT_STATUSES,
};
use crate::errors::SyncError;
use crate::reconcile::SummaryNode;
use crate::types::AwardRecord;

/// `SpendingApi` over blocking `ureq` requests.
///
/// HTTP error statuses are inspected here rather than surfaced by ureq, so the
/// download endpoint's `detail` payload survives and throttling statuses can be
/// classified as transient.
pub struct HttpSpendingApi {
    agent: Agent,
    base: String,
}

impl HttpSpendingApi {
    /// Create a client for `base` (e.g. `https://api.usaspending.gov`).
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<(u16, String), SyncError> {
        debug!("[spending_sync:http] POST {url}");
        let response = self
            .agent
            .post(url)
            .send_json(body)
            .map_err(|err| classify_transport_error(url, err))?;
        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|err| classify_transport_error(url, err))?;
        Ok((status, text))
    }

    fn get_text(&self, url: &str) -> Result<(u16, String), SyncError> {
        debug!("[spending_sync:http] GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|err| classify_transport_error(url, err))?;
        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|err| classify_transport_error(url, err))?;
        Ok((status, text))
    }
}

impl SpendingApi for HttpSpendingApi {
    fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, SyncError> {
        let url = self.endpoint(SPENDING_BY_AWARD_PATH);
        let (status, body) = self.post_json(&url, &request.body())?;
        ensure_success(&url, status, &body)?;
        parse_search_page(&body)
    }

    fn transaction_page(&self, request: &TransactionRequest) -> Result<SearchPage, SyncError> {
        let url = self.endpoint(SPENDING_BY_TRANSACTION_PATH);
        let (status, body) = self.post_json(&url, &request.body())?;
        ensure_success(&url, status, &body)?;
        parse_search_page(&body)
    }

    fn request_download(&self, entity_id: &str) -> Result<DownloadRequestOutcome, SyncError> {
        let url = self.endpoint(AWARD_DOWNLOAD_PATH);
        let payload = serde_json::json!({ "award_id": entity_id });
        let (status, body) = self.post_json(&url, &payload)?;
        if TRANSIENT_STATUSES.contains(&status) {
            return Err(SyncError::Transient(format!(
                "download request for '{entity_id}' returned HTTP {status}"
            )));
        }
        parse_download_response(entity_id, &body)
    }

    fn job_status(&self, status_url: &str) -> Result<StatusReport, SyncError> {
        let (status, body) = self.get_text(status_url)?;
        ensure_success(status_url, status, &body)?;
        parse_status_report(&body)
    }

    fn fetch_archive(&self, file_url: &str) -> Result<Vec<u8>, SyncError> {
        debug!("[spending_sync:http] GET {file_url}");
        let response = self
            .agent
            .get(file_url)
            .call()
            .map_err(|err| classify_transport_error(file_url, err))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(status_error(file_url, status, ""));
        }
        let mut reader = response.into_body().into_reader();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|err| {
            SyncError::Transient(format!("failed reading archive '{file_url}': {err}"))
        })?;
        Ok(bytes)
    }

    fn category_summary(
        &self,
        agency_code: &str,
        fiscal_year: i32,
    ) -> Result<SummaryNode, SyncError> {
        let path = OBJECT_CLASS_PATH.replace("{agency}", agency_code);
        let url = format!(
            "{}?fiscal_year={fiscal_year}&limit=100",
            self.endpoint(&path)
        );
        let (status, body) = self.get_text(&url)?;
        ensure_success(&url, status, &body)?;
        parse_object_class_summary(fiscal_year, &body)
    }
}

/// Map a ureq failure onto the transient/permanent split.
fn classify_transport_error(url: &str, err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => {
            SyncError::Transient(format!("request to '{url}' failed: {err}"))
        }
        ureq::Error::StatusCode(status) => status_error(url, status, ""),
        other => SyncError::Permanent(format!("request to '{url}' failed: {other}")),
    }
}

fn status_error(url: &str, status: u16, body: &str) -> SyncError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("'{url}' returned HTTP {status} {snippet}");
    if TRANSIENT_STATUSES.contains(&status) {
        SyncError::Transient(message)
    } else {
        SyncError::Permanent(message.trim_end().to_string())
    }
}

fn ensure_success(url: &str, status: u16, body: &str) -> Result<(), SyncError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(status_error(url, status, body))
    }
}

fn parse_json(body: &str, what: &str) -> Result<Value, SyncError> {
    serde_json::from_str(body)
        .map_err(|err| SyncError::Permanent(format!("failed parsing {what} response: {err}")))
}

/// Parse a search response: `{"results": [...], "page_metadata": {"hasNext": bool}}`.
pub fn parse_search_page(body: &str) -> Result<SearchPage, SyncError> {
    let json = parse_json(body, "search")?;
    let results = json
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::Permanent("search response has no results list".to_string()))?
        .iter()
        .filter_map(|row| row.as_object().cloned())
        .collect::<Vec<AwardRecord>>();
    let has_next = json
        .get("page_metadata")
        .and_then(|meta| meta.get("hasNext"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(SearchPage { results, has_next })
}

/// Parse a download-job response into accepted locations or a rejection detail.
///
/// A payload carrying neither means the service has not registered the job
/// yet; the caller asks again after the poll interval.
pub fn parse_download_response(
    entity_id: &str,
    body: &str,
) -> Result<DownloadRequestOutcome, SyncError> {
    let json = parse_json(body, "download request")?;
    let text = |key: &str| json.get(key).and_then(Value::as_str).map(str::to_string);
    if let (Some(status_url), Some(file_url)) = (text("status_url"), text("file_url")) {
        return Ok(DownloadRequestOutcome::Accepted(JobLocations {
            status_url,
            file_url,
        }));
    }
    if let Some(detail) = json.get("detail") {
        let detail = detail
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| detail.to_string());
        return Ok(DownloadRequestOutcome::Rejected(detail));
    }
    debug!("[spending_sync:http] download request for '{entity_id}' returned no status location yet");
    Ok(DownloadRequestOutcome::NotReady)
}

/// Parse a status poll response: `{"status": "...", "seconds_elapsed": ...}`.
pub fn parse_status_report(body: &str) -> Result<StatusReport, SyncError> {
    let json = parse_json(body, "status")?;
    let raw = json
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Permanent("status response has no status field".to_string()))?;
    let seconds_elapsed = json.get("seconds_elapsed").and_then(|value| {
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|text| text.parse::<f64>().ok()))
    });
    Ok(StatusReport {
        status: JobStatus::parse(raw),
        seconds_elapsed,
    })
}

/// Parse an agency object-class response into a `FY<year>` summary tree.
pub fn parse_object_class_summary(fiscal_year: i32, body: &str) -> Result<SummaryNode, SyncError> {
    let json = parse_json(body, "object class")?;
    let results = json
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SyncError::Permanent("object class response has no results list".to_string())
        })?;
    let mut root = SummaryNode::new(format!("FY{fiscal_year}"));
    for entry in results {
        root.push_child(summary_node_from_json(entry));
    }
    Ok(root)
}

fn summary_node_from_json(value: &Value) -> SummaryNode {
    let amount = |key: &str| value.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let children = value
        .get("children")
        .and_then(Value::as_array)
        .map(|children| children.iter().map(summary_node_from_json).collect())
        .unwrap_or_default();
    SummaryNode {
        name,
        obligated_amount: amount("obligated_amount"),
        gross_outlay_amount: amount("gross_outlay_amount"),
        children,
    }
}
