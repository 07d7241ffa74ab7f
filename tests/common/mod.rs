#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use spending_sync::api::{
    DownloadRequestOutcome, JobLocations, JobStatus, SearchPage, SearchRequest, SpendingApi,
    StatusReport, TransactionRequest,
};
use spending_sync::{AwardRecord, AwardType, CancelFlag, Clock, SummaryNode, SyncError};
use zip::write::SimpleFileOptions;

pub const TAS: &str = "072-019-2024/2025-1031-000";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Clock whose `sleep` only advances `now`.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start_time()),
            slept: Mutex::new(Duration::ZERO),
        })
    }

    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
        *self.now.lock().unwrap() += chrono::Duration::from_std(duration).unwrap();
    }
}

/// How the fake service treats one award's download job.
#[derive(Clone, Debug)]
pub enum Script {
    /// Report `running` for `running_polls` polls, then `finished`.
    Finish { running_polls: usize },
    /// Refuse the job with this detail.
    Reject(String),
    /// Fail the request with a transient error `times` times, then finish immediately.
    FlakyRequest { times: usize },
    /// Answer the job request without locations `times` times, then accept it.
    Unregistered { times: usize },
    /// Report a status outside the known set.
    Status(String),
    /// Fail the request with a non-transient error.
    Broken,
}

#[derive(Default)]
struct ScriptState {
    polls: HashMap<String, usize>,
    request_failures: HashMap<String, usize>,
}

/// In-memory stand-in for the remote service; counts every call.
pub struct ScriptedApi {
    awards: Vec<(AwardType, String)>,
    scripts: HashMap<String, Script>,
    state: Mutex<ScriptState>,
    calls: AtomicUsize,
    cancel_on_poll: Option<CancelFlag>,
}

impl ScriptedApi {
    pub fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Self::build(scripts, None)
    }

    pub fn cancelling(scripts: &[(&str, Script)], cancel: CancelFlag) -> Arc<Self> {
        Self::build(scripts, Some(cancel))
    }

    fn build(scripts: &[(&str, Script)], cancel_on_poll: Option<CancelFlag>) -> Arc<Self> {
        // Every award shows up under contracts; the first one also under grants.
        let mut awards: Vec<(AwardType, String)> = scripts
            .iter()
            .map(|(id, _)| (AwardType::Contract, id.to_string()))
            .collect();
        if let Some((id, _)) = scripts.first() {
            awards.push((AwardType::Grant, id.to_string()));
        }
        Arc::new(Self {
            awards,
            scripts: scripts
                .iter()
                .map(|(id, script)| (id.to_string(), script.clone()))
                .collect(),
            state: Mutex::new(ScriptState::default()),
            calls: AtomicUsize::new(0),
            cancel_on_poll,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owned handle so tests keep access to the counters after boxing.
pub struct SharedApi(pub Arc<ScriptedApi>);

impl SpendingApi for SharedApi {
    fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, SyncError> {
        let api = &self.0;
        api.count();
        let results = api
            .awards
            .iter()
            .filter(|(award_type, _)| *award_type == request.award_type)
            .map(|(award_type, id)| {
                json!({
                    "generated_internal_id": id,
                    "Award ID": format!("{id}-short"),
                    "family": award_type.name(),
                })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect();
        Ok(SearchPage {
            results,
            has_next: false,
        })
    }

    /// Two transactions per award in every fiscal year, ids `<year><position><seq>`.
    /// Page 2 repeats the first award's rows.
    fn transaction_page(&self, request: &TransactionRequest) -> Result<SearchPage, SyncError> {
        let api = &self.0;
        api.count();
        let year = request.fiscal_year;
        let take = if request.page == 1 { usize::MAX } else { 1 };
        let results = api
            .awards
            .iter()
            .filter(|(award_type, _)| *award_type == AwardType::Contract)
            .take(take)
            .enumerate()
            .flat_map(|(position, (_, id))| {
                [1, 2].map(|seq| transaction_row(year, position, seq, id))
            })
            .collect();
        Ok(SearchPage {
            results,
            has_next: request.page == 1,
        })
    }

    fn request_download(&self, entity_id: &str) -> Result<DownloadRequestOutcome, SyncError> {
        let api = &self.0;
        api.count();
        let accepted = DownloadRequestOutcome::Accepted(JobLocations {
            status_url: format!("status/{entity_id}"),
            file_url: format!("file/{entity_id}"),
        });
        match api.scripts.get(entity_id) {
            Some(Script::Reject(detail)) => Ok(DownloadRequestOutcome::Rejected(detail.clone())),
            Some(Script::Broken) => Err(SyncError::Permanent(format!("{entity_id} is broken"))),
            Some(Script::FlakyRequest { times }) => {
                let mut state = api.state.lock().unwrap();
                let failures = state
                    .request_failures
                    .entry(entity_id.to_string())
                    .or_default();
                if *failures < *times {
                    *failures += 1;
                    return Err(SyncError::Transient("connection reset".to_string()));
                }
                Ok(accepted)
            }
            Some(Script::Unregistered { times }) => {
                let mut state = api.state.lock().unwrap();
                let answered = state
                    .request_failures
                    .entry(entity_id.to_string())
                    .or_default();
                if *answered < *times {
                    *answered += 1;
                    return Ok(DownloadRequestOutcome::NotReady);
                }
                Ok(accepted)
            }
            Some(_) => Ok(accepted),
            None => Ok(DownloadRequestOutcome::Rejected("unknown award".to_string())),
        }
    }

    fn job_status(&self, status_url: &str) -> Result<StatusReport, SyncError> {
        let api = &self.0;
        api.count();
        if let Some(cancel) = &api.cancel_on_poll {
            cancel.cancel();
        }
        let entity_id = status_url.trim_start_matches("status/");
        let mut state = api.state.lock().unwrap();
        let polls = state.polls.entry(entity_id.to_string()).or_default();
        *polls += 1;
        let status = match api.scripts.get(entity_id) {
            Some(Script::Finish { running_polls }) if *polls <= *running_polls => {
                JobStatus::Running
            }
            Some(Script::Status(status)) => JobStatus::Other(status.clone()),
            _ => JobStatus::Finished,
        };
        Ok(StatusReport {
            status,
            seconds_elapsed: Some(*polls as f64),
        })
    }

    fn fetch_archive(&self, file_url: &str) -> Result<Vec<u8>, SyncError> {
        self.0.count();
        let entity_id = file_url.trim_start_matches("file/");
        Ok(award_archive(entity_id))
    }

    fn category_summary(
        &self,
        _agency_code: &str,
        fiscal_year: i32,
    ) -> Result<SummaryNode, SyncError> {
        self.0.count();
        let mut root = SummaryNode::new(format!("FY{fiscal_year}"));
        root.push_child(SummaryNode {
            name: "Contractual services and supplies".to_string(),
            obligated_amount: 250.0,
            gross_outlay_amount: 60.0,
            children: Vec::new(),
        });
        Ok(root)
    }
}

/// Transaction row with nested objects as the search endpoint returns them.
/// Later positions get earlier action dates.
pub fn transaction_row(year: i32, position: usize, seq: usize, id: &str) -> AwardRecord {
    json!({
        "internal_id": format!("{year}{position}{seq}").parse::<u64>().unwrap(),
        "Action Date": format!("{}-{:02}-{:02}", year - 1, 10 + seq, 20 - position),
        "Award ID": format!("{id}-short"),
        "Transaction Description": format!("{id} malaria control"),
        "Transaction Amount": 100 * seq,
        "NAICS": { "code": "541", "description": "Services" },
        "PSC": null,
        "Assistance Listing": { "cfda_number": "98.001", "cfda_title": "USAID Foreign Assistance" },
        "Primary Place of Performance": { "country_name": "KENYA" },
        "Recipient Location": { "country_name": "UNITED STATES" },
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// Archive with one funding table (two periods, 100 obligated, 25 cumulative
/// outlay) and one transaction history row for `entity_id`.
pub fn award_archive(entity_id: &str) -> Vec<u8> {
    let funding = format!(
        "treasury_account_symbol,submission_period,object_class_code,transaction_obligated_amount,gross_outlay_amount_FYB_to_period_end,note\n\
         {TAS},FY2024P01,251,100,10,{entity_id}\n\
         {TAS},FY2024P02,252,0,25,{entity_id}\n\
         999-000-0000,FY2024P02,252,500,500,{entity_id}\n"
    );
    let history = format!(
        "treasury_accounts_funding_this_award,action_date,note\n\
         {TAS},2023-12-15,{entity_id}\n"
    );
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        (format!("{entity_id}_FederalAccountFunding_1.csv"), funding),
        (format!("{entity_id}_TransactionHistory_1.csv"), history),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
