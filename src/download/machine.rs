//! Drives the pure state machine for one entity against the API and the filesystem.

use std::fs;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::api::{DownloadRequestOutcome, JobLocations, SpendingApi};
use crate::clock::Pacer;
use crate::combine::TableTag;
use crate::constants::columns::ACTION_DATE;
use crate::download::state::{
    DownloadEffect, DownloadEvent, DownloadState, PollBudget, transition,
};
use crate::errors::SyncError;
use crate::layout::DataLayout;
use crate::table::Table;
use crate::transport::fs::{
    find_tables, remove_if_exists, unpack_archive, write_bytes_atomic, write_json_atomic,
};

/// Result of one pass of the state machine for one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Raw data already present and fresh; no network calls made.
    Skipped,
    /// Archive fetched and unpacked.
    Finished,
    /// Terminal remote failure; not retried.
    Failed(String),
    /// Job still queued or running after the poll budget; retry on a later sweep.
    Pending,
}

/// Per-entity download driver. Holds no per-entity state; the filesystem is
/// the only persistence layer.
pub struct DownloadMachine<'a> {
    api: &'a dyn SpendingApi,
    layout: &'a DataLayout,
    pacer: &'a Pacer,
    budget: PollBudget,
    cutoff: Option<DateTime<Utc>>,
}

impl<'a> DownloadMachine<'a> {
    /// Create a driver.
    pub fn new(
        api: &'a dyn SpendingApi,
        layout: &'a DataLayout,
        pacer: &'a Pacer,
        budget: PollBudget,
        cutoff: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            api,
            layout,
            pacer,
            budget,
            cutoff,
        }
    }

    /// Run one pass for `entity_id`.
    ///
    /// Remote rejections and unknown terminal statuses come back as
    /// `Ok(Failed)`; transport failures propagate as errors with any persisted
    /// pending state left in place for the next attempt.
    pub fn run(&self, entity_id: &str) -> Result<DownloadOutcome, SyncError> {
        self.pacer.checkpoint()?;
        if self.is_fresh(entity_id) {
            return Ok(DownloadOutcome::Skipped);
        }

        let mut state = DownloadState::Idle;
        let mut next = Some(match self.load_pending(entity_id)? {
            Some(job) => {
                info!("[spending_sync:download] resuming {entity_id} at {}", job.status_url);
                DownloadEvent::Resume(job)
            }
            None => DownloadEvent::Start,
        });

        while let Some(event) = next.take() {
            self.pacer.checkpoint()?;
            let (new_state, effects) = transition(state, event, self.budget);
            state = new_state;
            for effect in effects {
                if let Some(event) = self.execute(entity_id, effect)? {
                    next = Some(event);
                }
            }
        }

        Ok(match state {
            DownloadState::Finished => DownloadOutcome::Finished,
            DownloadState::Failed(reason) => {
                warn!("[spending_sync:download] {entity_id} failed: {reason}");
                DownloadOutcome::Failed(reason)
            }
            DownloadState::Polling { attempts, .. } => {
                info!(
                    "[spending_sync:download] {entity_id} still pending after {attempts} polls"
                );
                DownloadOutcome::Pending
            }
            DownloadState::Requesting { attempts } => {
                info!(
                    "[spending_sync:download] {entity_id} job still unregistered after {attempts} requests"
                );
                DownloadOutcome::Pending
            }
            DownloadState::Idle | DownloadState::Requested(_) => DownloadOutcome::Pending,
        })
    }

    fn execute(
        &self,
        entity_id: &str,
        effect: DownloadEffect,
    ) -> Result<Option<DownloadEvent>, SyncError> {
        match effect {
            DownloadEffect::RequestJob => Ok(Some(match self.api.request_download(entity_id)? {
                DownloadRequestOutcome::Accepted(job) => {
                    info!("[spending_sync:download] {entity_id} job accepted: {}", job.file_url);
                    DownloadEvent::Accepted(job)
                }
                DownloadRequestOutcome::Rejected(detail) => DownloadEvent::Rejected(detail),
                DownloadRequestOutcome::NotReady => {
                    info!("[spending_sync:download] {entity_id} job not registered yet");
                    DownloadEvent::NotReady
                }
            })),
            DownloadEffect::PersistPending(job) => {
                write_json_atomic(&self.layout.pending_file(entity_id), &job)?;
                Ok(Some(DownloadEvent::Persisted))
            }
            DownloadEffect::Wait(duration) => {
                self.pacer.wait(duration)?;
                Ok(None)
            }
            DownloadEffect::PollStatus(status_url) => {
                let report = self.api.job_status(&status_url)?;
                info!(
                    "[spending_sync:download] {entity_id} {:?}, {:.1} seconds elapsed",
                    report.status,
                    report.seconds_elapsed.unwrap_or_default()
                );
                Ok(Some(DownloadEvent::Polled(report.status)))
            }
            DownloadEffect::FetchArchive(file_url) => {
                let bytes = self.api.fetch_archive(&file_url)?;
                let target = self.layout.entity_dir(entity_id);
                let files =
                    unpack_archive(&bytes, &target, &self.layout.entity_partial_dir(entity_id))?;
                info!(
                    "[spending_sync:download] {entity_id} extracted {files} tables to {}",
                    target.display()
                );
                Ok(None)
            }
            DownloadEffect::StampMarker => {
                let now = self.pacer.now();
                write_bytes_atomic(
                    &self.layout.downloaded_marker(entity_id),
                    now.to_rfc3339().as_bytes(),
                )?;
                Ok(None)
            }
            DownloadEffect::ClearPending => {
                remove_if_exists(&self.layout.pending_file(entity_id))?;
                Ok(None)
            }
        }
    }

    /// True when the raw folder exists and was downloaded at or after the cutoff.
    fn is_fresh(&self, entity_id: &str) -> bool {
        if !self.layout.entity_dir(entity_id).is_dir() {
            return false;
        }
        match self.cutoff {
            None => true,
            Some(cutoff) => downloaded_at(self.layout, entity_id) >= cutoff,
        }
    }

    /// Persisted mid-flight job, discarding records that fail to parse.
    fn load_pending(&self, entity_id: &str) -> Result<Option<JobLocations>, SyncError> {
        let path = self.layout.pending_file(entity_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str::<JobLocations>(&raw) {
            Ok(job) if !job.status_url.is_empty() && !job.file_url.is_empty() => Ok(Some(job)),
            Ok(_) => self.discard_pending(entity_id, "empty job locations"),
            Err(err) => self.discard_pending(entity_id, &err.to_string()),
        }
    }

    fn discard_pending(
        &self,
        entity_id: &str,
        reason: &str,
    ) -> Result<Option<JobLocations>, SyncError> {
        let err = SyncError::CorruptState(format!("pending download for {entity_id}: {reason}"));
        warn!("[spending_sync:download] {err}; starting a fresh request");
        remove_if_exists(&self.layout.pending_file(entity_id))?;
        Ok(None)
    }
}

/// When raw data for `entity_id` was last fetched.
///
/// Reads the downloaded marker; without one, falls back to the latest action
/// date in the extracted transaction history, then to the Unix epoch.
pub fn downloaded_at(layout: &DataLayout, entity_id: &str) -> DateTime<Utc> {
    let marker = layout.downloaded_marker(entity_id);
    if let Ok(raw) = fs::read_to_string(&marker)
        && let Ok(stamp) = DateTime::parse_from_rfc3339(raw.trim())
    {
        return stamp.with_timezone(&Utc);
    }
    latest_action_date(layout, entity_id).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn latest_action_date(layout: &DataLayout, entity_id: &str) -> Option<DateTime<Utc>> {
    let dir = layout.entity_dir(entity_id);
    find_tables(&dir, TableTag::TransactionHistory.as_str())
        .iter()
        .filter_map(|path| Table::read(path).ok())
        .flat_map(|table| {
            let column = table.column(ACTION_DATE);
            table
                .rows
                .iter()
                .filter_map(|row| column.and_then(|idx| row.get(idx)))
                .filter_map(|value| parse_action_date(value))
                .collect::<Vec<_>>()
        })
        .max()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix.
pub fn parse_action_date(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
