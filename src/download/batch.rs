//! Batch downloader: sweeps the per-entity state machine over the whole index.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::clock::Pacer;
use crate::download::machine::{DownloadMachine, DownloadOutcome};
use crate::errors::SyncError;
use crate::types::EntityId;

/// Final partition of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Fetched and unpacked during this run.
    pub finished: Vec<EntityId>,
    /// Already fresh on disk; no network calls made.
    pub skipped: Vec<EntityId>,
    /// Remote rejected the job or reported an unknown terminal status.
    pub failed: Vec<(EntityId, String)>,
    /// Non-transient errors skipped because `stop_on_errors` was off.
    pub errored: Vec<(EntityId, String)>,
    /// Number of sweeps over the pending list.
    pub sweeps: usize,
}

impl BatchReport {
    /// Entities that now have raw data on disk.
    pub fn complete(&self) -> impl Iterator<Item = &EntityId> {
        self.finished.iter().chain(self.skipped.iter())
    }
}

/// Options controlling a batch run.
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Entities driven per chunk.
    pub chunk_size: usize,
    /// Pause applied to the whole batch after a transient failure.
    pub transient_cooldown: Duration,
    /// Abort on the first non-transient error instead of logging and skipping it.
    pub stop_on_errors: bool,
}

/// Drives `machine` over `entity_ids` until nothing is pending.
///
/// Entities are processed in index order within chunks, chunks in order.
/// Pending jobs and transient failures are carried into the next sweep;
/// cancellation always propagates.
pub fn download_all(
    machine: &DownloadMachine<'_>,
    pacer: &Pacer,
    entity_ids: &[EntityId],
    options: BatchOptions,
) -> Result<BatchReport, SyncError> {
    let mut report = BatchReport::default();
    let mut queue: Vec<EntityId> = entity_ids.to_vec();
    let total = queue.len();
    let chunk_size = options.chunk_size.max(1);

    while !queue.is_empty() {
        pacer.checkpoint()?;
        report.sweeps += 1;
        info!(
            "[spending_sync:batch] sweep {} over {} of {} entities",
            report.sweeps,
            queue.len(),
            total
        );
        let mut carried = Vec::new();
        let mut position = 0usize;
        for chunk in queue.chunks(chunk_size) {
            for entity_id in chunk {
                position += 1;
                info!(
                    "[spending_sync:batch] {}/{} {}",
                    position,
                    queue.len(),
                    entity_id
                );
                match machine.run(entity_id) {
                    Ok(DownloadOutcome::Finished) => report.finished.push(entity_id.clone()),
                    Ok(DownloadOutcome::Skipped) => report.skipped.push(entity_id.clone()),
                    Ok(DownloadOutcome::Failed(reason)) => {
                        report.failed.push((entity_id.clone(), reason))
                    }
                    Ok(DownloadOutcome::Pending) => carried.push(entity_id.clone()),
                    Err(err) if err.is_cancelled() => return Err(err),
                    Err(err) if err.is_transient() => {
                        warn!(
                            "[spending_sync:batch] {entity_id} transient failure: {err}; cooling down {}s",
                            options.transient_cooldown.as_secs()
                        );
                        carried.push(entity_id.clone());
                        pacer.wait(options.transient_cooldown)?;
                    }
                    Err(err) if options.stop_on_errors => {
                        error!("[spending_sync:batch] {entity_id} aborting run: {err}");
                        return Err(err);
                    }
                    Err(err) => {
                        error!("[spending_sync:batch] {entity_id} skipped: {err}");
                        report.errored.push((entity_id.clone(), err.to_string()));
                    }
                }
            }
        }
        queue = carried;
    }

    info!(
        "[spending_sync:batch] done: finished={} skipped={} failed={} errored={} sweeps={}",
        report.finished.len(),
        report.skipped.len(),
        report.failed.len(),
        report.errored.len(),
        report.sweeps
    );
    Ok(report)
}
