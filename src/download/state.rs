//! Pure per-entity download state machine.
//!
//! `transition` maps `(state, event)` to the next state plus the effects the
//! driver must perform, in order. It performs no IO; the driver in
//! `download::machine` executes effects and feeds their results back as events.

use std::time::Duration;

use crate::api::{JobLocations, JobStatus};

/// Lifecycle of one entity's download job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadState {
    /// No job known.
    Idle,
    /// The service has not registered the job yet. `attempts` counts requests
    /// answered that way.
    Requesting { attempts: u32 },
    /// Job accepted; locations not yet persisted.
    Requested(JobLocations),
    /// Job persisted and being polled. `attempts` counts completed polls.
    Polling { job: JobLocations, attempts: u32 },
    /// Archive fetched and unpacked.
    Finished,
    /// Terminal failure; the reason is kept for logging.
    Failed(String),
}

impl DownloadState {
    /// True for `Finished` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Finished | DownloadState::Failed(_))
    }
}

/// Inputs to the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadEvent {
    /// Begin a fresh job.
    Start,
    /// A persisted mid-flight job was found on startup.
    Resume(JobLocations),
    /// The remote service accepted the job.
    Accepted(JobLocations),
    /// The remote service refused the job.
    Rejected(String),
    /// The remote service answered without job locations or a refusal.
    NotReady,
    /// Locations were written to durable per-entity state.
    Persisted,
    /// A status poll returned.
    Polled(JobStatus),
}

/// Side effects requested by a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadEffect {
    /// Ask the remote service for a new job.
    RequestJob,
    /// Write the job locations to the pending-download file.
    PersistPending(JobLocations),
    /// Sleep before the next poll.
    Wait(Duration),
    /// Poll the status location.
    PollStatus(String),
    /// Fetch the archive and unpack it into the entity's raw folder.
    FetchArchive(String),
    /// Write the downloaded marker with the current time.
    StampMarker,
    /// Delete the pending-download file.
    ClearPending,
}

/// Bounds applied while polling.
#[derive(Clone, Copy, Debug)]
pub struct PollBudget {
    /// Polls (and unanswered job requests) allowed before the job is left pending.
    pub max_attempts: u32,
    /// Sleep between polls and between repeated job requests.
    pub interval: Duration,
}

/// Apply `event` to `state`.
///
/// Events that make no sense in the current state leave it unchanged with no
/// effects, which the driver reads as "nothing more to do this pass".
pub fn transition(
    state: DownloadState,
    event: DownloadEvent,
    budget: PollBudget,
) -> (DownloadState, Vec<DownloadEffect>) {
    use DownloadEffect as Fx;
    use DownloadEvent as Ev;
    use DownloadState as St;

    match (state, event) {
        (St::Idle, Ev::Start) => (St::Idle, vec![Fx::RequestJob]),
        (St::Idle, Ev::Resume(job)) => {
            let poll = Fx::PollStatus(job.status_url.clone());
            (St::Polling { job, attempts: 0 }, vec![poll])
        }
        (St::Idle | St::Requesting { .. }, Ev::Accepted(job)) => {
            let persist = Fx::PersistPending(job.clone());
            (St::Requested(job), vec![persist])
        }
        (St::Idle | St::Requesting { .. }, Ev::Rejected(detail)) => {
            (St::Failed(detail), Vec::new())
        }
        (St::Idle, Ev::NotReady) => request_again(1, budget),
        (St::Requesting { attempts }, Ev::NotReady) => {
            request_again(attempts.saturating_add(1), budget)
        }
        (St::Requested(job), Ev::Persisted) => {
            let poll = Fx::PollStatus(job.status_url.clone());
            (St::Polling { job, attempts: 0 }, vec![poll])
        }
        (St::Polling { job, attempts }, Ev::Polled(status)) => {
            let attempts = attempts.saturating_add(1);
            match status {
                JobStatus::Finished => (
                    St::Finished,
                    vec![
                        Fx::FetchArchive(job.file_url),
                        Fx::StampMarker,
                        Fx::ClearPending,
                    ],
                ),
                JobStatus::Queued | JobStatus::Running if attempts >= budget.max_attempts => {
                    (St::Polling { job, attempts }, Vec::new())
                }
                JobStatus::Queued | JobStatus::Running => {
                    let effects = vec![
                        Fx::Wait(budget.interval),
                        Fx::PollStatus(job.status_url.clone()),
                    ];
                    (St::Polling { job, attempts }, effects)
                }
                JobStatus::Other(status) => (
                    St::Failed(format!("download job ended with status '{status}'")),
                    vec![Fx::ClearPending],
                ),
            }
        }
        (state, _) => (state, Vec::new()),
    }
}

fn request_again(attempts: u32, budget: PollBudget) -> (DownloadState, Vec<DownloadEffect>) {
    let effects = if attempts >= budget.max_attempts {
        Vec::new()
    } else {
        vec![DownloadEffect::Wait(budget.interval), DownloadEffect::RequestJob]
    };
    (DownloadState::Requesting { attempts }, effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobLocations {
        JobLocations {
            status_url: "https://x/status?file_name=a.zip".to_string(),
            file_url: "https://x/files/a.zip".to_string(),
        }
    }

    fn budget(max_attempts: u32) -> PollBudget {
        PollBudget {
            max_attempts,
            interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn fresh_job_requests_persists_then_polls() {
        let (state, effects) = transition(DownloadState::Idle, DownloadEvent::Start, budget(3));
        assert_eq!(state, DownloadState::Idle);
        assert_eq!(effects, vec![DownloadEffect::RequestJob]);

        let (state, effects) = transition(state, DownloadEvent::Accepted(job()), budget(3));
        assert_eq!(state, DownloadState::Requested(job()));
        assert_eq!(effects, vec![DownloadEffect::PersistPending(job())]);

        let (state, effects) = transition(state, DownloadEvent::Persisted, budget(3));
        assert_eq!(
            state,
            DownloadState::Polling {
                job: job(),
                attempts: 0
            }
        );
        assert_eq!(effects, vec![DownloadEffect::PollStatus(job().status_url)]);
    }

    #[test]
    fn rejection_fails_without_effects() {
        let (state, effects) = transition(
            DownloadState::Idle,
            DownloadEvent::Rejected("no such award".to_string()),
            budget(3),
        );
        assert_eq!(state, DownloadState::Failed("no such award".to_string()));
        assert!(effects.is_empty());
        assert!(state.is_terminal());
    }

    #[test]
    fn unregistered_job_is_requested_again_until_budget_is_spent() {
        let (state, effects) = transition(DownloadState::Idle, DownloadEvent::NotReady, budget(3));
        assert_eq!(state, DownloadState::Requesting { attempts: 1 });
        assert_eq!(
            effects,
            vec![
                DownloadEffect::Wait(Duration::from_secs(1)),
                DownloadEffect::RequestJob
            ]
        );

        let (state, effects) = transition(state, DownloadEvent::NotReady, budget(3));
        assert_eq!(state, DownloadState::Requesting { attempts: 2 });
        assert_eq!(effects.len(), 2);

        let (spent, effects) = transition(state.clone(), DownloadEvent::NotReady, budget(3));
        assert_eq!(spent, DownloadState::Requesting { attempts: 3 });
        assert!(effects.is_empty());
        assert!(!spent.is_terminal());

        let (state, effects) = transition(state, DownloadEvent::Accepted(job()), budget(3));
        assert_eq!(state, DownloadState::Requested(job()));
        assert_eq!(effects, vec![DownloadEffect::PersistPending(job())]);
    }

    #[test]
    fn refusal_after_unregistered_request_fails() {
        let (state, effects) = transition(
            DownloadState::Requesting { attempts: 1 },
            DownloadEvent::Rejected("no such award".to_string()),
            budget(3),
        );
        assert_eq!(state, DownloadState::Failed("no such award".to_string()));
        assert!(effects.is_empty());
    }

    #[test]
    fn resume_skips_straight_to_polling() {
        let (state, effects) =
            transition(DownloadState::Idle, DownloadEvent::Resume(job()), budget(3));
        assert!(matches!(state, DownloadState::Polling { attempts: 0, .. }));
        assert_eq!(effects, vec![DownloadEffect::PollStatus(job().status_url)]);
    }

    #[test]
    fn running_polls_wait_until_budget_is_spent() {
        let mut state = DownloadState::Polling {
            job: job(),
            attempts: 0,
        };
        for expected_attempts in 1..3 {
            let (next, effects) =
                transition(state, DownloadEvent::Polled(JobStatus::Running), budget(3));
            assert_eq!(
                effects,
                vec![
                    DownloadEffect::Wait(Duration::from_secs(1)),
                    DownloadEffect::PollStatus(job().status_url)
                ]
            );
            assert!(
                matches!(next, DownloadState::Polling { attempts, .. } if attempts == expected_attempts)
            );
            state = next;
        }
        let (state, effects) =
            transition(state, DownloadEvent::Polled(JobStatus::Queued), budget(3));
        assert!(effects.is_empty());
        assert!(matches!(state, DownloadState::Polling { attempts: 3, .. }));
        assert!(!state.is_terminal());
    }

    #[test]
    fn finished_fetches_stamps_and_clears_in_order() {
        let polling = DownloadState::Polling {
            job: job(),
            attempts: 1,
        };
        let (state, effects) =
            transition(polling, DownloadEvent::Polled(JobStatus::Finished), budget(3));
        assert_eq!(state, DownloadState::Finished);
        assert_eq!(
            effects,
            vec![
                DownloadEffect::FetchArchive(job().file_url),
                DownloadEffect::StampMarker,
                DownloadEffect::ClearPending,
            ]
        );
    }

    #[test]
    fn unknown_status_fails_and_clears_pending() {
        let polling = DownloadState::Polling {
            job: job(),
            attempts: 0,
        };
        let (state, effects) = transition(
            polling,
            DownloadEvent::Polled(JobStatus::Other("failed".to_string())),
            budget(3),
        );
        assert!(matches!(state, DownloadState::Failed(reason) if reason.contains("failed")));
        assert_eq!(effects, vec![DownloadEffect::ClearPending]);
    }

    #[test]
    fn unexpected_events_are_ignored() {
        let (state, effects) = transition(
            DownloadState::Finished,
            DownloadEvent::Polled(JobStatus::Running),
            budget(3),
        );
        assert_eq!(state, DownloadState::Finished);
        assert!(effects.is_empty());
    }
}
