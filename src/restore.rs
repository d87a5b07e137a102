//! Restore of purged files before download.
//!
//! A restore runs as a small state machine:
//! `NotNeeded` or `Submitted -> Polling -> {Ready, Expired, TimedOut}`.
//! Waiting goes through [`Clock`] so tests can replay status sequences
//! without sleeping.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::client::ArchiveClient;
use crate::domain::RestoreStatus;
use crate::error::FetchError;
use crate::manifest::SelectionMap;

pub trait Clock {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreState {
    NotNeeded,
    Submitted {
        status_url: String,
    },
    Polling {
        status_url: String,
        waited: Duration,
        polls: u32,
    },
    Ready {
        status_url: String,
        waited: Duration,
        polls: u32,
    },
    Expired {
        status_url: String,
    },
    TimedOut {
        status_url: String,
        waited: Duration,
    },
}

impl RestoreState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RestoreState::Submitted { .. } | RestoreState::Polling { .. }
        )
    }
}

/// Successful end of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "restore", rename_all = "snake_case")]
pub enum RestoreOutcome {
    NotNeeded,
    Ready {
        status_url: String,
        polls: u32,
        waited_secs: u64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RestoreCoordinator {
    poll_interval: Duration,
    max_wait: Duration,
}

impl RestoreCoordinator {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Submits a restore for `purged` (if any) and waits until it settles.
    pub fn ensure_restored<C, K>(
        &self,
        client: &C,
        clock: &K,
        purged: &SelectionMap,
    ) -> Result<RestoreOutcome, FetchError>
    where
        C: ArchiveClient + ?Sized,
        K: Clock + ?Sized,
    {
        let mut state = self.submit(client, purged)?;
        while !state.is_terminal() {
            state = self.step(client, clock, state)?;
        }
        self.finish(state)
    }

    pub fn submit<C>(&self, client: &C, purged: &SelectionMap) -> Result<RestoreState, FetchError>
    where
        C: ArchiveClient + ?Sized,
    {
        if purged.is_empty() {
            info!("no purged files selected; skipping restore");
            return Ok(RestoreState::NotNeeded);
        }
        info!(files = purged.file_count(), "requesting restore of purged files");
        let status_url = client.request_restore(purged)?;
        info!(status_url = %status_url, "restore submitted");
        Ok(RestoreState::Submitted { status_url })
    }

    /// Advances one transition. Terminal states are returned unchanged.
    pub fn step<C, K>(
        &self,
        client: &C,
        clock: &K,
        state: RestoreState,
    ) -> Result<RestoreState, FetchError>
    where
        C: ArchiveClient + ?Sized,
        K: Clock + ?Sized,
    {
        match state {
            RestoreState::Submitted { status_url } => Ok(RestoreState::Polling {
                status_url,
                waited: Duration::ZERO,
                polls: 0,
            }),
            RestoreState::Polling {
                status_url,
                waited,
                polls,
            } => {
                let raw = client.restore_status(&status_url)?;
                let polls = polls + 1;
                let status = RestoreStatus::classify(&raw);
                debug!(status = %raw, polls, waited_secs = waited.as_secs(), "restore status");
                match status {
                    RestoreStatus::Ready => Ok(RestoreState::Ready {
                        status_url,
                        waited,
                        polls,
                    }),
                    RestoreStatus::Expired => Ok(RestoreState::Expired { status_url }),
                    RestoreStatus::Pending => {
                        clock.sleep(self.poll_interval);
                        let waited = waited + self.poll_interval;
                        if waited >= self.max_wait {
                            Ok(RestoreState::TimedOut { status_url, waited })
                        } else {
                            Ok(RestoreState::Polling {
                                status_url,
                                waited,
                                polls,
                            })
                        }
                    }
                }
            }
            terminal => Ok(terminal),
        }
    }

    fn finish(&self, state: RestoreState) -> Result<RestoreOutcome, FetchError> {
        match state {
            RestoreState::NotNeeded => Ok(RestoreOutcome::NotNeeded),
            RestoreState::Ready {
                status_url,
                waited,
                polls,
            } => {
                info!(polls, "restore ready");
                Ok(RestoreOutcome::Ready {
                    status_url,
                    polls,
                    waited_secs: waited.as_secs(),
                })
            }
            RestoreState::Expired { status_url } => Err(FetchError::RestoreExpired { status_url }),
            RestoreState::TimedOut { waited, .. } => Err(FetchError::RestoreTimeout {
                waited_secs: waited.as_secs(),
                max_wait_secs: self.max_wait.as_secs(),
            }),
            RestoreState::Submitted { .. } | RestoreState::Polling { .. } => Err(
                FetchError::Protocol("restore finished in a non-terminal state".to_string()),
            ),
        }
    }
}
