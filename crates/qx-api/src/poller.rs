//! Bounded wait for a submitted execution.
//!
//! Once a submission comes back without a terminal status, the poller
//! re-fetches the execution up to `timeout` times, sleeping a fixed interval
//! between fetches. A timeout of zero skips polling entirely. Running out of
//! attempts is an ordinary outcome, not an error; fetch failures propagate.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::QxResult;
use crate::execution::{ExecutionResult, fetch_result};
use crate::transport::TransportClient;

/// Progress of one wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Execution being waited on.
    pub job_id: String,
    /// Fetches allowed.
    pub max_attempts: u32,
    /// Fetches made so far.
    pub elapsed_attempts: u32,
}

impl PollState {
    fn exhausted(&self) -> bool {
        self.elapsed_attempts >= self.max_attempts
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A non-empty result arrived.
    Completed {
        result: ExecutionResult,
        attempts: u32,
    },
    /// Every fetch came back empty.
    TimedOut { attempts: u32 },
    /// Zero timeout; nothing was fetched.
    Skipped,
}

impl PollOutcome {
    /// Fetches performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts, .. } | Self::TimedOut { attempts } => *attempts,
            Self::Skipped => 0,
        }
    }
}

/// Turns a running execution into a bounded blocking wait.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPoller {
    interval: Duration,
}

impl Default for ExecutionPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ExecutionPoller {
    /// Create a poller sleeping `interval` between fetches.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Pause between fetches.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for `job_id` to produce a result, fetching at most `timeout` times.
    ///
    /// Completion is decided by the presence of `result.data` alone. An
    /// execution that reports `ERROR` without a result keeps being polled
    /// and ends as [`PollOutcome::TimedOut`].
    pub fn wait(
        &self,
        transport: &mut TransportClient,
        job_id: &str,
        timeout: u32,
    ) -> QxResult<PollOutcome> {
        if timeout == 0 {
            debug!("zero timeout, not polling execution {job_id}");
            return Ok(PollOutcome::Skipped);
        }

        let mut state = PollState {
            job_id: job_id.to_string(),
            max_attempts: timeout,
            elapsed_attempts: 0,
        };

        loop {
            state.elapsed_attempts += 1;
            debug!(
                attempt = state.elapsed_attempts,
                max_attempts = state.max_attempts,
                "waiting for results of execution {}",
                state.job_id
            );

            let result = fetch_result(transport, &state.job_id)?;
            if !result.is_empty() {
                info!(
                    "execution {} finished after {} polls",
                    state.job_id, state.elapsed_attempts
                );
                return Ok(PollOutcome::Completed {
                    result,
                    attempts: state.elapsed_attempts,
                });
            }

            if state.exhausted() {
                info!(
                    "execution {} still running after {} polls",
                    state.job_id, state.elapsed_attempts
                );
                return Ok(PollOutcome::TimedOut {
                    attempts: state.elapsed_attempts,
                });
            }

            thread::sleep(self.interval);
        }
    }
}
