//! Bounded polling of asynchronous server-side tasks.
//!
//! PVE offers no push notification for task completion, so the poller
//! queries the status endpoint on a timer until the task stops, a budget
//! runs out, or the caller cancels. Transient transport failures are
//! tolerated up to an error budget rather than aborting the poll outright.

use crate::core::domain::error::PveResult;
use crate::core::domain::model::{TaskHandle, TaskState, TaskStatus};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Source of task status snapshots. The lifecycle layer is the production
/// implementation; tests substitute their own.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, handle: &TaskHandle) -> PveResult<TaskStatus>;
}

/// Budgets for one poll run.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Delay between consecutive status queries.
    pub interval: Duration,
    /// Iteration budget; polling stops once the query count exceeds it.
    pub max_iterations: u32,
    /// Error budget; cumulative failed queries beyond it end the run.
    pub max_errors: u32,
}

impl Default for PollerConfig {
    /// One query per second for five minutes, tolerating ten failures.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_iterations: 300,
            max_errors: 10,
        }
    }
}

/// Which budget ran out first. Remediation differs: `Iterations` means the
/// task simply ran long, `Errors` means the cluster kept rejecting status
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExhausted {
    Iterations,
    Errors,
}

/// Terminal outcome of one poll run.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The task stopped with exit status `OK`.
    Succeeded(TaskStatus),
    /// The task stopped with any other exit status, including none at all.
    Failed { exit_status: Option<String> },
    /// A budget ran out before the task reached a terminal state.
    TimedOut { reason: BudgetExhausted },
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Polls exactly one task per invocation. Holds no shared state, so
/// concurrent polls for independent tasks are fully independent.
#[derive(Debug, Clone)]
pub struct TaskPoller {
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    /// Drives the task to a terminal outcome.
    ///
    /// Each tick queries the status endpoint once. A query failure counts
    /// against the error budget and polling continues; a single transient
    /// failure never ends the run.
    pub async fn poll<S>(
        &self,
        source: &S,
        handle: &TaskHandle,
        cancel: &CancellationToken,
    ) -> PollOutcome
    where
        S: TaskStatusSource + ?Sized,
    {
        let mut errors = 0u32;
        let mut iteration = 0u32;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(upid = %handle, iteration, "polling cancelled by caller");
                    return PollOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }
            iteration += 1;

            match source.task_status(handle).await {
                Ok(status) => match status.status {
                    TaskState::Running => {
                        debug!(upid = %handle, iteration, "task still running");
                    }
                    TaskState::Stopped if status.is_success() => {
                        debug!(upid = %handle, iteration, "task completed");
                        return PollOutcome::Succeeded(status);
                    }
                    TaskState::Stopped => {
                        warn!(
                            upid = %handle,
                            iteration,
                            exit_status = status.exit_status.as_deref(),
                            "task stopped unsuccessfully"
                        );
                        return PollOutcome::Failed {
                            exit_status: status.exit_status,
                        };
                    }
                },
                Err(e) => {
                    errors += 1;
                    warn!(
                        upid = %handle,
                        iteration,
                        errors,
                        error = %e,
                        "task status query failed; continuing to poll"
                    );
                    if errors > self.config.max_errors {
                        warn!(upid = %handle, errors, "error budget exhausted");
                        return PollOutcome::TimedOut {
                            reason: BudgetExhausted::Errors,
                        };
                    }
                }
            }

            if iteration > self.config.max_iterations {
                warn!(
                    upid = %handle,
                    iteration,
                    "iteration budget exhausted before the task stopped"
                );
                return PollOutcome::TimedOut {
                    reason: BudgetExhausted::Iterations,
                };
            }
        }
    }
}
