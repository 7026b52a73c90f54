//! Asynchronous server-side task tracking.
//!
//! PVE runs long operations (clone, create, ...) as server-side tasks and
//! hands back a UPID. There is no push notification; callers poll the task
//! status endpoint until the task stops.

use serde::Deserialize;
use std::fmt;

/// Opaque handle to one asynchronous server-side task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    upid: String,
}

impl TaskHandle {
    pub fn new(upid: impl Into<String>) -> Self {
        Self { upid: upid.into() }
    }

    /// The cluster-assigned UPID string.
    pub fn upid(&self) -> &str {
        &self.upid
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.upid)
    }
}

/// Coarse task state as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Stopped,
}

/// One immutable snapshot of a task, from
/// `/nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub node: String,
    pub pid: u32,
    #[serde(rename = "starttime")]
    pub start_time: u64,
    pub status: TaskState,
    /// Present only once the task has stopped.
    #[serde(default, rename = "exitstatus")]
    pub exit_status: Option<String>,
}

impl TaskStatus {
    /// Returns `true` once the task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status == TaskState::Stopped
    }

    /// Returns `true` if the task stopped and reported success.
    ///
    /// PVE reports success as the literal exit status `OK`; the comparison
    /// is case-insensitive. A stopped task without an exit status counts as
    /// a failure.
    pub fn is_success(&self) -> bool {
        self.is_finished()
            && self
                .exit_status
                .as_deref()
                .is_some_and(|status| status.eq_ignore_ascii_case("ok"))
    }
}
