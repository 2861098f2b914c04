use std::fmt;

use serde::{Deserialize, Serialize};

/// Status tag carried by every run event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Started,
    Running,
    Success,
    Warning,
    Error,
    Simulated,
    Info,
}

impl EventStatus {
    pub const ALL: [EventStatus; 7] = [
        EventStatus::Started,
        EventStatus::Running,
        EventStatus::Success,
        EventStatus::Warning,
        EventStatus::Error,
        EventStatus::Simulated,
        EventStatus::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Started => "STARTED",
            EventStatus::Running => "RUNNING",
            EventStatus::Success => "SUCCESS",
            EventStatus::Warning => "WARNING",
            EventStatus::Error => "ERROR",
            EventStatus::Simulated => "SIMULATED",
            EventStatus::Info => "INFO",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciler states for one task. The last five are terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Probing,
    Planning,
    Executing,
    Remediating,
    Satisfied,
    Partial,
    Instructed,
    Simulated,
    Aborted,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Satisfied
                | TaskState::Partial
                | TaskState::Instructed
                | TaskState::Simulated
                | TaskState::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Probing => "PROBING",
            TaskState::Planning => "PLANNING",
            TaskState::Executing => "EXECUTING",
            TaskState::Remediating => "REMEDIATING",
            TaskState::Satisfied => "SATISFIED",
            TaskState::Partial => "PARTIAL",
            TaskState::Instructed => "INSTRUCTED",
            TaskState::Simulated => "SIMULATED",
            TaskState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task stopped in `Aborted`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Network failure, timeout or non-2xx reply.
    Transport,
    /// The probe came back with application errors unrelated to permissions.
    ProbeFailed,
    /// The probe was well-formed but carried no data; nothing to reconcile.
    NothingToReconcile,
}

impl AbortReason {
    /// Fatal aborts make the process exit non-zero.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AbortReason::NothingToReconcile)
    }
}
