use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AbortReason, Classification, EventStatus, GapResult, TaskState};

/// What a simulated action would have done.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedEffect {
    pub operation: String,
    pub variables: Value,
    pub description: String,
}

/// Result of one action attempt. Exactly one per invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed(Value),
    Denied(Vec<String>),
    Failed(Vec<String>),
    Simulated(PlannedEffect),
}

impl ActionOutcome {
    pub fn from_classification(c: Classification) -> Self {
        match c {
            Classification::Ok(v) => ActionOutcome::Executed(v),
            Classification::Denied(m) => ActionOutcome::Denied(m),
            Classification::Failed(m) => ActionOutcome::Failed(m),
            Classification::Empty => ActionOutcome::Failed(vec!["reply carried no data".into()]),
        }
    }

    pub fn status(&self) -> EventStatus {
        match self {
            ActionOutcome::Executed(_) => EventStatus::Success,
            ActionOutcome::Denied(_) => EventStatus::Warning,
            ActionOutcome::Failed(_) => EventStatus::Error,
            ActionOutcome::Simulated(_) => EventStatus::Simulated,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, ActionOutcome::Denied(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item: String,
    pub outcome: ActionOutcome,
}

/// Where one task ended up and how it got there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<GapResult>,
    #[serde(default)]
    pub items: Vec<ItemResult>,
}

impl TaskSummary {
    pub fn new(task: impl Into<String>, state: TaskState) -> Self {
        Self {
            task: task.into(),
            state,
            abort_reason: None,
            gap: None,
            items: vec![],
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.state == TaskState::Aborted && self.abort_reason.map_or(true, |r| r.is_fatal())
    }

    pub fn denied_items(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|r| r.outcome.is_denied())
            .map(|r| r.item.clone())
            .collect()
    }
}
