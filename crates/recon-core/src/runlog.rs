use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventStatus, RunId};

/// One entry of the run log. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub status: EventStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl RunEvent {
    pub fn new(action: impl Into<String>, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// Null and empty-object details are dropped.
    pub fn with_detail(mut self, detail: Value) -> Self {
        let keep = match &detail {
            Value::Null => false,
            Value::Object(m) => !m.is_empty(),
            _ => true,
        };
        self.detail = keep.then_some(detail);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Append-only, in-memory event sequence for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunLog {
    run_id: RunId,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    events: Vec<RunEvent>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self::starting_at(RunId::new(), Utc::now())
    }

    pub fn starting_at(run_id: RunId, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            events: Vec::new(),
        }
    }

    /// The only way events enter the log. Echoed through `tracing`; never
    /// touches the report destination.
    pub fn append(&mut self, event: RunEvent) {
        match event.status {
            EventStatus::Error => {
                tracing::error!(action = %event.action, status = %event.status, "{}", event.message)
            }
            EventStatus::Warning => {
                tracing::warn!(action = %event.action, status = %event.status, "{}", event.message)
            }
            _ => tracing::info!(action = %event.action, status = %event.status, "{}", event.message),
        }
        self.events.push(event);
    }

    pub fn record(&mut self, action: impl Into<String>, status: EventStatus, message: impl Into<String>) {
        self.append(RunEvent::new(action, status, message));
    }

    pub fn record_detail(
        &mut self,
        action: impl Into<String>,
        status: EventStatus,
        message: impl Into<String>,
        detail: Value,
    ) {
        self.append(RunEvent::new(action, status, message).with_detail(detail));
    }

    /// Stamp the end of the run. Later calls keep the first stamp.
    pub fn finish(&mut self) {
        self.finish_at(Utc::now());
    }

    pub fn finish_at(&mut self, at: DateTime<Utc>) {
        self.finished_at.get_or_insert(at);
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// End of the run: the finish stamp, else the last event, else the start.
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.finished_at
            .or_else(|| self.events.last().map(|e| e.timestamp))
            .unwrap_or(self.started_at)
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, status: EventStatus) -> usize {
        self.events.iter().filter(|e| e.status == status).count()
    }

    pub fn counts(&self) -> BTreeMap<EventStatus, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.events {
            *counts.entry(e.status).or_insert(0) += 1;
        }
        counts
    }
}
