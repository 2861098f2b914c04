use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use recon_core::{EventStatus, RunEvent, RunId, RunLog, RunSummary, TaskSummary};
use recon_remediation::RemediationPlan;
use serde::{Deserialize, Serialize};

/// Machine-readable record of a whole run (`events.json`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventManifest {
    pub run_id: RunId,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: BTreeMap<EventStatus, usize>,
    pub success_rate: f64,
    pub tasks: Vec<TaskSummary>,
    #[serde(default)]
    pub remediation: Vec<RemediationPlan>,
    pub events: Vec<RunEvent>,
}

impl EventManifest {
    pub fn from_run(title: &str, log: &RunLog, tasks: &[TaskSummary], plans: &[RemediationPlan]) -> Self {
        let summary = RunSummary::from_events(log.events());
        Self {
            run_id: log.run_id().clone(),
            title: title.to_string(),
            started_at: log.started_at(),
            finished_at: log.ended_at(),
            success_rate: summary.success_rate(),
            counts: summary.counts,
            tasks: tasks.to_vec(),
            remediation: plans.to_vec(),
            events: log.events().to_vec(),
        }
    }
}
