//! Drives one task at a time through PROBING -> PLANNING -> EXECUTING /
//! REMEDIATING into a terminal state, appending every decision to the run log.

use std::time::Duration;

use recon_core::{
    diff, identity_of, AbortReason, ActionOutcome, Bindings, Checklist, Classification, EventStatus, ItemResult,
    PlannedEffect, RunLog, Snapshot, TaskState, TaskSummary,
};
use recon_remediation::{plan, DeniedItem, PlanContext, RemediationPlan};
use recon_transport::Transport;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::action::Action;
use crate::cancel::CancelFlag;
use crate::probe::{discover, read_catalog, run_query, Discovery, Probe, ProbeOutcome};
use crate::task::{CatalogSpec, DiscoverSpec, QuerySpec, TaskSpec};

#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Simulate every action instead of sending it.
    pub dry_run: bool,
    /// Log a SIMULATED event per checklist item when the probe itself is denied.
    pub simulate_on_denied: bool,
    pub inter_action_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            simulate_on_denied: true,
            inter_action_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskReport {
    pub summary: TaskSummary,
    pub plans: Vec<RemediationPlan>,
}

#[derive(Clone, Debug, Default)]
pub struct RunOutcome {
    pub tasks: Vec<TaskReport>,
    pub preflight_failed: bool,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn summaries(&self) -> Vec<TaskSummary> {
        self.tasks.iter().map(|t| t.summary.clone()).collect()
    }

    pub fn plans(&self) -> Vec<RemediationPlan> {
        self.tasks.iter().flat_map(|t| t.plans.iter().cloned()).collect()
    }

    pub fn has_fatal(&self) -> bool {
        self.preflight_failed || self.tasks.iter().any(|t| t.summary.is_fatal())
    }

    /// 130 when cancelled, 1 on a fatal abort, else 0.
    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            130
        } else if self.has_fatal() {
            1
        } else {
            0
        }
    }
}

pub struct Reconciler<'a> {
    transport: &'a dyn Transport,
    options: RunOptions,
    cancel: CancelFlag,
}

impl<'a> Reconciler<'a> {
    pub fn new(transport: &'a dyn Transport, options: RunOptions) -> Self {
        Self {
            transport,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Preflight, then every task in order. Never panics on remote failure;
    /// everything ends up in `log` and the returned outcome.
    pub async fn run(&self, preflight: Option<&QuerySpec>, tasks: &[TaskSpec], log: &mut RunLog) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        if let Some(p) = preflight {
            if !self.preflight(p, log).await {
                outcome.preflight_failed = true;
                return outcome;
            }
        }
        for (i, task) in tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log.record(
                    "Run",
                    EventStatus::Warning,
                    format!("cancelled; {} task(s) not attempted", tasks.len() - i),
                );
                outcome.cancelled = true;
                break;
            }
            outcome.tasks.push(self.reconcile(task, log).await);
        }
        outcome
    }

    /// Returns false when the run must stop.
    pub async fn preflight(&self, spec: &QuerySpec, log: &mut RunLog) -> bool {
        log.record(&spec.label, EventStatus::Running, format!("connecting to {}", self.transport.endpoint()));
        match run_query(self.transport, spec).await {
            Err(e) => {
                log.record(&spec.label, EventStatus::Error, format!("preflight failed: {e}"));
                false
            }
            Ok(Classification::Failed(m)) => {
                log.record_detail(
                    &spec.label,
                    EventStatus::Error,
                    format!("preflight failed: {}", m.join("; ")),
                    json!({ "errors": m }),
                );
                false
            }
            Ok(Classification::Denied(m)) => {
                log.record_detail(
                    &spec.label,
                    EventStatus::Warning,
                    "preflight query denied; continuing",
                    json!({ "errors": m }),
                );
                true
            }
            Ok(Classification::Empty) => {
                log.record(&spec.label, EventStatus::Warning, "preflight returned no data; continuing");
                true
            }
            Ok(Classification::Ok(data)) => {
                log.record_detail(
                    &spec.label,
                    EventStatus::Success,
                    format!("connected to {}", self.transport.endpoint()),
                    data,
                );
                true
            }
        }
    }

    pub async fn reconcile(&self, task: &TaskSpec, log: &mut RunLog) -> TaskReport {
        let checklist = task.checklist();
        let mut bindings = task.context_bindings();
        let intro = if task.description.is_empty() {
            format!("{} required {}(s)", checklist.len(), checklist.kind)
        } else {
            task.description.clone()
        };
        log.record(&task.name, EventStatus::Started, intro);

        for d in &task.discover {
            self.discover(d, &mut bindings, log).await;
        }
        if let Some(c) = &task.catalog {
            self.check_catalog(c, &checklist, log).await;
        }

        let mut summary = TaskSummary::new(&task.name, TaskState::Probing);
        let label = &task.probe.label;
        log.record(label, EventStatus::Running, format!("reading {} records", checklist.kind));

        let snapshot = match Probe::new(&task.probe).run(self.transport).await {
            Err(e) => {
                log.record_detail(
                    label,
                    EventStatus::Error,
                    format!("transport failure: {e}"),
                    json!({ "status": e.status_code() }),
                );
                return self.abort(summary, AbortReason::Transport, log);
            }
            Ok(ProbeOutcome::Failed(m)) => {
                log.record_detail(label, EventStatus::Error, m.join("; "), json!({ "errors": m }));
                return self.abort(summary, AbortReason::ProbeFailed, log);
            }
            Ok(ProbeOutcome::Empty) => {
                log.record(label, EventStatus::Warning, "probe returned no data; nothing to reconcile");
                return self.abort(summary, AbortReason::NothingToReconcile, log);
            }
            Ok(ProbeOutcome::Denied(m)) => {
                log.record_detail(
                    label,
                    EventStatus::Warning,
                    format!("access denied: {}", m.join("; ")),
                    json!({ "errors": m }),
                );
                return self.probe_denied(task, &checklist, m, &bindings, summary, log).await;
            }
            Ok(ProbeOutcome::Snapshot(s)) => s,
        };

        self.log_inventory(task, &checklist, &snapshot, log);

        self.transition(&mut summary, TaskState::Planning);
        let gap = diff(&snapshot, &checklist);
        log.record_detail(
            "Gap Analysis",
            EventStatus::Info,
            format!(
                "{}: {} present, {} missing, {} extra",
                task.name,
                gap.present.len(),
                gap.missing.len(),
                gap.extra.len()
            ),
            json!({ "missing": gap.missing }),
        );
        let missing = gap.missing.clone();
        summary.gap = Some(gap);

        if missing.is_empty() {
            log.record(
                &task.name,
                EventStatus::Success,
                format!("all {} required {}(s) present", checklist.len(), checklist.kind),
            );
            return self.finish(summary, TaskState::Satisfied, vec![], log);
        }

        self.transition(&mut summary, TaskState::Executing);
        let Some(spec) = &task.action else {
            for item in &missing {
                log.record(&task.name, EventStatus::Warning, format!("`{item}` is missing and no action is configured"));
            }
            let reasons = vec![format!("no action is configured to create missing {}(s)", checklist.kind)];
            let denied: Vec<(String, Vec<String>)> = missing.iter().map(|i| (i.clone(), reasons.clone())).collect();
            let plans = self.remediate(task, &denied, &bindings, &mut summary, log);
            return self.finish(summary, TaskState::Instructed, plans, log);
        };

        let action = Action::new(spec);
        let mut transport_failed = false;
        for (i, item) in missing.iter().enumerate() {
            if i > 0 {
                self.pace().await;
            }
            let outcome = if self.options.dry_run {
                action.simulate(item, &bindings)
            } else {
                match action.attempt(self.transport, item, &bindings).await {
                    Ok(o) => o,
                    Err(e) => {
                        log.record_detail(
                            &spec.label,
                            EventStatus::Error,
                            format!("`{item}`: transport failure: {e}"),
                            json!({ "status": e.status_code() }),
                        );
                        transport_failed = true;
                        break;
                    }
                }
            };
            log_outcome(log, &spec.label, item, &outcome);
            summary.items.push(ItemResult {
                item: item.clone(),
                outcome,
            });
        }

        let denied: Vec<(String, Vec<String>)> = summary
            .items
            .iter()
            .filter_map(|r| match &r.outcome {
                ActionOutcome::Denied(m) => Some((r.item.clone(), m.clone())),
                _ => None,
            })
            .collect();
        let plans = if denied.is_empty() {
            vec![]
        } else {
            self.remediate(task, &denied, &bindings, &mut summary, log)
        };

        if transport_failed {
            return self.abort_with(summary, AbortReason::Transport, plans, log);
        }
        let state = if self.options.dry_run {
            TaskState::Simulated
        } else if summary.items.iter().any(|r| r.outcome.is_failed()) {
            // failures outrank denials; plans for the denied items are still returned
            TaskState::Partial
        } else if !denied.is_empty() {
            TaskState::Instructed
        } else {
            TaskState::Satisfied
        };
        self.finish(summary, state, plans, log)
    }

    async fn probe_denied(
        &self,
        task: &TaskSpec,
        checklist: &Checklist,
        reasons: Vec<String>,
        bindings: &Bindings,
        mut summary: TaskSummary,
        log: &mut RunLog,
    ) -> TaskReport {
        if self.options.simulate_on_denied {
            for (i, item) in checklist.items().iter().enumerate() {
                if i > 0 {
                    self.pace().await;
                }
                let effect = match &task.action {
                    Some(spec) => Action::new(spec).simulate(item, bindings),
                    None => ActionOutcome::Simulated(PlannedEffect {
                        operation: String::new(),
                        variables: json!({}),
                        description: format!("would ensure {} `{item}`", checklist.kind),
                    }),
                };
                log_outcome(log, &task.probe.label, item, &effect);
                summary.items.push(ItemResult {
                    item: item.clone(),
                    outcome: effect,
                });
            }
        }
        let denied: Vec<(String, Vec<String>)> =
            checklist.items().iter().map(|i| (i.clone(), reasons.clone())).collect();
        let plans = self.remediate(task, &denied, bindings, &mut summary, log);
        self.finish(summary, TaskState::Instructed, plans, log)
    }

    fn remediate(
        &self,
        task: &TaskSpec,
        denied: &[(String, Vec<String>)],
        bindings: &Bindings,
        summary: &mut TaskSummary,
        log: &mut RunLog,
    ) -> Vec<RemediationPlan> {
        self.transition(summary, TaskState::Remediating);
        let action_name = task.action.as_ref().map_or_else(|| task.name.clone(), |a| a.label.clone());
        let ctx = PlanContext {
            template: task.remediation.as_ref(),
            bindings,
            action_operation: task.action.as_ref().map(|a| a.operation.as_str()),
            action_variables: task.action.as_ref().map(|a| &a.variables),
            action_privileged: task.action.as_ref().map_or(false, |a| a.privileged),
        };

        let groups: Vec<DeniedItem> = if task.remediation.is_some() {
            let mut reasons: Vec<String> = Vec::new();
            for (_, rs) in denied {
                for r in rs {
                    if !reasons.contains(r) {
                        reasons.push(r.clone());
                    }
                }
            }
            vec![DeniedItem {
                task: task.name.clone(),
                action: action_name,
                items: denied.iter().map(|(i, _)| i.clone()).collect(),
                reasons,
            }]
        } else {
            denied
                .iter()
                .map(|(item, rs)| DeniedItem {
                    task: task.name.clone(),
                    action: action_name.clone(),
                    items: vec![item.clone()],
                    reasons: rs.clone(),
                })
                .collect()
        };

        let plans: Vec<RemediationPlan> = groups.iter().map(|d| plan(d, &ctx)).collect();
        for p in &plans {
            log.record_detail(
                "Remediation",
                EventStatus::Info,
                format!("{}: manual action needed for {}", p.task, p.denied_items.join(", ")),
                json!({
                    "operation": p.mutation.operation_name,
                    "placeholders": p.mutation.placeholders,
                }),
            );
            for (i, step) in p.human_steps.iter().enumerate() {
                log.record(format!("Step {}", i + 1), EventStatus::Info, step.clone());
            }
        }
        plans
    }

    async fn discover(&self, spec: &DiscoverSpec, bindings: &mut Bindings, log: &mut RunLog) {
        log.record(&spec.label, EventStatus::Running, format!("resolving `{}`", spec.name));
        match discover(self.transport, spec).await {
            Ok(Discovery::Found { value, candidates }) => {
                let mut detail = Map::new();
                detail.insert(spec.name.clone(), value.clone());
                log.record_detail(
                    &spec.label,
                    EventStatus::Success,
                    format!("resolved `{}` from {candidates} candidate(s)", spec.name),
                    Value::Object(detail),
                );
                bindings.set(spec.name.clone(), value);
            }
            Ok(Discovery::NotFound { candidates }) => log.record(
                &spec.label,
                EventStatus::Warning,
                format!("no match for `{}` among {candidates} candidate(s)", spec.name),
            ),
            Ok(Discovery::Refused(Classification::Denied(m))) => log.record_detail(
                &spec.label,
                EventStatus::Warning,
                format!("cannot resolve `{}`: access denied", spec.name),
                json!({ "errors": m }),
            ),
            Ok(Discovery::Refused(Classification::Failed(m))) => log.record_detail(
                &spec.label,
                EventStatus::Error,
                format!("cannot resolve `{}`: {}", spec.name, m.join("; ")),
                json!({ "errors": m }),
            ),
            Ok(Discovery::Refused(_)) => log.record(
                &spec.label,
                EventStatus::Warning,
                format!("cannot resolve `{}`: reply carried no data", spec.name),
            ),
            Err(e) => log.record(&spec.label, EventStatus::Error, format!("transport failure: {e}")),
        }
    }

    async fn check_catalog(&self, spec: &CatalogSpec, checklist: &Checklist, log: &mut RunLog) {
        log.record(&spec.label, EventStatus::Running, "reading catalog");
        match read_catalog(self.transport, spec).await {
            Ok(Ok(offered)) => {
                log.record(&spec.label, EventStatus::Success, format!("{} entries offered", offered.len()));
                for item in checklist.items() {
                    if offered.iter().any(|o| o == item) {
                        log.record(&spec.label, EventStatus::Success, format!("`{item}` is available"));
                    } else {
                        log.record(&spec.label, EventStatus::Warning, format!("`{item}` is not offered by the endpoint"));
                    }
                }
            }
            Ok(Err(c)) => log.record(
                &spec.label,
                EventStatus::Warning,
                format!("catalog unavailable ({}); continuing", c.label()),
            ),
            Err(e) => log.record(&spec.label, EventStatus::Warning, format!("catalog unavailable: {e}; continuing")),
        }
    }

    fn log_inventory(&self, task: &TaskSpec, checklist: &Checklist, snapshot: &Snapshot, log: &mut RunLog) {
        let records = snapshot.records(&checklist.kind);
        for r in records {
            let Some(id) = identity_of(r, &checklist.identity_field) else {
                continue;
            };
            let label = task
                .probe
                .label_field
                .as_deref()
                .and_then(|f| r.get(f))
                .and_then(|v| v.as_str());
            let message = match label {
                Some(l) => format!("`{id}` - {l}"),
                None => format!("`{id}`"),
            };
            log.record(&checklist.kind, EventStatus::Info, message);
        }
        log.record(
            &task.probe.label,
            EventStatus::Success,
            format!("found {} {} record(s)", records.len(), checklist.kind),
        );
    }

    async fn pace(&self) {
        if !self.options.inter_action_delay.is_zero() {
            tokio::time::sleep(self.options.inter_action_delay).await;
        }
    }

    fn transition(&self, summary: &mut TaskSummary, to: TaskState) {
        debug!(task = %summary.task, from = %summary.state, to = %to, "task state");
        summary.state = to;
    }

    fn abort(&self, summary: TaskSummary, reason: AbortReason, log: &mut RunLog) -> TaskReport {
        self.abort_with(summary, reason, vec![], log)
    }

    fn abort_with(
        &self,
        mut summary: TaskSummary,
        reason: AbortReason,
        plans: Vec<RemediationPlan>,
        log: &mut RunLog,
    ) -> TaskReport {
        summary.abort_reason = Some(reason);
        self.finish(summary, TaskState::Aborted, plans, log)
    }

    fn finish(&self, mut summary: TaskSummary, state: TaskState, plans: Vec<RemediationPlan>, log: &mut RunLog) -> TaskReport {
        self.transition(&mut summary, state);
        log.record(&summary.task, EventStatus::Info, format!("task finished: {state}"));
        TaskReport { summary, plans }
    }
}

fn log_outcome(log: &mut RunLog, action: &str, item: &str, outcome: &ActionOutcome) {
    let status = outcome.status();
    match outcome {
        ActionOutcome::Executed(payload) => {
            log.record_detail(action, status, format!("`{item}` done"), payload.clone())
        }
        ActionOutcome::Denied(m) => log.record_detail(
            action,
            status,
            format!("`{item}` denied: {}", m.join("; ")),
            json!({ "errors": m }),
        ),
        ActionOutcome::Failed(m) => log.record_detail(
            action,
            status,
            format!("`{item}` failed: {}", m.join("; ")),
            json!({ "errors": m }),
        ),
        ActionOutcome::Simulated(effect) => log.record_detail(
            action,
            status,
            effect.description.clone(),
            json!({ "operation": effect.operation, "variables": effect.variables }),
        ),
    }
}
