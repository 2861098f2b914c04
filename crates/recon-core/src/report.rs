use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};

use crate::{EventStatus, RunEvent, RunLog, TaskSummary};

const STAMP: &str = "%Y-%m-%d %H:%M:%S";

/// `successes / (successes + errors) * 100`, or 0 when nothing succeeded or failed.
pub fn success_rate(successes: usize, errors: usize) -> f64 {
    let total = successes + errors;
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64 * 100.0
    }
}

/// Counts derived from an event sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub counts: BTreeMap<EventStatus, usize>,
}

impl RunSummary {
    pub fn from_events(events: &[RunEvent]) -> Self {
        let mut counts: BTreeMap<EventStatus, usize> = EventStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for e in events {
            *counts.entry(e.status).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, status: EventStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn successes(&self) -> usize {
        self.count(EventStatus::Success)
    }

    pub fn errors(&self) -> usize {
        self.count(EventStatus::Error)
    }

    /// Operations that reached a verdict (SUCCESS or ERROR).
    pub fn total_operations(&self) -> usize {
        self.successes() + self.errors()
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.successes(), self.errors())
    }
}

/// Read-only markdown projection of a run log.
pub struct RunReport<'a> {
    log: &'a RunLog,
    title: String,
    tasks: &'a [TaskSummary],
}

impl<'a> RunReport<'a> {
    pub fn new(log: &'a RunLog, title: impl Into<String>) -> Self {
        Self {
            log,
            title: title.into(),
            tasks: &[],
        }
    }

    pub fn with_tasks(mut self, tasks: &'a [TaskSummary]) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_events(self.log.events())
    }

    pub fn render(&self) -> String {
        self.render_at(Utc::now())
    }

    /// Everything except the "generated" line depends only on the log.
    pub fn render_at(&self, generated_at: DateTime<Utc>) -> String {
        let mut out = String::new();
        let started = self.log.started_at();
        let ended = self.log.ended_at();
        let summary = self.summary();

        let _ = writeln!(out, "# {}\n", self.title);
        let _ = writeln!(out, "**Run ID:** {}", self.log.run_id());
        let _ = writeln!(out, "**Started:** {}", started.format(STAMP));
        let _ = writeln!(out, "**Completed:** {}", ended.format(STAMP));
        let _ = writeln!(out, "**Duration:** {}", format_duration(ended - started));
        let _ = writeln!(out, "**Report Generated:** {}\n", generated_at.format(STAMP));

        out.push_str("## Summary\n\n");
        let _ = writeln!(out, "- **Total Operations:** {}", summary.total_operations());
        let _ = writeln!(out, "- **Successful:** {}", summary.successes());
        let _ = writeln!(out, "- **Failed:** {}", summary.errors());
        let _ = writeln!(out, "- **Success Rate:** {:.1}%\n", summary.success_rate());

        out.push_str("| Status | Events |\n|---|---|\n");
        for (status, n) in &summary.counts {
            let _ = writeln!(out, "| {status} | {n} |");
        }
        out.push('\n');

        if !self.tasks.is_empty() {
            out.push_str("## Task Outcomes\n\n");
            for t in self.tasks {
                let _ = write!(out, "- **{}:** {}", t.task, t.state);
                if let Some(reason) = t.abort_reason {
                    let _ = write!(out, " ({reason:?})");
                }
                if let Some(gap) = &t.gap {
                    let _ = write!(out, " - {} present, {} missing", gap.present.len(), gap.missing.len());
                }
                out.push('\n');
            }
            out.push('\n');
        }

        out.push_str("## Detailed Log\n\n");
        for e in self.log.events() {
            render_event(&mut out, e);
        }
        out
    }
}

fn render_event(out: &mut String, e: &RunEvent) {
    let _ = writeln!(out, "### {} - {}\n", e.timestamp.format(STAMP), e.action);
    let _ = writeln!(out, "**Status:** {}\n", e.status);
    if !e.message.is_empty() {
        let _ = writeln!(out, "**Message:** {}\n", e.message);
    }
    if let Some(detail) = &e.detail {
        let pretty = serde_json::to_string_pretty(detail).unwrap_or_else(|_| detail.to_string());
        let _ = writeln!(out, "**Details:**\n```json\n{pretty}\n```\n");
    }
    out.push_str("---\n\n");
}

/// `H:MM:SS.mmm`
pub fn format_duration(d: Duration) -> String {
    let ms = d.num_milliseconds().max(0);
    let (h, rem) = (ms / 3_600_000, ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{h}:{m:02}:{s:02}.{ms:03}")
}
