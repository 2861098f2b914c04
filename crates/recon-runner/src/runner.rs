use std::path::PathBuf;

use anyhow::Result;
use recon_artifacts::{ArtifactPaths, ArtifactStore, EventManifest, FsArtifactStore};
use recon_core::{EventStatus, RunLog, RunReport};
use recon_remediation::format_remediation;
use recon_transport::{CredentialBundle, HttpTransport, Transport, TransportError};
use tracing::info;

use crate::cancel::CancelFlag;
use crate::reconciler::{Reconciler, RunOptions, RunOutcome};
use crate::Config;

pub struct SessionResult {
    pub log: RunLog,
    pub outcome: RunOutcome,
    pub written: Vec<PathBuf>,
}

impl RunOptions {
    pub fn from_config(cfg: &Config, dry_run: bool) -> Self {
        Self {
            dry_run,
            simulate_on_denied: cfg.run.simulate_on_denied,
            inter_action_delay: cfg.inter_action_delay(),
        }
    }
}

impl Config {
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            report: self.report_path(),
            remediation: self.remediation_path(),
            events: self.events_path(),
        }
    }

    pub fn artifact_store(&self) -> FsArtifactStore {
        FsArtifactStore::new(self.artifact_paths())
    }
}

pub fn http_transport(cfg: &Config, credentials: CredentialBundle) -> Result<HttpTransport, TransportError> {
    HttpTransport::new(
        cfg.endpoint.url.clone(),
        credentials,
        cfg.timeout(),
        cfg.endpoint.user_agent.as_deref(),
    )
}

/// One full run: reconcile the selected tasks, then write the report, the
/// remediation artifact (only when some task needs a human) and the event manifest.
pub async fn run_session(
    cfg: &Config,
    transport: &dyn Transport,
    store: &dyn ArtifactStore,
    options: RunOptions,
    only: &[String],
    cancel: CancelFlag,
) -> Result<SessionResult> {
    let tasks = cfg.select_tasks(only)?;
    let mut log = RunLog::new();
    log.record(
        "Run",
        EventStatus::Started,
        format!("{} task(s) against {}", tasks.len(), transport.endpoint()),
    );

    let outcome = Reconciler::new(transport, options)
        .with_cancel(cancel)
        .run(cfg.preflight.as_ref(), &tasks, &mut log)
        .await;
    log.finish();

    let summaries = outcome.summaries();
    let plans = outcome.plans();
    let mut written = Vec::new();

    let report = RunReport::new(&log, cfg.run.title.clone()).with_tasks(&summaries).render();
    written.push(store.write_report(&report)?);
    if !plans.is_empty() {
        let md = format_remediation(&cfg.run.title, &plans, &cfg.curl_target());
        written.push(store.write_remediation(&md)?);
    }
    written.push(store.write_manifest(&EventManifest::from_run(&cfg.run.title, &log, &summaries, &plans))?);

    for p in &written {
        info!(path = %p.display(), "wrote artifact");
    }
    Ok(SessionResult { log, outcome, written })
}
