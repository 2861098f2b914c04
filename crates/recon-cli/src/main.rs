use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recon_core::RunSummary;
use recon_runner::{doctor, doctor_connectivity, http_transport, run_session, CancelFlag, Config, RunOptions};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "recon", version, about = "Reconcile a permission-gated GraphQL backend against a desired state")]
struct Cli {
    /// Path to the config file
    #[arg(long, short, global = true, default_value = "recon.toml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `recon_runner=debug`
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an example config
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Check the config, credential environment and (optionally) connectivity
    Doctor {
        #[arg(long)]
        offline: bool,
    },

    /// Probe, reconcile and write the report
    Run {
        /// Simulate every mutation instead of sending it
        #[arg(long)]
        dry_run: bool,
        /// Override the report path
        #[arg(long)]
        report: Option<PathBuf>,
        /// Override the remediation artifact path
        #[arg(long)]
        remediation: Option<PathBuf>,
        /// Override the event manifest path
        #[arg(long)]
        events: Option<PathBuf>,
        /// Only run the named task (repeatable)
        #[arg(long = "task")]
        tasks: Vec<String>,
    },

    /// List configured tasks
    Tasks,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&cli.log)).init();

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    match cli.cmd {
        Command::Init { force } => {
            if cli.config.exists() && !force {
                eprintln!("{} already exists (use --force to overwrite)", cli.config.display());
                return Ok(EXIT_CONFIG);
            }
            Config::default_example().save_to(&cli.config)?;
            println!("Wrote {}", cli.config.display());
            Ok(0)
        }
        Command::Doctor { offline } => {
            let Some(cfg) = load(&cli.config) else {
                return Ok(EXIT_CONFIG);
            };
            if let Err(e) = doctor(&cfg) {
                eprintln!("config: {e:#}");
                return Ok(EXIT_CONFIG);
            }
            println!("config OK ({} task(s))", cfg.tasks.len());
            if !offline {
                let transport = http_transport(&cfg, cfg.credential_bundle()?)?;
                doctor_connectivity(&cfg, &transport).await?;
                println!("endpoint OK ({})", cfg.endpoint.url);
            }
            Ok(0)
        }
        Command::Tasks => {
            let Some(cfg) = load(&cli.config) else {
                return Ok(EXIT_CONFIG);
            };
            for t in &cfg.tasks {
                let action = t.action.as_ref().map_or("-", |a| a.label.as_str());
                println!(
                    "- {} [{} x{}] action: {} {}",
                    t.name,
                    t.probe.entity_kind,
                    t.checklist.items.len(),
                    action,
                    t.description
                );
            }
            Ok(0)
        }
        Command::Run {
            dry_run,
            report,
            remediation,
            events,
            tasks,
        } => {
            let Some(mut cfg) = load(&cli.config) else {
                return Ok(EXIT_CONFIG);
            };
            override_artifact_paths(&mut cfg, report, remediation, events);
            let prepared = cfg
                .validate()
                .and_then(|_| cfg.select_tasks(&tasks))
                .and_then(|_| cfg.credential_bundle());
            let credentials = match prepared {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("config: {e}");
                    return Ok(EXIT_CONFIG);
                }
            };
            let transport = http_transport(&cfg, credentials)?;
            let store = cfg.artifact_store();

            let cancel = CancelFlag::new();
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; stopping after the current task");
                    flag.cancel();
                }
            });

            let options = RunOptions::from_config(&cfg, dry_run);
            let res = run_session(&cfg, &transport, &store, options, &tasks, cancel).await?;

            let summary = RunSummary::from_events(res.log.events());
            for t in &res.outcome.tasks {
                println!("{}: {}", t.summary.task, t.summary.state);
            }
            println!(
                "{} operation(s), {} succeeded, {} failed ({:.1}%)",
                summary.total_operations(),
                summary.successes(),
                summary.errors(),
                summary.success_rate()
            );
            for p in &res.written {
                println!("wrote {}", p.display());
            }
            Ok(res.outcome.exit_code())
        }
    }
}

fn override_artifact_paths(
    cfg: &mut Config,
    report: Option<PathBuf>,
    remediation: Option<PathBuf>,
    events: Option<PathBuf>,
) {
    if let Some(p) = report {
        cfg.run.report_path = p.display().to_string();
    }
    if let Some(p) = remediation {
        cfg.run.remediation_path = p.display().to_string();
    }
    if let Some(p) = events {
        cfg.run.events_path = p.display().to_string();
    }
}

fn load(path: &Path) -> Option<Config> {
    match Config::load_from(path) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!("config: {e:#}");
            None
        }
    }
}
