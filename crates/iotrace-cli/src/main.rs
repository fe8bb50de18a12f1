use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use iotrace_core::config::AuditConfig;
use iotrace_core::graph::{self, TaskRef, WorkspaceSnapshot};
use iotrace_core::report::render;
use iotrace_core::trace::Backend;
use iotrace_core::{TraceInput, capture, classify_capture};

mod args;
mod runner;

fn main() -> Result<()> {
    let args = args::Args::parse();
    init_logging(args.verbose);

    let task: TaskRef = args.task.parse()?;
    let snapshot = WorkspaceSnapshot::load(&args.graph)?;
    let mut config = build_config(&args, &snapshot)?;
    debug!(root = %config.workspace_root.display(), "workspace root");

    // An unknown task must fail before anything is traced.
    let task_graph = graph::collect(&snapshot, &task)?;

    let backend = match args.backend {
        Some(backend) => backend,
        None => Backend::detect()?,
    };
    info!(%backend, "trace backend");

    let (traced, exit_code) = match &args.trace_file {
        Some(path) => (capture(&config, backend, TraceInput::File(path)), 0),
        None => {
            let command = runner::TaskCommand::new(&args.runner, &args.task, &args.forwarded)?;
            let trace_path = runner::trace_path();
            let run =
                runner::run_traced(backend, &command, config.root(), config.timing, &trace_path)?;
            if let Some(pid) = run.task_pid {
                config.scope_to_task(pid, &run.lineage);
            }
            let exit_code = run.exit_code;
            let traced = capture(&config, backend, TraceInput::File(&trace_path));
            if let Err(err) = std::fs::remove_file(&trace_path) {
                debug!(path = %trace_path.display(), error = %err, "trace file not removed");
            }
            (traced, exit_code)
        }
    };

    let mut report = classify_capture(&config, &task_graph, traced, exit_code);
    if !args.details {
        report = report.without_files();
    }

    let output = match args.format {
        args::OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        args::OutputFormat::Text => render::render_text(&report),
    };

    match args.out {
        Some(path) => std::fs::write(&path, &output)
            .with_context(|| format!("failed to write report: {}", path.display()))?,
        None => println!("{output}"),
    }

    if !report.is_complete() {
        warn!("report is incomplete; some accesses may be missing");
    }

    std::process::exit(report.exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "iotrace_core=debug,iotrace_cli=debug"
    } else {
        "iotrace_core=info,iotrace_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file first, then command-line overrides.
///
/// The workspace root comes from `--workspace`, the config file, the
/// snapshot, or the current directory, in that order.
fn build_config(args: &args::Args, snapshot: &WorkspaceSnapshot) -> Result<AuditConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AuditConfig::default(),
    };

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let root = args
        .workspace
        .clone()
        .or_else(|| {
            let configured = config.workspace_root.clone();
            (!configured.as_os_str().is_empty()).then_some(configured)
        })
        .or_else(|| snapshot.workspace_root.clone())
        .unwrap_or_else(|| cwd.clone());
    config.workspace_root = absolute(root, &cwd);

    for dir in &args.ignore_dirs {
        if !config.ignore_dirs.contains(dir) {
            config.ignore_dirs.push(dir.clone());
        }
    }
    if let Some(ms) = args.startup_grace_ms {
        config.timing.startup_grace_ms = ms;
    }
    if let Some(ms) = args.drain_grace_ms {
        config.timing.drain_grace_ms = ms;
    }

    Ok(config)
}

fn load_config(path: &Path) -> Result<AuditConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse config: {}", path.display()))
}

fn absolute(path: PathBuf, cwd: &Path) -> PathBuf {
    if path.is_absolute() { path } else { cwd.join(path) }
}
