use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use iotrace_core::trace::Backend;

#[derive(Debug, Parser)]
#[command(
    name = "iotrace",
    version,
    about = "Trace a build task's file I/O and check it against declared inputs and outputs"
)]
pub struct Args {
    /// Task to audit, as `project:target`
    pub task: String,

    /// Arguments forwarded verbatim to the task invocation
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub forwarded: Vec<String>,

    /// Workspace snapshot (project graph JSON) exported by the build system
    #[arg(long)]
    pub graph: PathBuf,

    /// Audit configuration JSON
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Workspace root (defaults to the snapshot's, then the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Trace backend: strace, fs-usage or tracepoint (defaults to the platform's)
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Classify an already-captured trace instead of running the task
    #[arg(long)]
    pub trace_file: Option<PathBuf>,

    /// Command that runs a task; the task and forwarded arguments are appended
    #[arg(long, default_value = "npx nx run")]
    pub runner: String,

    /// Output format
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Include the per-file classification list
    #[arg(long)]
    pub details: bool,

    /// Additional directory name to ignore (repeatable)
    #[arg(long = "ignore-dir")]
    pub ignore_dirs: Vec<String>,

    #[arg(long)]
    pub startup_grace_ms: Option<u64>,

    #[arg(long)]
    pub drain_grace_ms: Option<u64>,

    /// Debug-level logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
