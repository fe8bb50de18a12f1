//! Tracer and task subprocess plumbing.
//!
//! `strace` launches the task itself, so no timing is involved. Attach-style
//! tracers (`fs_usage`, `bpftrace`) observe the whole system: they are
//! started first, given `startup_grace_ms` to attach, and kept running for
//! `drain_grace_ms` after the task exits. There is no readiness handshake,
//! so accesses at either boundary can be lost on a loaded machine.
//!
//! Attach-style tracers record every process on the host, so the task's
//! pid is reported back for the pid filter. `bpftrace` emits fork records
//! itself; for `fs_usage` the process table is sampled while the task runs,
//! which can miss children that live shorter than one sample interval.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use iotrace_core::config::TimingContract;
use iotrace_core::error::AuditError;
use iotrace_core::trace::{Backend, ProcessTree};
use tracing::{debug, info, warn};

const PS_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Reduces `openat` to `<R|W> <pid> <path>` records in the kernel, plus
/// `F <parent> <child>` for every fork.
const BPFTRACE_PROGRAM: &str = r#"
tracepoint:sched:sched_process_fork { printf("F %d %d\n", args->parent_pid, args->child_pid); }
tracepoint:syscalls:sys_enter_openat { @path[tid] = str(args->filename); @flags[tid] = args->flags; }
tracepoint:syscalls:sys_exit_openat /@flags[tid] >= 0/ {
  if (args->ret >= 0) {
    if ((@flags[tid] & 3) != 1) { printf("R %d %s\n", pid, @path[tid]); }
    if ((@flags[tid] & 3) != 0 || (@flags[tid] & 0x240) != 0) { printf("W %d %s\n", pid, @path[tid]); }
  }
  delete(@path[tid]); delete(@flags[tid]);
}
"#;

/// The build-system invocation being traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TaskCommand {
    /// `runner` split on whitespace, followed by the task and forwarded args.
    pub fn new(runner: &str, task: &str, forwarded: &[String]) -> Result<Self, AuditError> {
        let mut parts = runner.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| AuditError::TracerLaunchFailure {
            tracer: "runner".into(),
            reason: "empty runner command".into(),
        })?;
        let mut args: Vec<String> = parts.collect();
        args.push(task.to_string());
        args.extend(forwarded.iter().cloned());
        Ok(Self { program, args })
    }
}

/// Outcome of one traced run.
#[derive(Debug, Clone, Default)]
pub struct TaskRun {
    pub exit_code: i32,
    /// Set when the tracer observed more than the task's own processes.
    pub task_pid: Option<u32>,
    /// Sampled process tree, when the trace itself carries no lineage.
    pub lineage: ProcessTree,
}

/// Trace output location for one run.
pub fn trace_path() -> PathBuf {
    std::env::temp_dir().join(format!("iotrace-{}.trace", std::process::id()))
}

/// Run `task` under `backend`, writing raw trace text to `trace_path`.
///
/// Only tracer-level problems are errors.
pub fn run_traced(
    backend: Backend,
    task: &TaskCommand,
    workspace: &Path,
    timing: TimingContract,
    trace_path: &Path,
) -> Result<TaskRun, AuditError> {
    match backend {
        Backend::Strace => Ok(TaskRun {
            exit_code: run_under_strace(task, workspace, trace_path)?,
            ..Default::default()
        }),
        Backend::FsUsage => {
            let mut tracer = Command::new("fs_usage");
            tracer.args(["-w", "-f", "filesys"]);
            run_attached(tracer, "fs_usage", true, task, workspace, timing, trace_path)
        }
        Backend::Tracepoint => {
            let mut tracer = Command::new("bpftrace");
            tracer.args(["-e", BPFTRACE_PROGRAM]);
            run_attached(tracer, "bpftrace", false, task, workspace, timing, trace_path)
        }
    }
}

/// `strace -f` follows only the task's own process tree.
fn run_under_strace(task: &TaskCommand, workspace: &Path, trace_path: &Path) -> Result<i32, AuditError> {
    info!(program = %task.program, "running task under strace");
    let status = Command::new("strace")
        .args(["-f", "-qq", "-e", "trace=open,openat,creat", "-o"])
        .arg(trace_path)
        .arg("--")
        .arg(&task.program)
        .args(&task.args)
        .current_dir(workspace)
        .status()
        .map_err(|err| launch_failure("strace", err))?;

    Ok(exit_code(status))
}

fn run_attached(
    mut tracer: Command,
    name: &str,
    sample_lineage: bool,
    task: &TaskCommand,
    workspace: &Path,
    timing: TimingContract,
    trace_path: &Path,
) -> Result<TaskRun, AuditError> {
    let output = File::create(trace_path).map_err(|err| launch_failure(name, err))?;
    let mut tracer = tracer
        .stdout(Stdio::from(output))
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| launch_failure(name, err))?;

    debug!(tracer = name, grace_ms = timing.startup_grace_ms, "waiting for tracer to attach");
    thread::sleep(Duration::from_millis(timing.startup_grace_ms));

    if let Ok(Some(status)) = tracer.try_wait() {
        return Err(AuditError::TracerLaunchFailure {
            tracer: name.to_string(),
            reason: format!("exited before the task started ({status})"),
        });
    }

    info!(program = %task.program, tracer = name, "running task");
    let mut run = TaskRun::default();
    let task_status = Command::new(&task.program)
        .args(&task.args)
        .current_dir(workspace)
        .spawn()
        .and_then(|mut child| {
            run.task_pid = Some(child.id());
            if sample_lineage {
                wait_sampling(&mut child, &mut run.lineage)
            } else {
                child.wait()
            }
        });

    debug!(tracer = name, grace_ms = timing.drain_grace_ms, "draining tracer");
    thread::sleep(Duration::from_millis(timing.drain_grace_ms));
    stop(&mut tracer, name);

    // A task that cannot start is the task's failure, not the tracer's.
    run.exit_code = match task_status {
        Ok(status) => exit_code(status),
        Err(err) => {
            warn!(program = %task.program, error = %err, "task failed to start");
            127
        }
    };
    Ok(run)
}

/// Wait for `child`, recording the process table until it exits.
fn wait_sampling(child: &mut Child, lineage: &mut ProcessTree) -> std::io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        match Command::new("ps").args(["-A", "-o", "pid=,ppid="]).output() {
            Ok(output) => lineage.record_ps_output(&String::from_utf8_lossy(&output.stdout)),
            Err(err) => {
                warn!(error = %err, "process table unavailable; only the task's own pid is kept");
                return child.wait();
            }
        }
        thread::sleep(PS_SAMPLE_INTERVAL);
    }
}

/// Interrupt the tracer so it flushes, falling back to a hard kill.
fn stop(tracer: &mut Child, name: &str) {
    let interrupted = Command::new("kill")
        .args(["-INT", &tracer.id().to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !interrupted {
        if let Err(err) = tracer.kill() {
            warn!(tracer = name, error = %err, "failed to stop tracer");
        }
    }
    if let Err(err) = tracer.wait() {
        warn!(tracer = name, error = %err, "failed to reap tracer");
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn launch_failure(tracer: &str, err: std::io::Error) -> AuditError {
    AuditError::TracerLaunchFailure {
        tracer: tracer.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_command_appends_task_and_forwarded_args() {
        let cmd = TaskCommand::new("npx nx run", "app:build", &["--prod".into()]).unwrap();
        assert_eq!(cmd.program, "npx");
        assert_eq!(cmd.args, vec!["nx", "run", "app:build", "--prod"]);
    }

    #[test]
    fn empty_runner_is_a_launch_failure() {
        let err = TaskCommand::new("   ", "app:build", &[]).unwrap_err();
        assert!(matches!(err, AuditError::TracerLaunchFailure { .. }));
    }

    #[test]
    fn sampling_waits_for_the_task_and_sees_its_pid() {
        if Command::new("ps").args(["-A", "-o", "pid=,ppid="]).output().is_err() {
            return;
        }
        let mut child = Command::new("sh")
            .args(["-c", "sleep 0.3"])
            .spawn()
            .expect("sh is available");
        let pid = child.id();
        let mut lineage = ProcessTree::new();

        let status = wait_sampling(&mut child, &mut lineage).unwrap();
        assert!(status.success());
        assert!(lineage.descendants(std::process::id()).contains(&pid));
    }

    #[test]
    fn bpftrace_program_reports_forks() {
        assert!(BPFTRACE_PROGRAM.contains("sched_process_fork"));
        assert!(BPFTRACE_PROGRAM.contains("F %d %d"));
    }

    #[test]
    fn trace_path_is_per_process() {
        let path = trace_path();
        assert!(path.to_string_lossy().contains(&std::process::id().to_string()));
    }
}
