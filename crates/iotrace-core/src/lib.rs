pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod patterns;
pub mod report;
pub mod trace;
pub mod util;

use std::path::Path;

use tracing::{debug, info};

use crate::classify::engine::{ClassifiedTask, Classifier};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::graph::{TaskGraph, TaskGraphSource, TaskRef};
use crate::patterns::resolve::{PatternCache, PatternResolver};
use crate::report::model::Report;
use crate::trace::normalize::Backend;
use crate::trace::read::{TraceCapture, capture_from_file};

pub const TOOL_NAME: &str = "iotrace";

/// Where the raw trace text for an audit comes from.
#[derive(Debug, Clone, Copy)]
pub enum TraceInput<'a> {
    File(&'a Path),
    Text(&'a str),
}

/// Normalize a captured trace with `backend`.
pub fn capture(config: &AuditConfig, backend: Backend, input: TraceInput<'_>) -> TraceCapture {
    let normalizer = backend.normalizer(config);
    debug!(
        normalizer = normalizer.name(),
        pid_scoped = config.task_pid.is_some(),
        "normalizing trace"
    );
    match input {
        TraceInput::File(path) => capture_from_file(path, normalizer.as_ref()),
        TraceInput::Text(raw) => TraceCapture {
            accesses: normalizer.normalize(raw),
            warning: None,
        },
    }
}

/// Resolve, compile and classify for an already-collected task graph.
///
/// `exit_code` is the traced task's exit status; it is reported, never
/// interpreted.
pub fn classify_capture(
    config: &AuditConfig,
    graph: &TaskGraph,
    capture: TraceCapture,
    exit_code: i32,
) -> Report {
    let resolver = PatternResolver::new(config, &graph.groups);
    let mut cache = PatternCache::new();

    let tasks: Vec<ClassifiedTask<'_>> = graph
        .ordered_specs()
        .map(|spec| ClassifiedTask {
            spec,
            patterns: cache.get_or_resolve(&resolver, spec, &graph.projects),
        })
        .collect();

    let outcome = Classifier::new(config).classify(&capture.accesses, &tasks, &graph.projects);

    let mut warnings = graph.warnings.clone();
    warnings.extend(capture.warning);

    info!(
        task = %graph.under_test.task,
        reads = capture.accesses.reads.len(),
        writes = capture.accesses.writes.len(),
        undeclared_reads = outcome.undeclared_reads.len(),
        undeclared_writes = outcome.undeclared_writes.len(),
        cross_project = outcome.cross_project_reads.len() + outcome.cross_project_writes.len(),
        "audit classified"
    );

    Report::new(graph.task_ids(), outcome, exit_code, warnings)
}

/// Full pipeline over an already-captured trace.
///
/// Fails only when the task under test cannot be resolved; every other
/// problem degrades into report warnings.
pub fn audit(
    config: &AuditConfig,
    source: &dyn TaskGraphSource,
    task: &TaskRef,
    backend: Backend,
    input: TraceInput<'_>,
    exit_code: i32,
) -> Result<Report, AuditError> {
    let graph = graph::collect(source, task)?;
    let traced = capture(config, backend, input);
    Ok(classify_capture(config, &graph, traced, exit_code))
}
