//! Classification engine.
//!
//! Attributes every observed access to the first task whose resolved
//! patterns declare it. The task under test is consulted first, then its
//! same-project dependencies in order, so declaration order breaks ties.
//!
//! Unclaimed accesses split into two verdicts:
//!
//!   - under another project's root → `CrossProjectViolation`
//!     (a dependency-propagated pattern is missing)
//!   - anywhere else                → `UndeclaredRead` / `UndeclaredWrite`
//!
//! Bookkeeping files and directories are dropped before any of this and
//! count toward neither declared nor undeclared totals.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::bookkeeping::BookkeepingFilter;
use crate::config::AuditConfig;
use crate::graph::model::{ProjectGraph, TaskSpec};
use crate::patterns::resolve::TaskPatterns;
use crate::trace::access::{AccessSet, Operation};
use crate::util::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    DeclaredInput,
    DeclaredOutput,
    UndeclaredRead,
    UndeclaredWrite,
    CrossProjectViolation,
}

/// Verdict for one accessed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub path: String,
    pub operation: Operation,
    /// Task whose patterns declared the access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_task: Option<String>,
    pub verdict: Verdict,
    /// Owning project of a cross-project access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossProjectAccess {
    pub path: String,
    pub from_project: String,
}

/// A task together with its resolved patterns.
#[derive(Debug, Clone)]
pub struct ClassifiedTask<'a> {
    pub spec: &'a TaskSpec,
    pub patterns: Arc<TaskPatterns>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationOutcome {
    pub files: Vec<Classification>,
    pub undeclared_reads: Vec<String>,
    pub undeclared_writes: Vec<String>,
    pub cross_project_reads: Vec<CrossProjectAccess>,
    pub cross_project_writes: Vec<CrossProjectAccess>,
    pub skipped_bookkeeping: usize,
    pub skipped_directories: usize,
}

pub struct Classifier {
    workspace_root: String,
    workspace_dir: PathBuf,
    bookkeeping: BookkeepingFilter,
}

impl Classifier {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            workspace_root: config.root_str(),
            workspace_dir: config.workspace_root.clone(),
            bookkeeping: BookkeepingFilter::new(config),
        }
    }

    /// `tasks[0]` is the task under test.
    pub fn classify(
        &self,
        accesses: &AccessSet,
        tasks: &[ClassifiedTask<'_>],
        projects: &ProjectGraph,
    ) -> ClassificationOutcome {
        let mut outcome = ClassificationOutcome::default();
        let home_project = tasks.first().map(|t| t.spec.project());

        let observed = accesses
            .reads
            .iter()
            .map(|p| (p, Operation::Read))
            .chain(accesses.writes.iter().map(|p| (p, Operation::Write)));

        for (path, operation) in observed {
            if self.bookkeeping.is_bookkeeping(path) {
                outcome.skipped_bookkeeping += 1;
                continue;
            }
            if self.workspace_dir.join(path).is_dir() {
                outcome.skipped_directories += 1;
                continue;
            }

            let abs = paths::to_absolute(path, &self.workspace_root);
            let classification = match claim(&abs, operation, tasks) {
                Some(task) => Classification {
                    path: path.clone(),
                    operation,
                    owning_task: Some(task.spec.task.to_string()),
                    verdict: match operation {
                        Operation::Read => Verdict::DeclaredInput,
                        Operation::Write => Verdict::DeclaredOutput,
                    },
                    from_project: None,
                },
                None => unclaimed(path, operation, home_project, projects),
            };

            match (classification.verdict, &classification.from_project) {
                (Verdict::UndeclaredRead, _) => outcome.undeclared_reads.push(path.clone()),
                (Verdict::UndeclaredWrite, _) => outcome.undeclared_writes.push(path.clone()),
                (Verdict::CrossProjectViolation, Some(project)) => {
                    let access = CrossProjectAccess {
                        path: path.clone(),
                        from_project: project.clone(),
                    };
                    match operation {
                        Operation::Read => outcome.cross_project_reads.push(access),
                        Operation::Write => outcome.cross_project_writes.push(access),
                    }
                }
                _ => {}
            }
            outcome.files.push(classification);
        }

        debug!(
            files = outcome.files.len(),
            bookkeeping = outcome.skipped_bookkeeping,
            directories = outcome.skipped_directories,
            "classification finished"
        );
        outcome
    }
}

/// First task, in order, whose patterns declare the access.
///
/// A dependency's outputs also declare reads: downstream tasks are
/// expected to consume what their dependencies produce.
fn claim<'t, 'a>(
    abs: &str,
    operation: Operation,
    tasks: &'t [ClassifiedTask<'a>],
) -> Option<&'t ClassifiedTask<'a>> {
    tasks.iter().enumerate().find_map(|(index, task)| {
        let declared = match operation {
            Operation::Read => {
                task.patterns.inputs.matches(abs)
                    || (index > 0 && task.patterns.outputs.matches(abs))
            }
            Operation::Write => task.patterns.outputs.matches(abs),
        };
        declared.then_some(task)
    })
}

fn unclaimed(
    path: &str,
    operation: Operation,
    home_project: Option<&str>,
    projects: &ProjectGraph,
) -> Classification {
    let foreign = projects
        .owner_of(path)
        .filter(|owner| Some(*owner) != home_project);

    let verdict = match (foreign, operation) {
        (Some(_), _) => Verdict::CrossProjectViolation,
        (None, Operation::Read) => Verdict::UndeclaredRead,
        (None, Operation::Write) => Verdict::UndeclaredWrite,
    };

    Classification {
        path: path.to_string(),
        operation,
        owning_task: None,
        verdict,
        from_project: foreign.map(str::to_string),
    }
}
