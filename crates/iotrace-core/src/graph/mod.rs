//! Task-Graph Collector interface.
//!
//! The host build system owns task metadata. The core only queries it
//! once per run through [`TaskGraphSource`] and treats the answer as
//! immutable afterwards.

pub mod model;
pub mod snapshot;

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::error::AuditError;
use crate::patterns::token::NamedGroupTable;

pub use model::{ProjectGraph, TaskRef, TaskSpec};
pub use snapshot::WorkspaceSnapshot;

/// Read-only view of the host build system's task metadata.
pub trait TaskGraphSource {
    fn task_spec(&self, task: &TaskRef) -> Result<TaskSpec, AuditError>;

    fn named_groups(&self) -> &NamedGroupTable;

    fn project_graph(&self) -> ProjectGraph;
}

/// Everything classification needs about one task under test.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub under_test: TaskSpec,
    /// Same-project dependency tasks, in breadth-first discovery order.
    pub dependencies: Vec<TaskSpec>,
    pub groups: NamedGroupTable,
    pub projects: ProjectGraph,
    pub warnings: Vec<String>,
}

impl TaskGraph {
    /// The task under test first, then its dependencies.
    pub fn ordered_specs(&self) -> impl Iterator<Item = &TaskSpec> {
        std::iter::once(&self.under_test).chain(self.dependencies.iter())
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.ordered_specs().map(|s| s.task.to_string()).collect()
    }
}

/// Query `source` for `task` and its transitive same-project dependencies.
///
/// A missing task under test is fatal. A missing dependency is logged and
/// skipped so that it contributes no patterns.
pub fn collect(source: &dyn TaskGraphSource, task: &TaskRef) -> Result<TaskGraph, AuditError> {
    let under_test = source.task_spec(task)?;

    let mut warnings = Vec::new();
    let mut dependencies = Vec::new();
    let mut visited: HashSet<TaskRef> = HashSet::from([task.clone()]);
    let mut queue: VecDeque<TaskRef> = under_test.depends_on.iter().cloned().collect();

    while let Some(dep) = queue.pop_front() {
        if dep.project != task.project {
            debug!(%dep, "skipping cross-project dependency task");
            continue;
        }
        if !visited.insert(dep.clone()) {
            continue;
        }

        match source.task_spec(&dep) {
            Ok(spec) => {
                queue.extend(spec.depends_on.iter().cloned());
                dependencies.push(spec);
            }
            Err(err) => {
                warn!(%dep, error = %err, "skipping dependency without a usable spec");
                warnings.push(format!("dependency {dep} skipped: {err}"));
            }
        }
    }

    Ok(TaskGraph {
        under_test,
        dependencies,
        groups: source.named_groups().clone(),
        projects: source.project_graph(),
        warnings,
    })
}
