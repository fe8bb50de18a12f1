use serde::{Deserialize, Serialize};

use crate::classify::engine::{Classification, ClassificationOutcome, CrossProjectAccess};

/// Final structured output of one audit.
///
/// The first five fields are the stable contract consumed by batch tooling;
/// the rest are emitted only when they carry information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub tasks: Vec<String>,
    pub undeclared_reads: Vec<String>,
    pub undeclared_writes: Vec<String>,
    pub cross_project_reads: Vec<CrossProjectAccess>,
    pub exit_code: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cross_project_writes: Vec<CrossProjectAccess>,

    /// Degradations that make this report incomplete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<Classification>>,
}

impl Report {
    /// Assemble a report from classification results.
    ///
    /// Sorts every list so identical runs serialize identically.
    pub fn new(
        tasks: Vec<String>,
        outcome: ClassificationOutcome,
        exit_code: i32,
        mut warnings: Vec<String>,
    ) -> Self {
        let ClassificationOutcome {
            mut files,
            mut undeclared_reads,
            mut undeclared_writes,
            mut cross_project_reads,
            mut cross_project_writes,
            ..
        } = outcome;

        undeclared_reads.sort();
        undeclared_writes.sort();
        cross_project_reads.sort_by(|a, b| a.path.cmp(&b.path));
        cross_project_writes.sort_by(|a, b| a.path.cmp(&b.path));
        files.sort_by(|a, b| (&a.path, a.operation as u8).cmp(&(&b.path, b.operation as u8)));
        warnings.sort();
        warnings.dedup();

        Self {
            tasks,
            undeclared_reads,
            undeclared_writes,
            cross_project_reads,
            exit_code,
            cross_project_writes,
            warnings,
            files: Some(files),
        }
    }

    /// Drop the per-file list, keeping only the aggregates.
    pub fn without_files(mut self) -> Self {
        self.files = None;
        self
    }

    pub fn has_violations(&self) -> bool {
        !self.undeclared_reads.is_empty()
            || !self.undeclared_writes.is_empty()
            || !self.cross_project_reads.is_empty()
            || !self.cross_project_writes.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::engine::Verdict;
    use crate::trace::access::Operation;
    use serde_json::json;

    fn outcome() -> ClassificationOutcome {
        ClassificationOutcome {
            files: vec![Classification {
                path: "b.txt".into(),
                operation: Operation::Read,
                owning_task: None,
                verdict: Verdict::UndeclaredRead,
                from_project: None,
            }],
            undeclared_reads: vec!["b.txt".into(), "a.txt".into()],
            cross_project_reads: vec![CrossProjectAccess {
                path: "libs/p2/x.ts".into(),
                from_project: "p2".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn serializes_stable_schema_in_camel_case() {
        let report = Report::new(vec!["p1:build".into()], outcome(), 0, vec![]).without_files();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value,
            json!({
                "tasks": ["p1:build"],
                "undeclaredReads": ["a.txt", "b.txt"],
                "undeclaredWrites": [],
                "crossProjectReads": [{"path": "libs/p2/x.ts", "fromProject": "p2"}],
                "exitCode": 0
            })
        );
    }

    #[test]
    fn optional_sections_appear_when_populated() {
        let report = Report::new(
            vec!["p1:build".into()],
            outcome(),
            2,
            vec!["trace output unreadable".into()],
        );
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["warnings"], json!(["trace output unreadable"]));
        assert_eq!(value["files"][0]["verdict"], "undeclaredRead");
        assert_eq!(value["files"][0]["operation"], "read");
        assert!(value.get("crossProjectWrites").is_none());
        assert!(!report.is_complete());
        assert!(report.has_violations());
    }

    #[test]
    fn repeated_warnings_are_reported_once() {
        let warnings = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let report = Report::new(vec![], ClassificationOutcome::default(), 0, warnings);
        assert_eq!(report.warnings, vec!["a", "b"]);
    }
}
