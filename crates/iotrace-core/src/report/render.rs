use crate::TOOL_NAME;
use crate::report::model::Report;

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} audit of {}\n", TOOL_NAME, report.tasks.join(", ")));
    out.push_str(&format!("Task exit code: {}\n", report.exit_code));

    section(&mut out, "Undeclared reads", report.undeclared_reads.iter().cloned());
    section(&mut out, "Undeclared writes", report.undeclared_writes.iter().cloned());
    section(
        &mut out,
        "Cross-project reads",
        report
            .cross_project_reads
            .iter()
            .map(|a| format!("{} (from {})", a.path, a.from_project)),
    );
    if !report.cross_project_writes.is_empty() {
        section(
            &mut out,
            "Cross-project writes",
            report
                .cross_project_writes
                .iter()
                .map(|a| format!("{} (from {})", a.path, a.from_project)),
        );
    }

    for warning in &report.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    if !report.has_violations() {
        out.push_str("All observed file accesses are declared.\n");
    }
    out
}

fn section(out: &mut String, title: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    out.push_str(&format!("{title}: {}\n", items.len()));
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}
