use tracing::trace;

use crate::trace::access::{AccessSet, Operation, TraceEvent};
use crate::trace::filter::PathFilter;
use crate::trace::lineage::ProcessTree;
use crate::trace::normalize::TraceNormalizer;

/// Kernel-tracepoint backend.
///
/// The in-kernel program already reduces opens to `<R|W> <pid> <path>`, so
/// lines only need pid and path filtering. The program also emits
/// `F <parent> <child>` fork records, which extend the pid filter from the
/// task to everything it spawned.
#[derive(Debug, Clone)]
pub struct TracepointNormalizer {
    filter: PathFilter,
}

impl TracepointNormalizer {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }
}

impl TraceNormalizer for TracepointNormalizer {
    fn name(&self) -> &'static str {
        "tracepoint"
    }

    fn normalize(&self, raw: &str) -> AccessSet {
        let mut tree = ProcessTree::new();
        let mut events = Vec::new();
        for line in raw.lines() {
            match parse_record(line) {
                Some(Record::Access(event)) => events.push(event),
                Some(Record::Fork { parent, child }) => tree.record(parent, child),
                None => {}
            }
        }
        self.filter.with_lineage(&tree).collect(events)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Access(TraceEvent),
    Fork { parent: u32, child: u32 },
}

pub fn parse_record(line: &str) -> Option<Record> {
    let line = line.trim();
    let (kind, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();

    let operation = match kind {
        "R" => Operation::Read,
        "W" => Operation::Write,
        "F" => {
            let mut pids = rest.split_whitespace().map(str::parse::<u32>);
            return match (pids.next(), pids.next()) {
                (Some(Ok(parent)), Some(Ok(child))) => Some(Record::Fork { parent, child }),
                _ => None,
            };
        }
        _ => {
            trace!(line, "unrecognized tracepoint line");
            return None;
        }
    };

    let (pid, path) = rest.split_once(char::is_whitespace)?;
    let pid = pid.parse().ok()?;
    let path = path.trim_start();
    if path.is_empty() {
        return None;
    }

    Some(Record::Access(TraceEvent {
        pid: Some(pid),
        operation,
        path: path.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;

    fn parse_line(line: &str) -> Option<TraceEvent> {
        match parse_record(line)? {
            Record::Access(event) => Some(event),
            Record::Fork { .. } => None,
        }
    }

    #[test]
    fn parses_records() {
        let event = parse_line("W 99 /ws/dist/a b.js").unwrap();
        assert_eq!(event.operation, Operation::Write);
        assert_eq!(event.pid, Some(99));
        assert_eq!(event.path, "/ws/dist/a b.js");

        assert!(parse_line("X 1 /ws/a").is_none());
        assert!(parse_line("R notapid /ws/a").is_none());
        assert!(parse_line("R 1").is_none());
        assert_eq!(parse_record("F 7 8"), Some(Record::Fork { parent: 7, child: 8 }));
    }

    #[test]
    fn tolerates_runs_of_whitespace_between_fields() {
        let event = parse_line("R   42\t  /ws/src/a.ts").unwrap();
        assert_eq!(event.pid, Some(42));
        assert_eq!(event.path, "/ws/src/a.ts");
    }

    #[test]
    fn pid_filter_drops_foreign_processes() {
        let mut config = AuditConfig::new("/ws");
        config.pid_filter = Some([1, 2].into_iter().collect());
        let normalizer = TracepointNormalizer::new(PathFilter::new(&config));

        let set = normalizer.normalize("R 1 /ws/a.txt\nR 3 /ws/b.txt\nW 2 /ws/c.txt\n");
        assert!(set.reads.contains("a.txt"));
        assert!(!set.reads.contains("b.txt"));
        assert!(set.writes.contains("c.txt"));
    }

    #[test]
    fn fork_records_extend_the_task_pid_to_children() {
        let mut config = AuditConfig::new("/ws");
        config.task_pid = Some(500);
        let normalizer = TracepointNormalizer::new(PathFilter::new(&config));

        let raw = "\
R 500 /ws/a.txt
F 500 501
F 501 502
W 502 /ws/out.txt
R 900 /ws/editor-swap.txt
";
        let set = normalizer.normalize(raw);
        assert!(set.reads.contains("a.txt"));
        assert!(set.writes.contains("out.txt"));
        assert!(!set.reads.contains("editor-swap.txt"));
    }
}
