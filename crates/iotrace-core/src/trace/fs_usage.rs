use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::trace::access::{AccessSet, Operation, TraceEvent};
use crate::trace::filter::PathFilter;
use crate::trace::normalize::TraceNormalizer;

// Fixed positions in the parenthesized open-mode field.
const FLAG_READ: usize = 0;
const FLAG_READ_WRITE: usize = 1;
const FLAG_CREATE: usize = 2;
const FLAG_TRUNCATE: usize = 4;

fn open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\S+\s+open\s+F=(?P<fd>\d+)\s+\((?P<flags>[^)]{1,16})\)\s+(?P<rest>.+)$")
            .expect("valid fs_usage open regex")
    })
}

/// Filesystem-monitor backend (`fs_usage -w -f filesys`).
///
/// Columns after the path are separated by runs of spaces; the trailing
/// `<process>.<pid>` column supplies the pid when present.
#[derive(Debug, Clone)]
pub struct FsUsageNormalizer {
    filter: PathFilter,
}

impl FsUsageNormalizer {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }
}

impl TraceNormalizer for FsUsageNormalizer {
    fn name(&self) -> &'static str {
        "fs_usage"
    }

    fn normalize(&self, raw: &str) -> AccessSet {
        self.filter.collect(raw.lines().flat_map(parse_line))
    }
}

pub fn parse_line(line: &str) -> Vec<TraceEvent> {
    let Some(caps) = open_regex().captures(line) else {
        trace!(line, "unrecognized fs_usage line");
        return Vec::new();
    };

    let flags: Vec<char> = caps["flags"].chars().collect();
    let set = |index: usize, expected: char| flags.get(index) == Some(&expected);

    let read = set(FLAG_READ, 'R');
    let write = set(FLAG_READ_WRITE, 'W') || set(FLAG_CREATE, 'C') || set(FLAG_TRUNCATE, 'T');

    let rest = caps["rest"].trim_end();
    let path = rest.split("  ").next().unwrap_or(rest).trim().to_string();
    if path.is_empty() {
        return Vec::new();
    }
    let pid = trailing_pid(rest);

    let mut events = Vec::with_capacity(2);
    if read {
        events.push(TraceEvent {
            pid,
            operation: Operation::Read,
            path: path.clone(),
        });
    }
    if write {
        events.push(TraceEvent {
            pid,
            operation: Operation::Write,
            path,
        });
    }
    events
}

/// Pid from a trailing `<process>.<pid>` column, if the line has one.
fn trailing_pid(rest: &str) -> Option<u32> {
    if !rest.contains("  ") {
        return None;
    }
    let last = rest.split_whitespace().last()?;
    let (_, pid) = last.rsplit_once('.')?;
    pid.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;

    #[test]
    fn read_only_open() {
        let events = parse_line(
            "12:00:01.000001  open              F=5       (R___________)  /ws/src/a.ts          0.000010   node.4321",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Read);
        assert_eq!(events[0].path, "/ws/src/a.ts");
        assert_eq!(events[0].pid, Some(4321));
    }

    #[test]
    fn create_and_truncate_are_writes() {
        let events = parse_line(
            "12:00:01.000002  open  F=6  (_WC_T_______)  /ws/dist/out.js  0.000020   node.4321",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, Operation::Write);

        let events =
            parse_line("12:00:01.000003  open  F=7  (R_C_________)  /ws/dist/both.js  0.000020   node.1");
        let ops: Vec<_> = events.iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Read, Operation::Write]);
    }

    #[test]
    fn failed_opens_and_other_calls_are_skipped() {
        assert!(parse_line("12:00:01.0  open  [  2]  (R___________)  /ws/missing  0.0  node.1").is_empty());
        assert!(parse_line("12:00:01.0  close  F=5  0.000001  node.1").is_empty());
    }

    #[test]
    fn normalize_filters_and_relativizes() {
        let raw = "\
12:00:01.1  open  F=5  (R___________)  /ws/src/a.ts  0.000010   node.10
12:00:01.2  open  F=6  (_W__________)  /ws/dist/a.js  0.000010   node.10
12:00:01.3  open  F=7  (R___________)  /System/Library/x.dylib  0.000010   node.10
";
        let normalizer = FsUsageNormalizer::new(PathFilter::new(&AuditConfig::new("/ws")));
        let set = normalizer.normalize(raw);

        assert!(set.reads.contains("src/a.ts"));
        assert!(set.writes.contains("dist/a.js"));
        assert_eq!(set.len(), 2);
    }
}
