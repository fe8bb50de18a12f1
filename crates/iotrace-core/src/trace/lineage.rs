use std::collections::{BTreeMap, BTreeSet};

/// Parent to child process edges observed while the task ran.
///
/// System-wide tracers see every process on the host; the tree lets the
/// pid filter keep only the traced task and whatever it spawned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTree {
    children: BTreeMap<u32, BTreeSet<u32>>,
}

impl ProcessTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, parent: u32, child: u32) {
        if parent != child {
            self.children.entry(parent).or_default().insert(child);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// `root` and every process transitively spawned by it.
    pub fn descendants(&self, root: u32) -> BTreeSet<u32> {
        let mut found = BTreeSet::from([root]);
        let mut pending = vec![root];
        while let Some(pid) = pending.pop() {
            for &child in self.children.get(&pid).into_iter().flatten() {
                if found.insert(child) {
                    pending.push(child);
                }
            }
        }
        found
    }

    /// Fold `ps -A -o pid=,ppid=` output into the tree.
    pub fn record_ps_output(&mut self, output: &str) {
        for line in output.lines() {
            let mut fields = line.split_whitespace().map(str::parse::<u32>);
            if let (Some(Ok(pid)), Some(Ok(ppid))) = (fields.next(), fields.next()) {
                self.record(ppid, pid);
            }
        }
    }
}
