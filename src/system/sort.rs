use std::cmp::Ordering;

use serde::Serialize;

use super::process::ProcessRecord;
use super::tree::ProcessForest;

/// Attributes a process list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Pid,
    Uid,
    Nice,
    Priority,
    Processor,
    Threads,
    Files,
    PrivateMemory,
    ResidentMemory,
    VirtualMemory,
    SharedMemory,
    RunTime,
    #[default]
    Cpu,
    Command,
    State,
    Age,
}

impl SortKey {
    pub const ALL: [SortKey; 16] = [
        SortKey::Pid,
        SortKey::Uid,
        SortKey::Nice,
        SortKey::Priority,
        SortKey::Processor,
        SortKey::Threads,
        SortKey::Files,
        SortKey::PrivateMemory,
        SortKey::ResidentMemory,
        SortKey::VirtualMemory,
        SortKey::SharedMemory,
        SortKey::RunTime,
        SortKey::Cpu,
        SortKey::Command,
        SortKey::State,
        SortKey::Age,
    ];

    pub fn next(self) -> Self {
        let pos = SortKey::ALL.iter().position(|k| *k == self).unwrap_or(0);
        SortKey::ALL[(pos + 1) % SortKey::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Pid => "pid",
            SortKey::Uid => "uid",
            SortKey::Nice => "nice",
            SortKey::Priority => "priority",
            SortKey::Processor => "cpu_id",
            SortKey::Threads => "threads",
            SortKey::Files => "files",
            SortKey::PrivateMemory => "private",
            SortKey::ResidentMemory => "resident",
            SortKey::VirtualMemory => "virtual",
            SortKey::SharedMemory => "shared",
            SortKey::RunTime => "time",
            SortKey::Cpu => "cpu",
            SortKey::Command => "command",
            SortKey::State => "state",
            SortKey::Age => "age",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let key = match s.as_str() {
            "memory" | "mem" | "rss" => SortKey::ResidentMemory,
            "name" | "cmd" => SortKey::Command,
            "vsz" | "virt" => SortKey::VirtualMemory,
            "start" | "started" => SortKey::Age,
            "processor" | "cpuid" => SortKey::Processor,
            _ => return SortKey::ALL.into_iter().find(|k| k.label() == s),
        };
        Some(key)
    }

    /// Unknown names fall back to the default key.
    pub fn from_str_config(s: &str) -> Self {
        SortKey::parse(s).unwrap_or_default()
    }
}

/// Natural ascending order of `a` and `b` on `key` alone.
pub fn compare_key(key: SortKey, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
    match key {
        SortKey::Pid => a.pid.cmp(&b.pid),
        SortKey::Uid => a.uid.cmp(&b.uid),
        SortKey::Nice => a.nice.cmp(&b.nice),
        SortKey::Priority => a.priority.cmp(&b.priority),
        SortKey::Processor => a.processor.cmp(&b.processor),
        SortKey::Threads => a.num_threads.cmp(&b.num_threads),
        SortKey::Files => a.open_files.cmp(&b.open_files),
        SortKey::PrivateMemory => a.memory.private_bytes.cmp(&b.memory.private_bytes),
        SortKey::ResidentMemory => a.memory.resident_bytes.cmp(&b.memory.resident_bytes),
        SortKey::VirtualMemory => a.memory.virtual_bytes.cmp(&b.memory.virtual_bytes),
        SortKey::SharedMemory => a.memory.shared_bytes.cmp(&b.memory.shared_bytes),
        SortKey::RunTime => a.run_time_secs.cmp(&b.run_time_secs),
        SortKey::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
        SortKey::Command => a
            .command
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.command.chars().flat_map(char::to_lowercase)),
        SortKey::State => a.state.name().cmp(b.state.name()),
        // Older first: an earlier start time means a greater age.
        SortKey::Age => b.start_time.cmp(&a.start_time),
    }
}

/// Total order used by every sorted view: the key in the requested
/// direction, then pid and tid ascending.
pub fn compare(key: SortKey, descending: bool, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
    let primary = compare_key(key, a, b);
    let primary = if descending {
        primary.reverse()
    } else {
        primary
    };
    primary
        .then_with(|| a.pid.cmp(&b.pid))
        .then_with(|| a.tid.cmp(&b.tid))
}

/// Stable sort of a flat list.
pub fn sort_records(records: &mut [ProcessRecord], key: SortKey, descending: bool) {
    #[cfg(feature = "perf-tracing")]
    let _span = tracing::debug_span!("sort.sort_records", key = key.label()).entered();

    records.sort_by(|a, b| compare(key, descending, a, b));
}

/// Sort every sibling list in the forest, including thread lists.
pub fn sort_forest(forest: &mut ProcessForest, key: SortKey, descending: bool) {
    fn sort_level(records: &mut [ProcessRecord], key: SortKey, descending: bool) {
        records.sort_by(|a, b| compare(key, descending, a, b));
        for record in records.iter_mut() {
            sort_level(&mut record.threads, key, descending);
            sort_level(&mut record.children, key, descending);
        }
    }
    sort_level(forest.roots_mut(), key, descending);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::process::{MemoryUsage, ProcessState};
    use crate::system::tree::build_forest;

    fn record(pid: u32) -> ProcessRecord {
        ProcessRecord {
            pid,
            ..Default::default()
        }
    }

    fn pids(records: &[ProcessRecord]) -> Vec<u32> {
        records.iter().map(|r| r.pid).collect()
    }

    #[test]
    fn next_cycles_through_all_keys() {
        let mut key = SortKey::Pid;
        for _ in 0..SortKey::ALL.len() {
            key = key.next();
        }
        assert_eq!(key, SortKey::Pid);
        assert_eq!(SortKey::Age.next(), SortKey::Pid);
    }

    #[test]
    fn parse_accepts_labels_and_aliases() {
        for key in SortKey::ALL {
            assert_eq!(SortKey::parse(key.label()), Some(key));
        }
        assert_eq!(SortKey::parse("MEMORY"), Some(SortKey::ResidentMemory));
        assert_eq!(SortKey::parse("name"), Some(SortKey::Command));
        assert_eq!(SortKey::from_str_config("bogus"), SortKey::Cpu);
    }

    #[test]
    fn memory_compares_full_64_bit_range() {
        let mut big = record(1);
        big.memory = MemoryUsage::new(u64::MAX, u64::MAX - 1, 0);
        let mut small = record(2);
        small.memory = MemoryUsage::new(1, 1, 0);
        assert_eq!(compare_key(SortKey::VirtualMemory, &big, &small), Ordering::Greater);
        assert_eq!(compare_key(SortKey::ResidentMemory, &small, &big), Ordering::Less);
        assert_eq!(compare_key(SortKey::PrivateMemory, &big, &small), Ordering::Greater);
    }

    #[test]
    fn command_is_case_insensitive() {
        let mut records = vec![record(1), record(2), record(3)];
        records[0].command = "zsh".into();
        records[1].command = "Bash".into();
        records[2].command = "apache".into();
        sort_records(&mut records, SortKey::Command, false);
        assert_eq!(pids(&records), vec![3, 2, 1]);
    }

    #[test]
    fn descending_cpu_breaks_ties_by_pid() {
        let mut records = vec![record(9), record(4), record(7)];
        records[0].cpu_percent = 5.0;
        records[1].cpu_percent = 12.5;
        records[2].cpu_percent = 5.0;
        sort_records(&mut records, SortKey::Cpu, true);
        assert_eq!(pids(&records), vec![4, 7, 9]);
    }

    #[test]
    fn state_sorts_by_name() {
        let mut records = vec![record(1), record(2), record(3)];
        records[0].state = ProcessState::Zombie;
        records[1].state = ProcessState::Running;
        records[2].state = ProcessState::Idle;
        sort_records(&mut records, SortKey::State, false);
        assert_eq!(pids(&records), vec![3, 2, 1]);
    }

    #[test]
    fn age_puts_oldest_first() {
        let mut records = vec![record(1), record(2)];
        records[0].start_time = 2_000;
        records[1].start_time = 1_000;
        sort_records(&mut records, SortKey::Age, false);
        assert_eq!(pids(&records), vec![2, 1]);
    }

    #[test]
    fn sort_forest_orders_every_level() {
        let mut a = record(3);
        a.ppid = 1;
        let mut b = record(2);
        b.ppid = 1;
        let mut forest = build_forest(vec![record(5), record(1), a, b]);
        sort_forest(&mut forest, SortKey::Pid, false);
        assert_eq!(pids(forest.roots()), vec![1, 5]);
        assert_eq!(pids(&forest.roots()[0].children), vec![2, 3]);
    }
}
