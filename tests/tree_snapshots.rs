use insta::assert_debug_snapshot;
use procsight::system::process::{ProcessRecord, ProcessState};
use procsight::system::sort::{SortKey, sort_forest};
use procsight::system::tree::{ProcessForest, build_forest, split_subtree, subtree};

fn mock_process(pid: u32, ppid: u32, command: &str, rss: u64) -> ProcessRecord {
    let mut record = ProcessRecord {
        pid,
        ppid,
        command: command.to_string(),
        args: format!("{command} --daemon"),
        state: ProcessState::Sleeping,
        ..Default::default()
    };
    record.memory.resident_bytes = rss;
    record
}

fn sample_table() -> Vec<ProcessRecord> {
    vec![
        mock_process(1, 0, "init", 10),
        mock_process(200, 1, "sshd", 40),
        mock_process(201, 200, "bash", 30),
        mock_process(202, 201, "vim", 90),
        mock_process(300, 1, "cron", 5),
        mock_process(2, 0, "kthreadd", 0),
        mock_process(50, 2, "kworker/0:1", 0),
        // Parent 999 is not in the table, so 400 is a root.
        mock_process(400, 999, "orphan", 7),
    ]
}

/// `depth pid command` per node, depth first.
fn outline(forest: &ProcessForest) -> Vec<String> {
    forest
        .flatten()
        .iter()
        .map(|entry| format!("{} {} {}", entry.depth, entry.record.pid, entry.record.command))
        .collect()
}

#[test]
fn forest_shape() {
    let forest = build_forest(sample_table());
    assert_eq!(forest.len(), 8);
    assert_debug_snapshot!(outline(&forest), @r#"
    [
        "0 1 init",
        "1 200 sshd",
        "2 201 bash",
        "3 202 vim",
        "1 300 cron",
        "0 2 kthreadd",
        "1 50 kworker/0:1",
        "0 400 orphan",
    ]
    "#);
}

#[test]
fn forest_sorted_by_resident_memory() {
    let mut forest = build_forest(sample_table());
    sort_forest(&mut forest, SortKey::ResidentMemory, true);
    assert_debug_snapshot!(outline(&forest), @r#"
    [
        "0 1 init",
        "1 200 sshd",
        "2 201 bash",
        "3 202 vim",
        "1 300 cron",
        "0 400 orphan",
        "0 2 kthreadd",
        "1 50 kworker/0:1",
    ]
    "#);
}

#[test]
fn subtree_keeps_descendants() {
    let forest = build_forest(sample_table());
    let selected = subtree(forest, 200);
    assert_debug_snapshot!(outline(&selected), @r#"
    [
        "0 200 sshd",
        "1 201 bash",
        "2 202 vim",
    ]
    "#);
}

#[test]
fn split_returns_remainder() {
    let forest = build_forest(sample_table());
    let (selected, rest) = split_subtree(forest, 201);
    assert_eq!(selected.len(), 2);
    assert_eq!(rest.len(), 6);
    assert!(rest.find(201).is_none());
    assert!(rest.find(200).is_some_and(|sshd| sshd.children.is_empty()));
}

#[test]
fn missing_pid_yields_empty_subtree() {
    let forest = build_forest(sample_table());
    let (selected, rest) = split_subtree(forest, 12345);
    assert!(selected.is_empty());
    assert_eq!(rest.len(), 8);
}

#[test]
fn flat_round_trip_keeps_every_record() {
    let forest = build_forest(sample_table());
    let mut pids: Vec<u32> = forest.into_flat().iter().map(|p| p.pid).collect();
    pids.sort_unstable();
    assert_eq!(pids, vec![1, 2, 50, 200, 201, 202, 300, 400]);
}
