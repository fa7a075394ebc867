#![cfg(target_os = "linux")]

use std::collections::HashSet;
use std::sync::{Arc, Barrier};

use procsight::system::platform::linux::ProcFs;
use procsight::system::{Collector, PlatformAccessor, ProcessFilter, build_forest};

#[test]
fn live_pids_are_unique_and_include_self() {
    let accessor = ProcFs::new();
    let records = accessor.acquire_processes(&ProcessFilter {
        show_kernel_threads: true,
    });
    let mut seen = HashSet::new();
    for record in &records {
        assert!(seen.insert(record.pid), "pid {} listed twice", record.pid);
        assert_eq!(record.tid, 0);
    }
    assert!(seen.contains(&std::process::id()));

    let count = records.len();
    assert_eq!(build_forest(records).len(), count);
}

#[test]
fn own_threads_are_listed() {
    let barrier = Arc::new(Barrier::new(2));
    let worker = {
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
            barrier.wait();
            barrier.wait();
        })
    };
    barrier.wait();

    let me = std::process::id();
    let record = ProcFs::new().acquire_process(me).unwrap();
    assert!(!record.command.is_empty());
    assert!(!record.threads.is_empty());
    assert!(record.threads.iter().all(|t| t.pid == me && t.tid != me));

    barrier.wait();
    worker.join().unwrap();
}

#[test]
fn live_system_counters() {
    let accessor = ProcFs::new();
    assert!(!accessor.acquire_cpu_cores().is_empty());
    assert!(accessor.acquire_memory().unwrap().total_bytes > 0);
}

#[test]
fn collector_over_live_proc() {
    let mut collector = Collector::new(Arc::new(ProcFs::new()));
    let first = collector.refresh();
    assert!(!first.processes.is_empty());
    assert!(first.processes.iter().all(|p| !p.is_new));
    let second = collector.refresh();
    assert!(second.cpu_total.is_some());
    assert!(second.processes.iter().all(|p| p.cpu_percent >= 0.0));
}
