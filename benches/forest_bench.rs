use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use procsight::system::process::{ProcessRecord, ProcessState};
use procsight::system::sort::{SortKey, sort_forest};
use procsight::system::tree::build_forest;
use std::hint::black_box;

const SIZES: [usize; 3] = [500, 1000, 2000];

fn make_processes(n: usize) -> Vec<ProcessRecord> {
    (0..n)
        .map(|i| {
            let pid = i as u32 + 1;
            let ppid = if i == 0 { 0 } else { (i as u32 / 2) + 1 };
            let mut record = ProcessRecord {
                pid,
                ppid,
                command: format!("proc_{i}"),
                args: format!("proc_{i} --work"),
                cpu_percent: (i % 100) as f32,
                uid: (i % 8) as u32,
                state: ProcessState::Running,
                start_time: 1_700_000_000 + i as u64,
                ..Default::default()
            };
            record.memory.resident_bytes = ((n - i) as u64 + 1) * 1024;
            record
        })
        .collect()
}

fn bench_forest_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_build_500_1000_2000");
    for size in SIZES {
        let processes = make_processes(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &processes, |b, processes| {
            b.iter(|| black_box(build_forest(processes.clone())));
        });
    }
    group.finish();
}

fn bench_forest_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_sort_500_1000_2000");
    for size in SIZES {
        let forest = build_forest(make_processes(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &forest, |b, forest| {
            b.iter(|| {
                let mut forest = forest.clone();
                sort_forest(&mut forest, SortKey::ResidentMemory, true);
                black_box(forest)
            });
        });
    }
    group.finish();
}

fn bench_forest_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_flatten_500_1000_2000");
    for size in SIZES {
        let forest = build_forest(make_processes(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &forest, |b, forest| {
            b.iter(|| black_box(forest.flatten().len()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_forest_build,
    bench_forest_sort,
    bench_forest_flatten
);
criterion_main!(benches);
