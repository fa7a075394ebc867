//! Acquisition profile for `--perf-capture`.
//!
//! [`ProfilingAccessor`] wraps the platform accessor and times every call.
//! [`capture`] drives sampler cycles and process refreshes through it and
//! condenses the measurements into a [`ProfileReport`].

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use color_eyre::eyre::{Result, eyre};
use serde::Serialize;

use crate::system::Collector;
use crate::system::error::AccessError;
use crate::system::platform::PlatformAccessor;
use crate::system::process::{ProcessFilter, ProcessRecord};
use crate::system::sampler::SamplerState;
use crate::system::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, MemorySummary, NetworkInterfaceCounters,
    SensorReading,
};
use crate::system::tree::build_forest;

pub const PROFILE_JSON: &str = "acquisition_profile.json";
pub const PROFILE_MARKDOWN: &str = "ACQUISITION_PROFILE.md";

/// Route span-close events to `output_path` as JSON lines.
pub fn init_tracing_json(output_path: &Path) -> Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let writer = Mutex::new(File::create(output_path)?);

    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}

#[derive(Debug, Default)]
struct CallLog {
    micros: Vec<f64>,
    items: Vec<f64>,
    failures: usize,
}

/// Accessor decorator recording latency and result size per operation.
pub struct ProfilingAccessor {
    inner: Arc<dyn PlatformAccessor>,
    calls: Mutex<BTreeMap<&'static str, CallLog>>,
}

impl ProfilingAccessor {
    pub fn new(inner: Arc<dyn PlatformAccessor>) -> Self {
        ProfilingAccessor {
            inner,
            calls: Mutex::new(BTreeMap::new()),
        }
    }

    /// `items` returns `None` for a failed call.
    fn timed<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce() -> T,
        items: impl FnOnce(&T) -> Option<usize>,
    ) -> T {
        let started = Instant::now();
        let out = call();
        let micros = as_micros(started.elapsed());

        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let log = calls.entry(operation).or_default();
        log.micros.push(micros);
        match items(&out) {
            Some(count) => log.items.push(count as f64),
            None => log.failures += 1,
        }
        out
    }

    pub fn operations(&self) -> BTreeMap<String, OperationStats> {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls
            .iter()
            .map(|(name, log)| {
                let stats = OperationStats {
                    calls: log.micros.len(),
                    failures: log.failures,
                    micros: summarize(&log.micros),
                    items: summarize(&log.items),
                };
                (name.to_string(), stats)
            })
            .collect()
    }
}

impl PlatformAccessor for ProfilingAccessor {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord> {
        self.timed("processes", || self.inner.acquire_processes(filter), |v| Some(v.len()))
    }

    fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
        self.timed("process", || self.inner.acquire_process(pid), |r| r.as_ref().ok().map(|_| 1))
    }

    fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
        self.timed("threads", || self.inner.acquire_threads(pid), |r| r.as_ref().ok().map(Vec::len))
    }

    fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
        self.timed("cpu_cores", || self.inner.acquire_cpu_cores(), |v| Some(v.len()))
    }

    fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
        self.timed("memory", || self.inner.acquire_memory(), |r| r.as_ref().ok().map(|_| 1))
    }

    fn acquire_sensors(&self) -> Vec<SensorReading> {
        self.timed("sensors", || self.inner.acquire_sensors(), |v| Some(v.len()))
    }

    fn acquire_batteries(&self) -> Vec<BatteryReading> {
        self.timed("batteries", || self.inner.acquire_batteries(), |v| Some(v.len()))
    }

    fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters> {
        self.timed("network", || self.inner.acquire_network_interfaces(), |v| Some(v.len()))
    }

    fn acquire_filesystems(&self) -> Vec<FilesystemEntry> {
        self.timed("filesystems", || self.inner.acquire_filesystems(), |v| Some(v.len()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub p50: f64,
    pub p95: f64,
    pub max: f64,
}

/// Nearest-rank percentiles, rounded to two decimals.
pub fn summarize(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = |q: f64| {
        let idx = (q * sorted.len() as f64).ceil() as usize;
        sorted[idx.clamp(1, sorted.len()) - 1]
    };
    Stats {
        count: sorted.len(),
        p50: round_2(rank(0.50)),
        p95: round_2(rank(0.95)),
        max: round_2(sorted[sorted.len() - 1]),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    pub calls: usize,
    pub failures: usize,
    pub micros: Stats,
    pub items: Stats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub generated_at_unix_s: u64,
    pub os: &'static str,
    pub arch: &'static str,
    pub accessor: &'static str,
    pub iterations: usize,
    pub interval_ms: u64,
    /// Acquisition time of each sampler cycle.
    pub cycle_elapsed_us: Stats,
    /// Measured gap between cycles, the denominator of every rate.
    pub cycle_interval_ms: Stats,
    pub refresh_us: Stats,
    pub forest_build_us: Stats,
    pub process_count: Stats,
    pub operations: BTreeMap<String, OperationStats>,
}

/// Run `iterations` sampler cycles, each followed by a process refresh and
/// a forest build, sleeping `interval` between iterations.
pub fn capture(
    accessor: Arc<dyn PlatformAccessor>,
    filter: ProcessFilter,
    iterations: usize,
    interval: Duration,
) -> Result<ProfileReport> {
    if iterations == 0 {
        return Err(eyre!("--perf-iterations must be greater than 0"));
    }

    let profiled = Arc::new(ProfilingAccessor::new(accessor));
    let mut state = SamplerState::new();
    let mut collector = Collector::new(Arc::clone(&profiled) as Arc<dyn PlatformAccessor>);
    collector.set_filter(filter);

    let mut cycle_elapsed = Vec::with_capacity(iterations);
    let mut cycle_interval = Vec::with_capacity(iterations);
    let mut refresh = Vec::with_capacity(iterations);
    let mut forest_build = Vec::with_capacity(iterations);
    let mut process_count = Vec::with_capacity(iterations);

    for i in 0..iterations {
        if i > 0 && !interval.is_zero() {
            std::thread::sleep(interval);
        }

        let cycle = state.run_cycle(profiled.as_ref());
        cycle_elapsed.push(as_micros(cycle.elapsed));
        if i > 0 {
            cycle_interval.push(cycle.interval.as_secs_f64() * 1_000.0);
        }

        let started = Instant::now();
        let snapshot = collector.refresh();
        refresh.push(as_micros(started.elapsed()));
        process_count.push(snapshot.processes.len() as f64);

        let started = Instant::now();
        let forest = build_forest(snapshot.processes);
        forest_build.push(as_micros(started.elapsed()));
        tracing::trace!(iteration = i, processes = forest.len(), "profile iteration");
    }

    Ok(ProfileReport {
        generated_at_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| eyre!("system clock is before UNIX_EPOCH: {e}"))?
            .as_secs(),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        accessor: profiled.name(),
        iterations,
        interval_ms: interval.as_millis() as u64,
        cycle_elapsed_us: summarize(&cycle_elapsed),
        cycle_interval_ms: summarize(&cycle_interval),
        refresh_us: summarize(&refresh),
        forest_build_us: summarize(&forest_build),
        process_count: summarize(&process_count),
        operations: profiled.operations(),
    })
}

/// Write the report as JSON and Markdown under `dir`.
pub fn write_report(report: &ProfileReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let json_path = dir.join(PROFILE_JSON);
    let markdown_path = dir.join(PROFILE_MARKDOWN);
    fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    fs::write(&markdown_path, render_markdown(report))?;
    Ok((json_path, markdown_path))
}

pub fn render_markdown(report: &ProfileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Acquisition profile");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- `{}` accessor on `{}` / `{}`, generated at `{}`",
        report.accessor, report.os, report.arch, report.generated_at_unix_s
    );
    let _ = writeln!(
        out,
        "- {} iterations, {} ms apart",
        report.iterations, report.interval_ms
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "| Measure | Count | p50 | p95 | max |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: |");
    for (label, stats) in [
        ("sampler cycle (us)", &report.cycle_elapsed_us),
        ("cycle interval (ms)", &report.cycle_interval_ms),
        ("process refresh (us)", &report.refresh_us),
        ("forest build (us)", &report.forest_build_us),
        ("processes", &report.process_count),
    ] {
        stats_row(&mut out, label, stats);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Accessor calls");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "| Operation | Calls | Failed | p50 us | p95 us | max us | p50 items |"
    );
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: | ---: | ---: |");
    for (name, op) in &report.operations {
        let _ = writeln!(
            out,
            "| `{}` | {} | {} | {:.2} | {:.2} | {:.2} | {} |",
            name, op.calls, op.failures, op.micros.p50, op.micros.p95, op.micros.max, op.items.p50
        );
    }
    out
}

fn stats_row(out: &mut String, label: &str, stats: &Stats) {
    let _ = writeln!(
        out,
        "| {} | {} | {:.2} | {:.2} | {:.2} |",
        label, stats.count, stats.p50, stats.p95, stats.max
    );
}

fn as_micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}

fn round_2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
