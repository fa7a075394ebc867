//! Plain-text and JSON views over snapshots, sample cycles and the process
//! forest. Every view is a pure function returning a `String`; lines carry
//! no trailing whitespace.

use std::fmt::Write;

use serde::Serialize;

use crate::format::{
    format_bytes, format_centi_celsius, format_cpu_time, format_duration_secs, format_percent,
    format_rate, pad_unicode,
};
use crate::system::enumerate::{network_totals, usage_percent};
use crate::system::process::ProcessRecord;
use crate::system::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, MemorySummary, NetworkInterfaceCounters,
    SensorReading,
};
use crate::system::tree::{FlatEntry, ProcessForest};

const COMMAND_WIDTH: usize = 48;

fn push_line(out: &mut String, line: &str) {
    out.push_str(line.trim_end());
    out.push('\n');
}

macro_rules! process_row {
    ($($arg:expr),* $(,)?) => {
        format!(
            "{:>7} {:>7} {:>5} {:>3} {:>3} {} {:>6} {:>9} {:>9} {:>4} {:>10}",
            $($arg),*
        )
    };
}

fn process_columns(record: &ProcessRecord) -> String {
    let id = if record.is_thread() {
        record.tid
    } else {
        record.pid
    };
    process_row!(
        id,
        record.ppid,
        record.uid,
        record.priority,
        record.nice,
        record.state.code(),
        format_percent(record.cpu_percent),
        format_bytes(record.memory.resident_bytes),
        format_bytes(record.memory.virtual_bytes),
        record.num_threads,
        format_cpu_time(record.cpu_time_us),
    )
}

fn process_header() -> String {
    format!(
        "{} COMMAND",
        process_row!("PID", "PPID", "UID", "PRI", "NI", "S", "CPU%", "RSS", "VIRT", "THR", "TIME")
    )
}

/// One row per record; attached threads follow their owner, marked `+`.
pub fn process_table(records: &[ProcessRecord]) -> String {
    let mut out = String::new();
    push_line(&mut out, &process_header());
    for record in records {
        let marker = if record.is_new { "*" } else { "" };
        push_line(
            &mut out,
            &format!(
                "{} {}{}",
                process_columns(record),
                marker,
                pad_unicode(record.display_command(), COMMAND_WIDTH)
            ),
        );
        for thread in &record.threads {
            push_line(
                &mut out,
                &format!(
                    "{} +{}",
                    process_columns(thread),
                    pad_unicode(thread.display_command(), COMMAND_WIDTH)
                ),
            );
        }
    }
    out
}

/// Connector prefix for one tree row, `├─`/`└─` style.
pub fn tree_prefix(entry: &FlatEntry<'_>) -> String {
    if entry.depth == 0 {
        return String::new();
    }
    let mut prefix = String::new();
    for &last in entry.ancestors_last.iter().skip(1) {
        prefix.push_str(if last { "   " } else { "│  " });
    }
    prefix.push_str(if entry.is_last { "└─ " } else { "├─ " });
    prefix
}

pub fn process_tree(forest: &ProcessForest) -> String {
    #[cfg(feature = "perf-tracing")]
    let _span = tracing::debug_span!("render.process_tree").entered();

    let mut out = String::new();
    push_line(&mut out, &process_header());
    for entry in forest.flatten() {
        push_line(
            &mut out,
            &format!(
                "{} {}{}",
                process_columns(entry.record),
                tree_prefix(&entry),
                pad_unicode(entry.record.display_command(), COMMAND_WIDTH)
            ),
        );
    }
    out
}

pub fn cores_view(cores: &[CoreSample], total: Option<&CoreSample>) -> String {
    let mut out = String::new();
    if let Some(total) = total {
        push_line(&mut out, &format!("cpu  {:>6}", format_percent(total.busy_percent)));
    }
    for core in cores {
        push_line(
            &mut out,
            &format!("cpu{:<2} {:>6}", core.core_id, format_percent(core.busy_percent)),
        );
    }
    out
}

pub fn memory_view(memory: &MemorySummary) -> String {
    let mut out = String::new();
    let row = |label: &str, value: u64| format!("{label:<10} {:>10}", format_bytes(value));
    push_line(&mut out, &row("total", memory.total_bytes));
    push_line(&mut out, &row("used", memory.used_bytes));
    push_line(&mut out, &row("cached", memory.cached_bytes));
    push_line(&mut out, &row("buffers", memory.buffered_bytes));
    push_line(&mut out, &row("shared", memory.shared_bytes));
    push_line(&mut out, &row("swap", memory.swap_total_bytes));
    push_line(&mut out, &row("swap used", memory.swap_used_bytes));
    if let Some(arc) = memory.fs_cache_bytes {
        push_line(&mut out, &row("fs cache", arc));
    }
    for pool in &memory.gpu_pools {
        push_line(
            &mut out,
            &format!(
                "{:<10} {:>10} / {}",
                pool.name,
                format_bytes(pool.used_bytes),
                format_bytes(pool.total_bytes)
            ),
        );
    }
    out
}

fn is_fan(reading: &SensorReading) -> bool {
    reading
        .channel
        .as_deref()
        .is_some_and(|c| c.to_ascii_lowercase().contains("fan"))
}

pub fn sensors_view(sensors: &[SensorReading]) -> String {
    let mut out = String::new();
    for reading in sensors {
        let label = match &reading.channel {
            Some(channel) => format!("{}/{}", reading.name, channel),
            None => reading.name.clone(),
        };
        let value = if !reading.valid {
            "n/a".to_string()
        } else if is_fan(reading) {
            format!("{} RPM", reading.value)
        } else {
            format_centi_celsius(reading.value)
        };
        push_line(&mut out, &format!("{} {value}", pad_unicode(&label, 32)));
    }
    out
}

pub fn batteries_view(batteries: &[BatteryReading]) -> String {
    let mut out = String::new();
    for battery in batteries {
        if !battery.present {
            push_line(&mut out, &format!("{:<12} absent", battery.name));
            continue;
        }
        push_line(
            &mut out,
            &format!(
                "{:<12} {:>6} {}/{} {} {}",
                battery.name,
                format_percent(battery.percent),
                battery.current_charge,
                battery.full_capacity,
                battery.vendor,
                battery.model
            ),
        );
    }
    out
}

/// Interface counters plus per-second rates for the sampling interval.
pub fn network_view(interfaces: &[NetworkInterfaceCounters], interval_secs: f64) -> String {
    let mut out = String::new();
    for iface in interfaces {
        push_line(
            &mut out,
            &format!(
                "{:<12} in {:>12} out {:>12} total {:>9} / {}",
                iface.name,
                format_rate(iface.delta_in, interval_secs),
                format_rate(iface.delta_out, interval_secs),
                format_bytes(iface.bytes_in),
                format_bytes(iface.bytes_out)
            ),
        );
    }
    let (total_in, total_out) = network_totals(interfaces);
    let _ = writeln!(
        out,
        "{:<12} in {:>12} out {:>12}",
        "all",
        format_rate(total_in, interval_secs),
        format_rate(total_out, interval_secs)
    );
    out
}

pub fn filesystems_view(entries: &[FilesystemEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        push_line(
            &mut out,
            &format!(
                "{} {:<8} {:>9} {:>9} {:>6}",
                pad_unicode(&entry.mount_point, 24),
                entry.fs_type,
                format_bytes(entry.used_bytes),
                format_bytes(entry.total_bytes),
                format_percent(usage_percent(entry))
            ),
        );
    }
    out
}

/// One-line header for the process views.
pub fn summary_line(process_count: usize, uptime_secs: Option<u64>, sort_label: &str) -> String {
    let mut line = format!("{process_count} processes, sorted by {sort_label}");
    if let Some(uptime) = uptime_secs {
        let _ = write!(line, ", up {}", format_duration_secs(uptime));
    }
    line
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;
    use crate::system::tree::build_forest;

    fn proc(pid: u32, ppid: u32, command: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            ppid,
            command: command.to_string(),
            ..Default::default()
        }
    }

    fn commands(view: &str) -> Vec<String> {
        let column = process_header().find("COMMAND").unwrap_or(0);
        view.lines()
            .skip(1)
            .map(|line| line[column..].to_string())
            .collect()
    }

    #[test]
    fn tree_connectors() {
        let forest = build_forest(vec![
            proc(1, 0, "init"),
            proc(2, 1, "sshd"),
            proc(3, 2, "bash"),
            proc(4, 1, "cron"),
            proc(5, 4, "job"),
        ]);
        let view = process_tree(&forest);
        assert_debug_snapshot!(commands(&view), @r#"
        [
            "init",
            "├─ sshd",
            "│  └─ bash",
            "└─ cron",
            "   └─ job",
        ]
        "#);
    }

    #[test]
    fn table_marks_new_and_threads() {
        let mut parent = proc(10, 1, "worker");
        parent.is_new = true;
        parent.threads = vec![ProcessRecord {
            pid: 10,
            tid: 11,
            command: "worker".to_string(),
            ..Default::default()
        }];
        let view = process_table(&[parent]);
        let lines: Vec<&str> = view.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("*worker"));
        assert!(lines[2].trim_start().starts_with("11 "));
        assert!(lines[2].ends_with("+worker"));
        assert!(view.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn sensors_show_units() {
        let sensors = vec![
            SensorReading {
                name: "coretemp".to_string(),
                channel: Some("Core 0".to_string()),
                value: 4550,
                valid: true,
            },
            SensorReading {
                name: "nct6775".to_string(),
                channel: Some("fan1".to_string()),
                value: 1200,
                valid: true,
            },
            SensorReading {
                name: "gone".to_string(),
                channel: None,
                value: 0,
                valid: false,
            },
        ];
        let view = sensors_view(&sensors);
        let lines: Vec<&str> = view.lines().collect();
        assert!(lines[0].ends_with("45.5°C"));
        assert!(lines[1].ends_with("1200 RPM"));
        assert!(lines[2].ends_with("n/a"));
    }

    #[test]
    fn network_includes_totals() {
        let mut eth = NetworkInterfaceCounters::new("eth0", 4096, 2048);
        eth.delta_in = 2048;
        eth.delta_out = 1024;
        let view = network_view(&[eth], 1.0);
        assert!(view.contains("eth0"));
        assert!(view.lines().last().is_some_and(|l| l.starts_with("all")));
        assert!(view.contains("2 KB/s"));
    }

    #[test]
    fn network_rate_spans_the_sampling_interval() {
        use std::time::{Duration, Instant};

        use crate::system::sampler::SamplerState;
        use crate::system::testing::ScriptedAccessor;

        let accessor = ScriptedAccessor::default();
        let mut state = SamplerState::new();
        let start = Instant::now();

        accessor.set_network(vec![NetworkInterfaceCounters::new("eth0", 1000, 0)]);
        state.run_cycle_at(&accessor, start);
        accessor.set_network(vec![NetworkInterfaceCounters::new("eth0", 501_000, 0)]);
        let cycle = state.run_cycle_at(&accessor, start + Duration::from_millis(500));

        assert_eq!(cycle.network[0].delta_in, 500_000);
        let view = network_view(&cycle.network, cycle.interval.as_secs_f64());
        let first = view.lines().next().unwrap_or_default();
        assert!(first.contains("977 KB/s"), "{first}");
    }

    #[test]
    fn cores_total_first() {
        let mut total = CoreSample::new(u32::MAX, 200, 100);
        total.busy_percent = 50.0;
        let mut core = CoreSample::new(0, 100, 50);
        core.busy_percent = 50.0;
        let view = cores_view(&[core], Some(&total));
        assert_eq!(view, "cpu   50.0%\ncpu0   50.0%\n");
    }

    #[test]
    fn memory_lists_optional_rows() {
        let memory = MemorySummary {
            total_bytes: 8 << 30,
            fs_cache_bytes: Some(1 << 30),
            ..Default::default()
        };
        let view = memory_view(&memory);
        assert!(view.starts_with("total"));
        assert!(view.contains("fs cache"));
    }

    #[test]
    fn json_payload_is_valid() {
        let forest = build_forest(vec![proc(1, 0, "init"), proc(2, 1, "sh")]);
        let json = to_json(&forest).unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["children"][0]["pid"], 2);
    }

    #[test]
    fn summary_with_uptime() {
        assert_eq!(
            summary_line(3, Some(3_661), "cpu"),
            "3 processes, sorted by cpu, up 01:01:01"
        );
    }
}
