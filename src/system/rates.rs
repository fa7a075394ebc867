//! Delta computation over consecutive raw snapshots.
//!
//! Every tracker here follows the same bootstrap rule: the first observation
//! of a counter only records a baseline and reports a zero rate. A counter
//! that goes backwards (or whose baseline was zero) is treated as reset and
//! yields a zero delta instead of an unsigned underflow. Process CPU time is
//! the exception: its key already pins the process instance, so a zero
//! baseline is a real reading.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::process::ProcessRecord;
use super::snapshot::{CoreSample, NetworkInterfaceCounters, SensorReading};

/// Delta between two cumulative counter readings.
pub fn counter_delta(previous: Option<u64>, current: u64) -> u64 {
    match previous {
        None | Some(0) => 0,
        Some(prev) if current < prev => 0,
        Some(prev) => current - prev,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct InterfaceState {
    prev_in: u64,
    prev_out: u64,
    peak_in: u64,
    peak_out: u64,
    present: bool,
}

/// Per-interface byte deltas and peaks across sampling cycles.
#[derive(Debug, Default)]
pub struct NetworkRateTracker {
    entries: HashMap<String, InterfaceState>,
}

impl NetworkRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    pub fn update(&mut self, current: Vec<NetworkInterfaceCounters>) -> Vec<NetworkInterfaceCounters> {
        for state in self.entries.values_mut() {
            state.present = false;
        }

        let mut out = Vec::with_capacity(current.len());
        for mut counters in current {
            match self.entries.get_mut(&counters.name) {
                Some(state) => {
                    counters.delta_in = counter_delta(Some(state.prev_in), counters.bytes_in);
                    counters.delta_out = counter_delta(Some(state.prev_out), counters.bytes_out);
                    state.peak_in = state.peak_in.max(counters.delta_in);
                    state.peak_out = state.peak_out.max(counters.delta_out);
                    state.prev_in = counters.bytes_in;
                    state.prev_out = counters.bytes_out;
                    state.present = true;
                    counters.peak_in = state.peak_in;
                    counters.peak_out = state.peak_out;
                    counters.is_new = false;
                }
                None => {
                    tracing::debug!(interface = %counters.name, "tracking new interface");
                    self.entries.insert(
                        counters.name.clone(),
                        InterfaceState {
                            prev_in: counters.bytes_in,
                            prev_out: counters.bytes_out,
                            present: true,
                            ..Default::default()
                        },
                    );
                    counters.delta_in = 0;
                    counters.delta_out = 0;
                    counters.peak_in = 0;
                    counters.peak_out = 0;
                    counters.is_new = true;
                }
            }
            out.push(counters);
        }

        self.entries.retain(|name, state| {
            if !state.present {
                tracing::debug!(interface = %name, "interface removed");
            }
            state.present
        });
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct CoreState {
    total: u64,
    idle: u64,
    percent: f32,
}

/// Busy percentage per core from consecutive (total, idle) tick pairs.
#[derive(Debug, Default)]
pub struct CpuUsageTracker {
    cores: HashMap<u32, CoreState>,
}

impl CpuUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, samples: Vec<CoreSample>) -> Vec<CoreSample> {
        let present: HashSet<u32> = samples.iter().map(|s| s.core_id).collect();
        self.cores.retain(|id, _| present.contains(id));

        samples
            .into_iter()
            .map(|mut sample| {
                sample.busy_percent = self.observe(sample.core_id, sample.total_ticks, sample.idle_ticks);
                sample
            })
            .collect()
    }

    /// Record one core reading and return its busy percentage.
    pub fn observe(&mut self, core_id: u32, total: u64, idle: u64) -> f32 {
        let percent = match self.cores.get(&core_id) {
            None => 0.0,
            Some(prev) => busy_percent(prev, total, idle),
        };
        self.cores.insert(
            core_id,
            CoreState {
                total,
                idle,
                percent,
            },
        );
        percent
    }
}

fn busy_percent(prev: &CoreState, total: u64, idle: u64) -> f32 {
    if total <= prev.total {
        return prev.percent;
    }
    let delta_total = total - prev.total;
    let delta_idle = idle.saturating_sub(prev.idle).min(delta_total);
    let delta_busy = delta_total - delta_idle;
    (100.0 * delta_busy as f64 / delta_total as f64) as f32
}

#[derive(Debug, Clone, Copy)]
struct ProcessCpuState {
    cpu_time_us: u64,
    seen_at: Instant,
}

/// Per-process CPU percentage and "new this sample" tracking.
///
/// Processes are keyed by `(pid, tid, start_time)` so a recycled pid is not
/// mistaken for the process that previously held it.
#[derive(Debug, Default)]
pub struct ProcessCpuTracker {
    previous: HashMap<(u32, u32, u64), ProcessCpuState>,
    primed: bool,
}

impl ProcessCpuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `cpu_percent` and `is_new` on freshly acquired records.
    /// Percentages are relative to one core, so a busy multithreaded
    /// process can exceed 100.
    pub fn update(&mut self, records: &mut [ProcessRecord], now: Instant) {
        let mut next = HashMap::with_capacity(records.len());
        for record in records.iter_mut() {
            self.apply(record, now, &mut next);
            for thread in record.threads.iter_mut() {
                self.apply(thread, now, &mut next);
            }
        }
        self.previous = next;
        self.primed = true;
    }

    fn apply(
        &self,
        record: &mut ProcessRecord,
        now: Instant,
        next: &mut HashMap<(u32, u32, u64), ProcessCpuState>,
    ) {
        let key = (record.pid, record.tid, record.start_time);
        match self.previous.get(&key) {
            Some(prev) => {
                let wall_us = now.saturating_duration_since(prev.seen_at).as_micros() as u64;
                let used_us = record.cpu_time_us.saturating_sub(prev.cpu_time_us);
                record.cpu_percent = if wall_us == 0 {
                    0.0
                } else {
                    (100.0 * used_us as f64 / wall_us as f64) as f32
                };
                record.is_new = false;
            }
            None => {
                record.cpu_percent = 0.0;
                record.is_new = self.primed;
            }
        }
        next.insert(
            key,
            ProcessCpuState {
                cpu_time_us: record.cpu_time_us,
                seen_at: now,
            },
        );
    }
}

/// Sensor identity: name, channel and the occurrence index among readings
/// sharing both, so two identical chips keep separate slots.
type SensorSlot = (String, Option<String>, usize);

fn slotted(readings: Vec<SensorReading>) -> Vec<(SensorSlot, SensorReading)> {
    let mut occurrences: HashMap<(String, Option<String>), usize> = HashMap::new();
    readings
        .into_iter()
        .map(|reading| {
            let (name, channel) = reading.key();
            let index = occurrences.entry((name.clone(), channel.clone())).or_insert(0);
            let slot = (name, channel, *index);
            *index += 1;
            (slot, reading)
        })
        .collect()
}

/// Keeps sensors that have disappeared visible as invalid readings so their
/// slots do not jump around between cycles.
#[derive(Debug, Default)]
pub struct SensorTracker {
    known: Vec<(SensorSlot, SensorReading)>,
}

impl SensorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, current: Vec<SensorReading>) -> Vec<SensorReading> {
        let mut fresh: HashMap<SensorSlot, SensorReading> = slotted(current).into_iter().collect();

        for (slot, known) in self.known.iter_mut() {
            match fresh.remove(slot) {
                Some(reading) => *known = reading,
                None => known.valid = false,
            }
        }

        let mut added: Vec<(SensorSlot, SensorReading)> = fresh.into_iter().collect();
        added.sort_by(|a, b| a.0.cmp(&b.0));
        self.known.extend(added);
        self.known.iter().map(|(_, reading)| reading.clone()).collect()
    }
}
