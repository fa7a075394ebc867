use serde::Serialize;

use super::process::ProcessRecord;

/// One CPU core's cumulative tick counters at a sampling instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CoreSample {
    /// Logical id as reported by the kernel, which may skip offline cores.
    pub core_id: u32,
    pub total_ticks: u64,
    pub idle_ticks: u64,
    /// Filled in by the rate engine; zero on a raw acquisition.
    pub busy_percent: f32,
}

impl CoreSample {
    pub fn new(core_id: u32, total_ticks: u64, idle_ticks: u64) -> Self {
        CoreSample {
            core_id,
            total_ticks,
            idle_ticks,
            busy_percent: 0.0,
        }
    }

    /// Sum of all cores, reported under `core_id` `u32::MAX`.
    pub fn aggregate(cores: &[CoreSample]) -> Option<CoreSample> {
        if cores.is_empty() {
            return None;
        }
        let (total, idle) = cores.iter().fold((0u64, 0u64), |(t, i), c| {
            (t.saturating_add(c.total_ticks), i.saturating_add(c.idle_ticks))
        });
        Some(CoreSample::new(u32::MAX, total, idle))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GpuMemoryPool {
    pub name: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// System-wide memory counters in bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemorySummary {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub cached_bytes: u64,
    pub buffered_bytes: u64,
    pub shared_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    /// Filesystem-cache specific counter such as the ZFS ARC.
    pub fs_cache_bytes: Option<u64>,
    pub gpu_pools: Vec<GpuMemoryPool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub name: String,
    pub channel: Option<String>,
    /// Hundredths of a degree Celsius for thermal sensors, native units
    /// otherwise.
    pub value: i64,
    /// False when the most recent read failed or the sensor vanished.
    pub valid: bool,
}

impl SensorReading {
    pub fn key(&self) -> (String, Option<String>) {
        (self.name.clone(), self.channel.clone())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatteryReading {
    pub name: String,
    pub vendor: String,
    pub model: String,
    pub full_capacity: u64,
    pub current_charge: u64,
    pub percent: f32,
    /// Absent batteries still occupy a slot so ordering stays stable.
    pub present: bool,
}

/// Cumulative byte counters for one interface plus the derived rate fields
/// filled in by the rate engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NetworkInterfaceCounters {
    pub name: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub peak_in: u64,
    pub peak_out: u64,
    pub delta_in: u64,
    pub delta_out: u64,
    /// First cycle this interface was observed.
    pub is_new: bool,
}

impl NetworkInterfaceCounters {
    pub fn new(name: impl Into<String>, bytes_in: u64, bytes_out: u64) -> Self {
        NetworkInterfaceCounters {
            name: name.into(),
            bytes_in,
            bytes_out,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilesystemEntry {
    pub mount_point: String,
    pub source: String,
    pub fs_type: String,
    /// Platform-specific filesystem magic / type number. Informational only.
    pub type_code: u64,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Everything a consumer needs for one refresh of the process view.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SystemSnapshot {
    /// Seconds since the Unix epoch.
    pub taken_at: u64,
    pub processes: Vec<ProcessRecord>,
    pub cores: Vec<CoreSample>,
    pub cpu_total: Option<CoreSample>,
    pub memory: MemorySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_sums_all_cores() {
        let cores = [CoreSample::new(0, 200, 100), CoreSample::new(2, 300, 50)];
        let total = CoreSample::aggregate(&cores).unwrap();
        assert_eq!(total.total_ticks, 500);
        assert_eq!(total.idle_ticks, 150);
        assert!(CoreSample::aggregate(&[]).is_none());
    }
}
