use super::PlatformAccessor;
use crate::system::error::AccessError;
use crate::system::process::{ProcessFilter, ProcessRecord};
use crate::system::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, MemorySummary, NetworkInterfaceCounters,
    SensorReading,
};

/// Stand-in for platforms without a decoder: every sequence is empty and
/// every single-entity read fails with `Unsupported`.
pub struct UnsupportedAccessor;

impl PlatformAccessor for UnsupportedAccessor {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn acquire_processes(&self, _filter: &ProcessFilter) -> Vec<ProcessRecord> {
        Vec::new()
    }

    fn acquire_process(&self, _pid: u32) -> Result<ProcessRecord, AccessError> {
        Err(AccessError::Unsupported("process inspection"))
    }

    fn acquire_threads(&self, _pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
        Err(AccessError::Unsupported("thread listing"))
    }

    fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
        Vec::new()
    }

    fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
        Err(AccessError::Unsupported("memory counters"))
    }

    fn acquire_sensors(&self) -> Vec<SensorReading> {
        Vec::new()
    }

    fn acquire_batteries(&self) -> Vec<BatteryReading> {
        Vec::new()
    }

    fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters> {
        Vec::new()
    }

    fn acquire_filesystems(&self) -> Vec<FilesystemEntry> {
        Vec::new()
    }
}
