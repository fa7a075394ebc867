use std::sync::Mutex;

use super::error::AccessError;
use super::platform::PlatformAccessor;
use super::process::{ProcessFilter, ProcessRecord};
use super::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, MemorySummary, NetworkInterfaceCounters,
    SensorReading,
};

/// In-memory accessor whose outputs are set by the test between cycles.
#[derive(Default)]
pub struct ScriptedAccessor {
    processes: Mutex<Vec<ProcessRecord>>,
    cores: Mutex<Vec<CoreSample>>,
    memory: Mutex<Option<MemorySummary>>,
    sensors: Mutex<Vec<SensorReading>>,
    network: Mutex<Vec<NetworkInterfaceCounters>>,
    filesystems: Mutex<Vec<FilesystemEntry>>,
}

impl ScriptedAccessor {
    pub fn set_processes(&self, records: Vec<ProcessRecord>) {
        *self.processes.lock().unwrap() = records;
    }

    pub fn set_cores(&self, cores: Vec<CoreSample>) {
        *self.cores.lock().unwrap() = cores;
    }

    /// `None` makes `acquire_memory` fail.
    pub fn set_memory(&self, memory: Option<MemorySummary>) {
        *self.memory.lock().unwrap() = memory;
    }

    pub fn set_sensors(&self, sensors: Vec<SensorReading>) {
        *self.sensors.lock().unwrap() = sensors;
    }

    pub fn set_network(&self, network: Vec<NetworkInterfaceCounters>) {
        *self.network.lock().unwrap() = network;
    }

    pub fn set_filesystems(&self, entries: Vec<FilesystemEntry>) {
        *self.filesystems.lock().unwrap() = entries;
    }
}

impl PlatformAccessor for ScriptedAccessor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.admits(r))
            .map(|r| ProcessRecord {
                threads: Vec::new(),
                ..r.clone()
            })
            .collect()
    }

    fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.pid == pid)
            .cloned()
            .ok_or(AccessError::NotFound { pid })
    }

    fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
        self.acquire_process(pid).map(|r| r.threads)
    }

    fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
        self.cores.lock().unwrap().clone()
    }

    fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
        self.memory
            .lock()
            .unwrap()
            .clone()
            .ok_or(AccessError::Unsupported("scripted memory"))
    }

    fn acquire_sensors(&self) -> Vec<SensorReading> {
        self.sensors.lock().unwrap().clone()
    }

    fn acquire_batteries(&self) -> Vec<BatteryReading> {
        Vec::new()
    }

    fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters> {
        self.network.lock().unwrap().clone()
    }

    fn acquire_filesystems(&self) -> Vec<FilesystemEntry> {
        self.filesystems.lock().unwrap().clone()
    }
}
