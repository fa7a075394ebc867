use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::error::AccessError;
use super::platform::{self, AccessorOptions, PlatformAccessor};
use super::process::{ProcessFilter, ProcessRecord};
use super::rates::{CpuUsageTracker, ProcessCpuTracker};
use super::snapshot::{CoreSample, MemorySummary, SystemSnapshot};

/// Synchronous refresh for a consumer that drives its own tick.
pub struct Collector {
    accessor: Arc<dyn PlatformAccessor>,
    filter: ProcessFilter,
    include_threads: bool,
    process_cpu: ProcessCpuTracker,
    cores: CpuUsageTracker,
    total: CpuUsageTracker,
    last_memory: MemorySummary,
}

impl Collector {
    pub fn new(accessor: Arc<dyn PlatformAccessor>) -> Self {
        Collector {
            accessor,
            filter: ProcessFilter::default(),
            include_threads: false,
            process_cpu: ProcessCpuTracker::new(),
            cores: CpuUsageTracker::new(),
            total: CpuUsageTracker::new(),
            last_memory: MemorySummary::default(),
        }
    }

    pub fn native(options: AccessorOptions) -> Self {
        Self::new(platform::native(options))
    }

    pub fn accessor(&self) -> Arc<dyn PlatformAccessor> {
        Arc::clone(&self.accessor)
    }

    pub fn filter(&self) -> ProcessFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: ProcessFilter) {
        self.filter = filter;
    }

    /// Attach each process's thread list on refresh.
    pub fn set_include_threads(&mut self, include: bool) {
        self.include_threads = include;
    }

    pub fn refresh(&mut self) -> SystemSnapshot {
        #[cfg(feature = "perf-tracing")]
        let _refresh_span = tracing::debug_span!("collector.refresh").entered();

        let mut processes = self.accessor.acquire_processes(&self.filter);
        if self.include_threads {
            for record in processes.iter_mut() {
                match self.accessor.acquire_threads(record.pid) {
                    Ok(threads) => record.threads = threads,
                    Err(err) => tracing::trace!(pid = record.pid, %err, "no thread list"),
                }
            }
        }
        self.process_cpu.update(&mut processes, Instant::now());

        let raw_cores = self.accessor.acquire_cpu_cores();
        let cpu_total = CoreSample::aggregate(&raw_cores).map(|mut total| {
            total.busy_percent = self
                .total
                .observe(total.core_id, total.total_ticks, total.idle_ticks);
            total
        });
        let cores = self.cores.update(raw_cores);

        match self.accessor.acquire_memory() {
            Ok(memory) => self.last_memory = memory,
            Err(err) => tracing::warn!(%err, "memory acquisition failed, keeping previous value"),
        }

        tracing::debug!(processes = processes.len(), cores = cores.len(), "refreshed");

        SystemSnapshot {
            taken_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            processes,
            cores,
            cpu_total,
            memory: self.last_memory.clone(),
        }
    }

    /// One process with its threads, bypassing the rate state.
    pub fn process_detail(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
        self.accessor.acquire_process(pid)
    }
}
