//! Background sampling worker.
//!
//! The worker owns all rate state and hands each finished [`SampleCycle`] to
//! the consumer through a bounded channel; nothing it has sent is touched
//! again. Cancellation is checked between cycles only, so a kernel read in
//! progress always completes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::SamplerError;
use super::platform::PlatformAccessor;
use super::rates::{CpuUsageTracker, NetworkRateTracker, SensorTracker};
use super::snapshot::{CoreSample, MemorySummary, NetworkInterfaceCounters, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// Cycles buffered for a slow consumer before new ones are dropped.
    pub feedback_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            interval: Duration::from_millis(500),
            feedback_capacity: 8,
        }
    }
}

/// Payload delivered once per completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SampleCycle {
    pub seq: u64,
    pub cores: Vec<CoreSample>,
    pub cpu_total: Option<CoreSample>,
    pub memory: MemorySummary,
    pub network: Vec<NetworkInterfaceCounters>,
    pub sensors: Vec<SensorReading>,
    /// Time spent acquiring this cycle.
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Wall time since the previous cycle, the span every delta covers.
    /// Zero on the first cycle.
    #[serde(serialize_with = "serialize_millis")]
    pub interval: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Rate state carried from one cycle to the next.
#[derive(Debug, Default)]
pub struct SamplerState {
    cores: CpuUsageTracker,
    total: CpuUsageTracker,
    network: NetworkRateTracker,
    sensors: SensorTracker,
    last_memory: MemorySummary,
    last_sampled: Option<Instant>,
    seq: u64,
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire everything once and derive rates against the previous cycle.
    pub fn run_cycle(&mut self, accessor: &dyn PlatformAccessor) -> SampleCycle {
        self.run_cycle_at(accessor, Instant::now())
    }

    /// [`run_cycle`](Self::run_cycle) with the sampling instant supplied by
    /// the caller.
    pub fn run_cycle_at(&mut self, accessor: &dyn PlatformAccessor, now: Instant) -> SampleCycle {
        let started = Instant::now();
        self.seq += 1;
        let interval = self
            .last_sampled
            .map_or(Duration::ZERO, |prev| now.saturating_duration_since(prev));
        self.last_sampled = Some(now);

        let raw_cores = accessor.acquire_cpu_cores();
        let cpu_total = CoreSample::aggregate(&raw_cores).map(|mut total| {
            total.busy_percent = self
                .total
                .observe(total.core_id, total.total_ticks, total.idle_ticks);
            total
        });
        let cores = self.cores.update(raw_cores);

        match accessor.acquire_memory() {
            Ok(memory) => self.last_memory = memory,
            Err(err) => {
                tracing::warn!(cycle = self.seq, %err, "memory acquisition failed, keeping previous value");
            }
        }

        let network = self.network.update(accessor.acquire_network_interfaces());
        let sensors = self.sensors.update(accessor.acquire_sensors());

        SampleCycle {
            seq: self.seq,
            cores,
            cpu_total,
            memory: self.last_memory.clone(),
            network,
            sensors,
            elapsed: started.elapsed(),
            interval,
        }
    }
}

pub struct Sampler {
    accessor: Arc<dyn PlatformAccessor>,
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(accessor: Arc<dyn PlatformAccessor>, config: SamplerConfig) -> Self {
        Sampler { accessor, config }
    }

    /// Spawn the worker on the current tokio runtime. The first cycle runs
    /// immediately.
    pub fn start(self) -> SamplerHandle {
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(self.config.feedback_capacity.max(1));

        let worker = tokio::spawn(run_worker(
            self.accessor,
            self.config.interval,
            cancel.clone(),
            Arc::clone(&wake),
            tx,
        ));

        SamplerHandle {
            cancel,
            wake,
            cycles: rx,
            worker: Some(worker),
        }
    }
}

async fn run_worker(
    accessor: Arc<dyn PlatformAccessor>,
    interval: Duration,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    tx: mpsc::Sender<SampleCycle>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut state = SamplerState::new();
    tracing::debug!(accessor = accessor.name(), ?interval, "sampler started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = wake.notified() => ticker.reset(),
        }

        let mut taken = std::mem::take(&mut state);
        let acc = Arc::clone(&accessor);
        let outcome = tokio::task::spawn_blocking(move || {
            let cycle = taken.run_cycle(acc.as_ref());
            (taken, cycle)
        })
        .await;

        let cycle = match outcome {
            Ok((kept, cycle)) => {
                state = kept;
                cycle
            }
            Err(err) => {
                // The state went down with the failed cycle; start over.
                tracing::warn!(%err, "sampling cycle failed, resetting rate state");
                continue;
            }
        };

        match tx.try_send(cycle) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cycle)) => {
                tracing::debug!(cycle = cycle.seq, "consumer lagging, dropping cycle");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("feedback receiver dropped");
                break;
            }
        }
    }

    tracing::debug!("sampler stopped");
}

/// Control surface for a running sampler. Dropping the handle cancels the
/// worker without waiting for it.
pub struct SamplerHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    cycles: mpsc::Receiver<SampleCycle>,
    worker: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Skip the rest of the current wait and sample now.
    pub fn refresh_now(&self) {
        self.wake.notify_one();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub async fn next_cycle(&mut self) -> Option<SampleCycle> {
        self.cycles.recv().await
    }

    pub fn try_next_cycle(&mut self) -> Option<SampleCycle> {
        self.cycles.try_recv().ok()
    }

    /// Wait up to `timeout` for the worker to exit. The handle can be joined
    /// again after a timeout.
    pub async fn join_timeout(&mut self, timeout: Duration) -> Result<(), SamplerError> {
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, worker).await {
            Ok(joined) => {
                self.worker = None;
                match joined {
                    Err(err) if err.is_panic() => Err(SamplerError::WorkerPanicked),
                    _ => Ok(()),
                }
            }
            Err(_) => Err(SamplerError::JoinTimeout(timeout)),
        }
    }

    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), SamplerError> {
        self.cancel();
        self.join_timeout(timeout).await
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
