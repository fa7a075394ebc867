//! Process, CPU, memory, sensor and network telemetry.
//!
//! [`system::platform::PlatformAccessor`] is the per-OS acquisition seam;
//! everything else (forest building, ordering, rate derivation and the
//! background sampler) works on the normalized records it returns.

pub mod action;
pub mod app;
pub mod config;
pub mod event;
pub mod format;
pub mod logging;
#[cfg(feature = "perf-tracing")]
pub mod perf;
pub mod render;
pub mod system;
