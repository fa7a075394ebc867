pub mod collector;
pub mod enumerate;
pub mod error;
pub mod platform;
pub mod process;
pub mod rates;
pub mod sampler;
pub mod snapshot;
pub mod sort;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::Collector;
pub use error::{AccessError, SamplerError};
pub use platform::{AccessorOptions, PlatformAccessor};
pub use process::{MemoryUsage, ProcessFilter, ProcessRecord, ProcessState};
pub use sampler::{SampleCycle, Sampler, SamplerConfig, SamplerHandle};
pub use sort::SortKey;
pub use tree::{ProcessForest, build_forest, split_subtree, subtree};
