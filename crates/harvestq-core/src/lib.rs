//! # harvestq-core
//!
//! A bounded entropy harvest queue. Any number of producers (interrupt-like
//! callbacks, device drivers, timing probes) record small samples without
//! blocking; one consumer thread batches them out to a sink that folds them
//! into a CSPRNG.
//!
//! ## Quick Start
//!
//! ```no_run
//! use harvestq_core::{HarvestConfig, HarvestEvent, HarvestQueue, RandomSource};
//!
//! let queue = HarvestQueue::start(HarvestConfig::default(), |ev: &HarvestEvent| {
//!     // mix ev.payload() into RNG state
//!     let _ = ev.payload();
//! })
//! .expect("spawn harvest consumer");
//!
//! queue.harvest(&42u64.to_le_bytes(), 2, RandomSource::Interrupt);
//! queue.request_flush();
//! queue.request_shutdown();
//! ```
//!
//! ## Architecture
//!
//! Producer → (lock) harvest queue → (lock, O(1) swap) private batch →
//! (unlocked) sink → (lock) free queue → producer
//!
//! The slot pool is allocated once; a full pool drops samples instead of
//! growing. The lock is never held across the sink or the hardware pump.

pub mod cache;
pub mod event;
pub mod fifo;
pub mod harvestq;
pub mod live;
pub mod source;
pub mod timing;

pub use cache::{CacheLoadReport, DEFAULT_CACHE_FILES, EntropyCache, feed_cached};
pub use event::{HARVEST_SIZE, HarvestEvent};
pub use fifo::Occupancy;
pub use harvestq::{
    DEFAULT_CAPACITY, DEFAULT_POLL_INTERVAL, HarvestConfig, HarvestQueue, HarvestStats,
    Harvester, LoopControl, SourceSequence,
};
pub use live::LiveSources;
pub use source::{EventSink, HardwarePump, LiveSource, LiveSourceInfo, RandomSource};
pub use timing::cycle_count;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
