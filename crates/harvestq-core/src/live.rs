//! Registry of fast hardware sources polled by the consumer loop.
//!
//! [`LiveSources`] is a cloneable handle: hand one clone to
//! [`crate::HarvestQueue::start_with_pump`] and keep another to register or
//! remove sources while the queue runs (device attach/detach).

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::event::HARVEST_SIZE;
use crate::harvestq::Harvester;
use crate::source::{HardwarePump, LiveSource};

/// Default reads per source per consumer iteration.
pub const DEFAULT_FEED_ROUNDS: usize = 1;

/// Shared list of live sources; doubles as the queue's hardware pump.
#[derive(Clone)]
pub struct LiveSources {
    sources: Arc<Mutex<Vec<Box<dyn LiveSource>>>>,
    rounds: usize,
}

impl Default for LiveSources {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSources {
    /// Empty registry reading each source once per feed.
    pub fn new() -> Self {
        Self::with_rounds(DEFAULT_FEED_ROUNDS)
    }

    /// Empty registry reading each source `rounds` times per feed.
    pub fn with_rounds(rounds: usize) -> Self {
        Self {
            sources: Arc::new(Mutex::new(Vec::new())),
            rounds,
        }
    }

    /// Add a source. It is polled from the next consumer iteration on.
    pub fn register(&self, source: Box<dyn LiveSource>) {
        info!(
            "live entropy source registered: {} ({})",
            source.name(),
            source.info().origin
        );
        self.sources.lock().push(source);
    }

    /// Remove every source named `name`. Returns whether any was removed.
    pub fn deregister(&self, name: &str) -> bool {
        let mut sources = self.sources.lock();
        let before = sources.len();
        sources.retain(|s| s.name() != name);
        let removed = sources.len() != before;
        if removed {
            info!("live entropy source deregistered: {name}");
        }
        removed
    }

    /// Names of the registered sources, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.sources.lock().iter().map(|s| s.name()).collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every source and harvest what it returns. Returns bytes read.
    pub fn feed_all(&self, harvester: &Harvester) -> usize {
        let mut buf = [0u8; HARVEST_SIZE];
        let mut total = 0;
        let mut sources = self.sources.lock();
        for source in sources.iter_mut() {
            let (origin, bits_per_byte) = {
                let info = source.info();
                (info.origin, info.bits_per_byte.clamp(0.0, 8.0))
            };
            for _ in 0..self.rounds {
                let n = source.read(&mut buf).min(HARVEST_SIZE);
                if n == 0 {
                    break;
                }
                let bits = (n as f64 * bits_per_byte) as u32;
                harvester.harvest(&buf[..n], bits, origin);
                total += n;
            }
        }
        buf.fill(0);
        total
    }
}

impl HardwarePump for LiveSources {
    fn feed(&mut self, harvester: &Harvester) {
        self.feed_all(harvester);
    }
}
