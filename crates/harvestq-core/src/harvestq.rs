//! The harvest queue: non-blocking producers, one batching consumer.
//!
//! Architecture:
//! 1. Producers call [`Harvester::harvest`] from any thread; a free slot is
//!    stamped with the sample and appended to the harvest queue
//! 2. The consumer thread swaps the whole harvest queue into a private batch
//! 3. With the lock released, every event in the batch goes to the sink
//! 4. The consumed batch is returned to the free queue
//! 5. The hardware pump runs (unlocked), then the consumer sleeps briefly
//!
//! The lock is never held across sink or pump calls. When the free queue is
//! empty, samples are dropped rather than blocking the producer.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, trace};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::fifo::{HarvestFifos, Occupancy};
use crate::source::{EventSink, HardwarePump, RandomSource};
use crate::timing::cycle_count;

/// Default number of event slots in the pool.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default upper bound on how long the consumer sleeps between drains.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tri-state command word read by the consumer once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum LoopControl {
    /// Exit the consumer loop.
    Terminate = -1,
    /// Drain periodically.
    Run = 0,
    /// Drain now, then acknowledge by returning to `Run`.
    Flush = 1,
}

/// Harvest queue settings.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Number of event slots allocated at start.
    pub capacity: usize,
    /// Longest the consumer sleeps when nothing wakes it.
    pub poll_interval: Duration,
    /// Name given to the consumer thread.
    pub thread_name: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            thread_name: "rand_harvestq".to_string(),
        }
    }
}

struct HarvestState {
    fifos: HarvestFifos,
    /// Only ever `Run` or `Terminate`; a pending flush is
    /// `flush_requested > flush_acked`.
    control: LoopControl,
    /// Flush generations handed out to callers.
    flush_requested: u64,
    /// Highest flush generation whose drain has completed.
    flush_acked: u64,
    exited: bool,
}

impl HarvestState {
    fn flush_pending(&self) -> bool {
        self.flush_requested > self.flush_acked
    }
}

struct Shared {
    state: Mutex<HarvestState>,
    /// Consumer sleeps here.
    wake: Condvar,
    /// Flush and shutdown callers sleep here.
    ack: Condvar,
    /// Free-queue length, written under the lock, read without it.
    free_hint: AtomicUsize,
    harvested: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    batches: AtomicU64,
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Cloneable producer handle.
///
/// Cheap to clone and safe to use from any thread, including after the
/// queue has shut down (samples are then silently dropped).
#[derive(Clone)]
pub struct Harvester {
    shared: Arc<Shared>,
}

impl Harvester {
    /// Record one sample.
    ///
    /// At most [`crate::HARVEST_SIZE`] bytes of `entropy` are kept. `bits` is
    /// the caller's estimate of the entropy the sample carries. Never blocks
    /// on I/O and never allocates; if no slot is free the sample is dropped.
    ///
    /// Must not be used for high-rate sources that would keep the free queue
    /// permanently empty; those belong behind a [`HardwarePump`].
    pub fn harvest(&self, entropy: &[u8], bits: u32, origin: RandomSource) {
        let shared = &*self.shared;

        // Racy on purpose: a stale zero costs one sample, not correctness.
        if shared.free_hint.load(Ordering::Relaxed) == 0 {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut state = shared.state.lock();
        let recorded = state.fifos.record(cycle_count(), entropy, bits, origin);
        if recorded {
            shared
                .free_hint
                .store(state.fifos.free_len(), Ordering::Relaxed);
        }
        drop(state);

        if recorded {
            shared.harvested.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Owned harvest queue context: slot pool, lock and consumer thread.
///
/// Dropping a running queue shuts the consumer down first.
pub struct HarvestQueue {
    harvester: Harvester,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HarvestQueue {
    /// Allocate the slot pool and spawn the consumer.
    ///
    /// Fails if `capacity` is zero or the consumer thread cannot be spawned;
    /// without the consumer nothing is ever delivered, so callers should
    /// treat this as fatal.
    pub fn start<S>(config: HarvestConfig, sink: S) -> io::Result<Self>
    where
        S: EventSink + 'static,
    {
        Self::spawn(config, Box::new(sink), None)
    }

    /// Like [`HarvestQueue::start`], with a pump run once per consumer
    /// iteration.
    pub fn start_with_pump<S, P>(config: HarvestConfig, sink: S, pump: P) -> io::Result<Self>
    where
        S: EventSink + 'static,
        P: HardwarePump + 'static,
    {
        Self::spawn(config, Box::new(sink), Some(Box::new(pump)))
    }

    fn spawn(
        config: HarvestConfig,
        sink: Box<dyn EventSink>,
        pump: Option<Box<dyn HardwarePump>>,
    ) -> io::Result<Self> {
        if config.capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "harvest queue capacity must be non-zero",
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(HarvestState {
                fifos: HarvestFifos::new(config.capacity),
                control: LoopControl::Run,
                flush_requested: 0,
                flush_acked: 0,
                exited: false,
            }),
            wake: Condvar::new(),
            ack: Condvar::new(),
            free_hint: AtomicUsize::new(config.capacity),
            harvested: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let poll_interval = config.poll_interval;
        let handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_consumer(worker_shared, poll_interval, sink, pump))?;

        info!(
            "harvest queue started: {} slots, thread '{}', poll {:?}",
            config.capacity, config.thread_name, config.poll_interval
        );

        Ok(Self {
            harvester: Harvester { shared },
            worker: Mutex::new(Some(handle)),
        })
    }

    /// A producer handle for threads that outlive a borrow of the queue.
    pub fn harvester(&self) -> Harvester {
        self.harvester.clone()
    }

    /// Record one sample. See [`Harvester::harvest`].
    pub fn harvest(&self, entropy: &[u8], bits: u32, origin: RandomSource) {
        self.harvester.harvest(entropy, bits, origin);
    }

    /// Force a drain and wait for it.
    ///
    /// Every event harvested before this call has been handed to the sink
    /// when it returns. Returns immediately once the queue is shutting down.
    pub fn request_flush(&self) {
        let shared = &*self.harvester.shared;
        let mut state = shared.state.lock();
        if state.exited || state.control == LoopControl::Terminate {
            return;
        }
        state.flush_requested += 1;
        let target = state.flush_requested;
        shared.wake.notify_one();
        while state.flush_acked < target && !state.exited {
            shared.ack.wait(&mut state);
        }
        debug!("harvest queue flush {target} acknowledged");
    }

    /// Stop the consumer and wait for it to exit.
    ///
    /// No sink call happens after this returns. Events still queued are
    /// left in place. Calling it again is a no-op. If the sink or pump
    /// panicked, the panic is resumed on the caller.
    pub fn request_shutdown(&self) {
        let shared = &*self.harvester.shared;
        {
            let mut state = shared.state.lock();
            state.control = LoopControl::Terminate;
            shared.wake.notify_one();
            while !state.exited {
                shared.ack.wait(&mut state);
            }
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
            info!("harvest queue stopped");
        }
    }

    /// Shut down (if still running) and release every slot.
    ///
    /// Returns the number of slots reclaimed. Outstanding [`Harvester`]
    /// handles stay valid but drop every sample from here on.
    pub fn teardown(self) -> usize {
        self.request_shutdown();
        let shared = &*self.harvester.shared;
        let mut state = shared.state.lock();
        let reclaimed = state.fifos.reclaim();
        shared.free_hint.store(0, Ordering::Relaxed);
        drop(state);
        info!("harvest queue torn down: {reclaimed} slots released");
        reclaimed
    }

    /// Whether the consumer thread is still looping.
    pub fn is_running(&self) -> bool {
        !self.harvester.shared.state.lock().exited
    }

    /// Current command word.
    pub fn control(&self) -> LoopControl {
        let state = self.harvester.shared.state.lock();
        match state.control {
            LoopControl::Run if state.flush_pending() => LoopControl::Flush,
            control => control,
        }
    }

    /// Slot distribution, read under the lock.
    pub fn occupancy(&self) -> Occupancy {
        self.harvester.shared.state.lock().fifos.occupancy()
    }

    /// Counters and slot distribution as structured data.
    pub fn stats(&self) -> HarvestStats {
        let shared = &*self.harvester.shared;
        let (occupancy, sequences) = {
            let state = shared.state.lock();
            (state.fifos.occupancy(), state.fifos.sequences())
        };

        let per_source = RandomSource::ALL
            .iter()
            .zip(sequences)
            .filter(|(_, next)| *next > 0)
            .map(|(&source, next)| SourceSequence { source, next })
            .collect();

        HarvestStats {
            harvested: shared.harvested.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            delivered: shared.delivered.load(Ordering::Relaxed),
            batches: shared.batches.load(Ordering::Relaxed),
            occupancy,
            per_source,
        }
    }

    fn signal_terminate(&self) {
        let shared = &*self.harvester.shared;
        shared.state.lock().control = LoopControl::Terminate;
        shared.wake.notify_one();
    }
}

impl Drop for HarvestQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            self.signal_terminate();
            if handle.join().is_err() {
                error!("harvest consumer panicked before shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer loop
// ---------------------------------------------------------------------------

/// Marks the loop exited and wakes barrier waiters, including on unwind.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().exited = true;
        self.0.ack.notify_all();
    }
}

fn run_consumer(
    shared: Arc<Shared>,
    poll_interval: Duration,
    mut sink: Box<dyn EventSink>,
    mut pump: Option<Box<dyn HardwarePump>>,
) {
    let _exit = ExitGuard(&shared);
    let harvester = Harvester {
        shared: Arc::clone(&shared),
    };

    let mut state = shared.state.lock();
    let mut batch = state.fifos.new_batch();

    while state.control != LoopControl::Terminate {
        // Only flushes requested before this drain started are covered by it.
        let flush_target = state.flush_requested;

        let taken = state.fifos.take_pending(&mut batch);
        if taken > 0 {
            MutexGuard::unlocked(&mut state, || {
                for event in &batch {
                    sink.process(event);
                }
            });
            state.fifos.recycle(&mut batch);
            shared
                .free_hint
                .store(state.fifos.free_len(), Ordering::Relaxed);
            shared.delivered.fetch_add(taken as u64, Ordering::Relaxed);
            shared.batches.fetch_add(1, Ordering::Relaxed);
            trace!("harvest batch of {taken} events delivered");
        }

        if let Some(pump) = pump.as_mut() {
            MutexGuard::unlocked(&mut state, || pump.feed(&harvester));
        }

        if flush_target > state.flush_acked {
            state.flush_acked = flush_target;
            shared.ack.notify_all();
        }

        if state.control == LoopControl::Run && !state.flush_pending() {
            shared.wake.wait_for(&mut state, poll_interval);
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Queue counters.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestStats {
    /// Samples recorded into a slot.
    pub harvested: u64,
    /// Samples dropped because no slot was free.
    pub dropped: u64,
    /// Events handed to the sink.
    pub delivered: u64,
    /// Non-empty drains performed by the consumer.
    pub batches: u64,
    /// Slot distribution at snapshot time.
    pub occupancy: Occupancy,
    /// Next sequence number of every origin that has recorded anything.
    pub per_source: Vec<SourceSequence>,
}

/// Sequence counter of one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSequence {
    pub source: RandomSource,
    pub next: u32,
}
