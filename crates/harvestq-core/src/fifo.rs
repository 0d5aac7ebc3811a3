//! The fixed slot pool and the two FIFOs that partition it.
//!
//! Every slot is always in exactly one of: the free queue, the harvest queue,
//! or the consumer's private batch. All three deques are sized to the pool
//! capacity up front, so moving slots between them never allocates.

use std::collections::VecDeque;

use serde::Serialize;

use crate::event::HarvestEvent;
use crate::source::RandomSource;

pub(crate) type Slot = Box<HarvestEvent>;
pub(crate) type Batch = VecDeque<Slot>;

/// Where the pool's slots are at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    /// Slots available to producers.
    pub free: usize,
    /// Slots holding events awaiting the consumer.
    pub pending: usize,
    /// Slots privately held by the consumer while the sink runs.
    pub in_flight: usize,
    /// Total slots in the pool.
    pub capacity: usize,
}

impl Occupancy {
    /// True when no slot has been lost or duplicated.
    pub fn is_conserved(&self) -> bool {
        self.free + self.pending + self.in_flight == self.capacity
    }
}

/// Free queue, harvest queue and per-origin sequence counters.
pub(crate) struct HarvestFifos {
    empty: Batch,
    harvest: Batch,
    in_flight: usize,
    capacity: usize,
    destination: [u32; RandomSource::COUNT],
}

impl HarvestFifos {
    /// Allocate `capacity` slots, all free.
    pub(crate) fn new(capacity: usize) -> Self {
        let mut empty = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            empty.push_back(Box::new(HarvestEvent::empty()));
        }
        Self {
            empty,
            harvest: VecDeque::with_capacity(capacity),
            in_flight: 0,
            capacity,
            destination: [0; RandomSource::COUNT],
        }
    }

    /// A batch deque the consumer can swap with the harvest queue.
    pub(crate) fn new_batch(&self) -> Batch {
        VecDeque::with_capacity(self.capacity)
    }

    /// Move one free slot to the harvest queue tail, stamped with the sample.
    ///
    /// Returns `false`, leaving everything untouched, when no slot is free.
    pub(crate) fn record(
        &mut self,
        counter: u64,
        entropy: &[u8],
        bits: u32,
        origin: RandomSource,
    ) -> bool {
        let Some(mut slot) = self.empty.pop_front() else {
            return false;
        };
        let seq = &mut self.destination[origin.index()];
        slot.fill(counter, entropy, bits, origin, *seq);
        *seq = seq.wrapping_add(1);
        self.harvest.push_back(slot);
        true
    }

    /// Hand the whole harvest queue to the consumer in O(1).
    ///
    /// `batch` must be empty; it is swapped with the harvest queue so both
    /// keep their pre-sized buffers. Returns the number of events taken.
    pub(crate) fn take_pending(&mut self, batch: &mut Batch) -> usize {
        debug_assert!(batch.is_empty(), "consumer batch still holds slots");
        std::mem::swap(&mut self.harvest, batch);
        self.in_flight = batch.len();
        self.in_flight
    }

    /// Return a consumed batch to the free queue tail, leaving `batch` empty.
    pub(crate) fn recycle(&mut self, batch: &mut Batch) {
        self.empty.extend(batch.drain(..));
        self.in_flight = 0;
    }

    pub(crate) fn free_len(&self) -> usize {
        self.empty.len()
    }

    pub(crate) fn occupancy(&self) -> Occupancy {
        Occupancy {
            free: self.empty.len(),
            pending: self.harvest.len(),
            in_flight: self.in_flight,
            capacity: self.capacity,
        }
    }

    /// Next sequence number for every origin, in [`RandomSource::ALL`] order.
    pub(crate) fn sequences(&self) -> [u32; RandomSource::COUNT] {
        self.destination
    }

    /// Release every slot held by either queue. Returns how many were freed.
    pub(crate) fn reclaim(&mut self) -> usize {
        let n = self.empty.len() + self.harvest.len();
        self.empty = VecDeque::new();
        self.harvest = VecDeque::new();
        self.capacity -= n.min(self.capacity);
        n
    }
}
