//! The reusable event record that moves through the harvest queue.

use crate::source::RandomSource;

/// Maximum payload bytes kept per event. Longer samples are truncated.
pub const HARVEST_SIZE: usize = 16;

/// One harvested sample plus its metadata.
///
/// Slots are allocated once when the queue starts and recycled for the
/// lifetime of the queue; the sink only ever sees them by reference.
#[derive(Debug, Clone)]
pub struct HarvestEvent {
    pub(crate) counter: u64,
    pub(crate) entropy: [u8; HARVEST_SIZE],
    pub(crate) size: usize,
    pub(crate) bits: u32,
    pub(crate) source: RandomSource,
    pub(crate) destination: u32,
}

impl HarvestEvent {
    pub(crate) fn empty() -> Self {
        Self {
            counter: 0,
            entropy: [0; HARVEST_SIZE],
            size: 0,
            bits: 0,
            source: RandomSource::Cached,
            destination: 0,
        }
    }

    /// Overwrite this slot with a new sample. Copies at most
    /// [`HARVEST_SIZE`] bytes of `entropy`.
    pub(crate) fn fill(
        &mut self,
        counter: u64,
        entropy: &[u8],
        bits: u32,
        source: RandomSource,
        destination: u32,
    ) {
        let n = entropy.len().min(HARVEST_SIZE);
        self.entropy[..n].copy_from_slice(&entropy[..n]);
        self.entropy[n..].fill(0);
        self.counter = counter;
        self.size = n;
        self.bits = bits;
        self.source = source;
        self.destination = destination;
    }

    /// Cycle counter captured at harvest time.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The significant payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.entropy[..self.size]
    }

    /// Number of significant payload bytes, at most [`HARVEST_SIZE`].
    pub fn size(&self) -> usize {
        self.size
    }

    /// Caller's estimate of the entropy in this sample, in bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Origin tag.
    pub fn source(&self) -> RandomSource {
        self.source
    }

    /// Ordinal of this event among those recorded for its origin.
    pub fn sequence(&self) -> u32 {
        self.destination
    }
}
