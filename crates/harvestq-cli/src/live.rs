//! Live sources the CLI can register with the consumer's pump.

use harvestq_core::{LiveSource, LiveSourceInfo, RandomSource};

/// Host OS CSPRNG via `getrandom`.
pub struct OsRandom {
    info: LiveSourceInfo,
}

impl OsRandom {
    pub fn new() -> Self {
        Self {
            info: LiveSourceInfo {
                name: "os_random",
                description: "Operating system CSPRNG (getrandom)",
                origin: RandomSource::PureOs,
                bits_per_byte: 8.0,
            },
        }
    }
}

impl Default for OsRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSource for OsRandom {
    fn info(&self) -> &LiveSourceInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        match getrandom::fill(buf) {
            Ok(()) => buf.len(),
            Err(e) => {
                log::warn!("os_random read failed: {e}");
                0
            }
        }
    }
}

/// Timing jitter of a short spin, measured with the cycle counter.
///
/// Only the low byte of each delta is kept; credited at one bit per byte.
pub struct ClockJitter {
    info: LiveSourceInfo,
}

impl ClockJitter {
    pub fn new() -> Self {
        Self {
            info: LiveSourceInfo {
                name: "clock_jitter",
                description: "Cycle-counter jitter across a short busy loop",
                origin: RandomSource::Swi,
                bits_per_byte: 1.0,
            },
        }
    }
}

impl Default for ClockJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSource for ClockJitter {
    fn info(&self) -> &LiveSourceInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        for b in buf.iter_mut() {
            let t0 = harvestq_core::cycle_count();
            let mut acc = 0u64;
            for i in 0..64u64 {
                acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
            }
            let dt = harvestq_core::cycle_count().wrapping_sub(t0);
            *b = (dt ^ acc) as u8;
        }
        buf.len()
    }
}
