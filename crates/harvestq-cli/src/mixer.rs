//! SHA-256 mixing sink used by the CLI.
//!
//! Each event is folded into a 32-byte chained state together with a
//! counter, its cycle stamp, origin and sequence number. The state never
//! leaves this module except as a short fingerprint.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use harvestq_core::{EventSink, HarvestEvent, RandomSource};
use serde::Serialize;
use sha2::{Digest, Sha256};

struct MixState {
    state: [u8; 32],
    counter: u64,
    events: u64,
    bits: u64,
    per_source: [u64; RandomSource::COUNT],
}

/// Shared handle to the mixing state; [`Sha256Mixer::sink`] feeds it.
#[derive(Clone)]
pub struct Sha256Mixer {
    inner: Arc<Mutex<MixState>>,
}

/// Summary of what the mixer absorbed.
#[derive(Debug, Clone, Serialize)]
pub struct MixSnapshot {
    pub events: u64,
    pub bits_credited: u64,
    pub per_source: Vec<(RandomSource, u64)>,
    /// First 8 bytes of the state, hex. Only meant to show the state moved.
    pub fingerprint: String,
}

impl Sha256Mixer {
    /// Create a mixer. Without a seed, the initial state comes from the OS.
    pub fn new(seed: Option<&[u8]>) -> Self {
        let mut h = Sha256::new();
        match seed {
            Some(s) => h.update(s),
            None => {
                let mut os_random = [0u8; 32];
                getrandom::fill(&mut os_random).expect("OS CSPRNG failed");
                h.update(os_random);
            }
        }
        let state: [u8; 32] = h.finalize().into();

        Self {
            inner: Arc::new(Mutex::new(MixState {
                state,
                counter: 0,
                events: 0,
                bits: 0,
                per_source: [0; RandomSource::COUNT],
            })),
        }
    }

    /// A sink that feeds this mixer.
    pub fn sink(&self) -> MixerSink {
        MixerSink {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn snapshot(&self) -> MixSnapshot {
        let st = lock(&self.inner);
        MixSnapshot {
            events: st.events,
            bits_credited: st.bits,
            per_source: RandomSource::ALL
                .iter()
                .zip(st.per_source)
                .filter(|(_, n)| *n > 0)
                .map(|(&src, n)| (src, n))
                .collect(),
            fingerprint: st.state[..8].iter().map(|b| format!("{b:02x}")).collect(),
        }
    }
}

/// [`EventSink`] half of a [`Sha256Mixer`].
pub struct MixerSink {
    inner: Arc<Mutex<MixState>>,
}

impl EventSink for MixerSink {
    fn process(&mut self, event: &HarvestEvent) {
        let mut st = lock(&self.inner);
        st.counter += 1;

        let mut h = Sha256::new();
        h.update(st.state);
        h.update(st.counter.to_le_bytes());
        h.update(event.counter().to_le_bytes());
        h.update([event.source().index() as u8]);
        h.update(event.sequence().to_le_bytes());
        h.update(event.payload());
        st.state = h.finalize().into();

        st.events += 1;
        st.bits += u64::from(event.bits());
        st.per_source[event.source().index()] += 1;
    }
}

fn lock(m: &Mutex<MixState>) -> MutexGuard<'_, MixState> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
