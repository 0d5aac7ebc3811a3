//! Entropy origins and the collaborator traits the harvest queue talks to.
//!
//! Every harvested event is tagged with a [`RandomSource`]. The queue consumes
//! two collaborators: an [`EventSink`] that folds finished events into RNG
//! state, and a [`HardwarePump`] that gives fast hardware sources a chance to
//! harvest once per consumer iteration. Fast sources themselves implement
//! [`LiveSource`] and are usually grouped in a [`crate::live::LiveSources`].

use serde::Serialize;

use crate::event::HarvestEvent;
use crate::harvestq::Harvester;

/// Origin of a harvested sample.
///
/// The set is closed: a tag outside it cannot be constructed, so the
/// harvester never has to validate its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomSource {
    /// Seed material saved by a previous run (boot loader, cache files).
    Cached,
    /// Device attach/probe timing.
    Attach,
    /// Keyboard event timing.
    Keyboard,
    /// Pointer event timing.
    Mouse,
    /// Tunnel interface traffic.
    NetTun,
    /// Ethernet traffic.
    NetEther,
    /// Netgraph node traffic.
    #[serde(rename = "net_ng")]
    NetGraph,
    /// Hardware interrupt timing.
    Interrupt,
    /// Software interrupt timing.
    Swi,
    /// CPU `RDRAND`/`RDSEED` instructions.
    PureRdrand,
    /// VirtIO entropy device.
    PureVirtio,
    /// Hardware RNG behind the FIPS `rndtest` health filter.
    PureRndtest,
    /// Host operating system CSPRNG.
    PureOs,
}

impl RandomSource {
    /// Number of distinct origins.
    pub const COUNT: usize = 13;

    /// Every origin, in tag order.
    pub const ALL: [RandomSource; Self::COUNT] = [
        Self::Cached,
        Self::Attach,
        Self::Keyboard,
        Self::Mouse,
        Self::NetTun,
        Self::NetEther,
        Self::NetGraph,
        Self::Interrupt,
        Self::Swi,
        Self::PureRdrand,
        Self::PureVirtio,
        Self::PureRndtest,
        Self::PureOs,
    ];

    /// Dense index of this origin, in `0..COUNT`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short snake_case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Attach => "attach",
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::NetTun => "net_tun",
            Self::NetEther => "net_ether",
            Self::NetGraph => "net_ng",
            Self::Interrupt => "interrupt",
            Self::Swi => "swi",
            Self::PureRdrand => "pure_rdrand",
            Self::PureVirtio => "pure_virtio",
            Self::PureRndtest => "pure_rndtest",
            Self::PureOs => "pure_os",
        }
    }

    /// Whether this is a dedicated noise generator rather than
    /// incidental event timing.
    pub const fn is_pure(self) -> bool {
        matches!(
            self,
            Self::PureRdrand | Self::PureVirtio | Self::PureRndtest | Self::PureOs
        )
    }
}

impl std::fmt::Display for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RandomSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|src| src.name() == s)
            .ok_or_else(|| format!("unknown entropy source '{s}'"))
    }
}

/// Consumer of finished events, typically the CSPRNG's mixing function.
///
/// Called on the consumer thread, once per event, in harvest order, with no
/// queue lock held. It may block, allocate and hash as much as it likes.
pub trait EventSink: Send {
    fn process(&mut self, event: &HarvestEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&HarvestEvent) + Send,
{
    fn process(&mut self, event: &HarvestEvent) {
        self(event)
    }
}

/// Hook run once per consumer iteration, outside the queue lock.
///
/// Implementations harvest whatever their sources produce through the
/// provided [`Harvester`].
pub trait HardwarePump: Send {
    fn feed(&mut self, harvester: &Harvester);
}

impl<F> HardwarePump for F
where
    F: FnMut(&Harvester) + Send,
{
    fn feed(&mut self, harvester: &Harvester) {
        self(harvester)
    }
}

/// Metadata about a fast hardware source.
#[derive(Debug, Clone)]
pub struct LiveSourceInfo {
    /// Unique identifier (e.g. `"rdrand"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Tag stamped on every event this source produces.
    pub origin: RandomSource,
    /// Estimated entropy in bits per byte read, 0.0..=8.0.
    pub bits_per_byte: f64,
}

/// A fast noise generator polled by the consumer loop.
///
/// Only sources that can produce a few bytes cheaply belong here; slow or
/// bursty sources should call the harvester from their own context.
pub trait LiveSource: Send {
    /// Source metadata.
    fn info(&self) -> &LiveSourceInfo;

    /// Fill `buf` with fresh noise. Returns the number of bytes written.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}
