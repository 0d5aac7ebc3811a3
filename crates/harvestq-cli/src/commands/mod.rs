pub mod run;
pub mod seed;
pub mod sources;

use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use harvestq_core::{HarvestConfig, HarvestQueue, HardwarePump, LiveSources};

use crate::live::{ClockJitter, OsRandom};
use crate::mixer::Sha256Mixer;

/// Start a queue feeding `mixer`, or exit: without a consumer nothing works.
pub fn start_queue_or_exit<P>(config: HarvestConfig, mixer: &Sha256Mixer, pump: P) -> HarvestQueue
where
    P: HardwarePump + 'static,
{
    match HarvestQueue::start_with_pump(config, mixer.sink(), pump) {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("Error: cannot start harvest consumer: {e}");
            std::process::exit(1);
        }
    }
}

/// Build the live-source registry from CLI names.
pub fn make_live_sources(names: &[String]) -> LiveSources {
    let live = LiveSources::new();
    for name in names {
        match name.as_str() {
            "os_random" => live.register(Box::new(OsRandom::new())),
            "clock_jitter" => live.register(Box::new(ClockJitter::new())),
            other => eprintln!("Warning: unknown live source '{other}', skipping"),
        }
    }
    live
}

/// Read up to `buf.len()` bytes of a cache file.
pub fn read_cache_file(path: &Path, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = std::fs::File::open(path)?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Parse a duration string like "30s", "5m", "1h", "100ms".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        // Assume seconds
        (s, 1000)
    };

    let value: u64 = numeric.trim().parse().ok()?;
    Some(Duration::from_millis(value.saturating_mul(multiplier)))
}
