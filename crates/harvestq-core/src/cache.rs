//! Seeding the queue from entropy saved by a previous run.
//!
//! Saved entropy reaches the queue only as ordinary harvests tagged
//! [`RandomSource::Cached`]. This module never touches the filesystem
//! itself: [`EntropyCache`] takes a reader closure, so the caller decides
//! how (and whether) files are opened.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::event::HARVEST_SIZE;
use crate::harvestq::Harvester;
use crate::source::RandomSource;

/// Size of one cache file read, matching a page.
pub const CACHE_READ_SIZE: usize = 4096;

/// Well-known locations of saved entropy, in the order they are tried.
pub const DEFAULT_CACHE_FILES: &[&str] = &[
    "/entropy",
    "/var/db/entropy-file",
    "/var/db/entropy/saved-entropy.1",
    "/var/db/entropy/saved-entropy.2",
    "/var/db/entropy/saved-entropy.3",
    "/var/db/entropy/saved-entropy.4",
    "/var/db/entropy/saved-entropy.5",
    "/var/db/entropy/saved-entropy.6",
    "/var/db/entropy/saved-entropy.7",
    "/var/db/entropy/saved-entropy.8",
];

/// Harvest `data` in [`HARVEST_SIZE`] chunks tagged `Cached`, then zero it.
///
/// Each chunk is credited with one bit per byte. Returns the number of
/// chunks submitted; chunks that hit a full queue are dropped like any
/// other harvest.
pub fn feed_cached(harvester: &Harvester, data: &mut [u8]) -> usize {
    let mut chunks = 0;
    for chunk in data.chunks(HARVEST_SIZE) {
        harvester.harvest(chunk, chunk.len() as u32, RandomSource::Cached);
        chunks += 1;
    }
    data.fill(0);
    chunks
}

#[derive(Debug, Clone)]
struct CacheEntry {
    path: PathBuf,
    already_read: bool,
}

/// Outcome of one [`EntropyCache::load`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheLoadReport {
    /// Files consumed during this pass.
    pub files_read: Vec<PathBuf>,
    /// Bytes fed to the harvester during this pass.
    pub bytes: usize,
    /// Total files consumed over the cache's lifetime.
    pub total_files_read: usize,
}

/// Read-once list of entropy cache files.
///
/// Each file is consumed at most once per process; calling
/// [`EntropyCache::load`] again (e.g. after another volume is mounted)
/// only tries files that have not been read yet.
#[derive(Debug, Clone)]
pub struct EntropyCache {
    entries: Vec<CacheEntry>,
    files_read: usize,
}

impl Default for EntropyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_FILES.iter().map(PathBuf::from))
    }
}

impl EntropyCache {
    /// Cache over the given paths, tried in order.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: paths
                .into_iter()
                .map(|p| CacheEntry {
                    path: p.into(),
                    already_read: false,
                })
                .collect(),
            files_read: 0,
        }
    }

    /// Paths not consumed yet.
    pub fn pending(&self) -> Vec<&Path> {
        self.entries
            .iter()
            .filter(|e| !e.already_read)
            .map(|e| e.path.as_path())
            .collect()
    }

    /// Try every unread file.
    ///
    /// `read` fills the buffer (at most [`CACHE_READ_SIZE`] bytes) and
    /// returns how many bytes it wrote. Files whose read fails are skipped
    /// and retried on the next pass.
    pub fn load<R>(&mut self, harvester: &Harvester, mut read: R) -> CacheLoadReport
    where
        R: FnMut(&Path, &mut [u8]) -> io::Result<usize>,
    {
        let mut report = CacheLoadReport::default();
        let mut data = vec![0u8; CACHE_READ_SIZE];

        for entry in self.entries.iter_mut().filter(|e| !e.already_read) {
            match read(&entry.path, &mut data) {
                Ok(n) => {
                    let n = n.min(data.len());
                    info!(
                        "entropy cache '{}' provides {n} bytes",
                        entry.path.display()
                    );
                    feed_cached(harvester, &mut data[..n]);
                    entry.already_read = true;
                    self.files_read += 1;
                    report.files_read.push(entry.path.clone());
                    report.bytes += n;
                }
                Err(e) => {
                    debug!(
                        "entropy cache '{}' not present or unreadable: {e}",
                        entry.path.display()
                    );
                }
            }
        }

        data.fill(0);
        report.total_files_read = self.files_read;
        debug!("total entropy cache files read so far = {}", self.files_read);
        report
    }
}
