use std::path::PathBuf;

use harvestq_core::{CacheLoadReport, EntropyCache, HarvestConfig, HarvestStats, LiveSources};
use serde::Serialize;

use crate::mixer::{MixSnapshot, Sha256Mixer};

#[derive(Serialize)]
struct SeedReport {
    tried: Vec<PathBuf>,
    load: CacheLoadReport,
    queue: HarvestStats,
    mixer: MixSnapshot,
}

pub fn run(files: &[String], capacity: usize, json: bool) {
    let mut cache = if files.is_empty() {
        EntropyCache::default()
    } else {
        EntropyCache::new(files.iter().map(PathBuf::from))
    };
    let tried: Vec<PathBuf> = cache.pending().iter().map(|p| p.to_path_buf()).collect();

    let config = HarvestConfig {
        capacity,
        ..Default::default()
    };
    let mixer = Sha256Mixer::new(None);
    let queue = super::start_queue_or_exit(config, &mixer, LiveSources::new());

    let load = cache.load(&queue.harvester(), super::read_cache_file);
    queue.request_flush();
    queue.request_shutdown();
    let stats = queue.stats();
    queue.teardown();

    let report = SeedReport {
        tried,
        load,
        queue: stats,
        mixer: mixer.snapshot(),
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    for path in &report.tried {
        let used = report.load.files_read.contains(path);
        let mark = if used { "✓" } else { "✗" };
        println!("  {mark} {}", path.display());
    }
    println!(
        "\n{} of {} cache files read, {} bytes",
        report.load.files_read.len(),
        report.tried.len(),
        report.load.bytes
    );
    println!(
        "{} events harvested, {} dropped, {} delivered to the mixer",
        report.queue.harvested, report.queue.dropped, report.mixer.events
    );
}
