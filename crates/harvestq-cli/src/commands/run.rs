use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use harvestq_core::{CacheLoadReport, EntropyCache, HarvestConfig, HarvestStats, RandomSource};
use serde::Serialize;

use crate::mixer::{MixSnapshot, Sha256Mixer};

pub struct RunCommandConfig<'a> {
    pub capacity: usize,
    pub producers: usize,
    pub duration: &'a str,
    pub interval_us: u64,
    pub poll_ms: u64,
    pub seed_files: &'a [String],
    pub live: &'a [String],
    pub json: bool,
}

#[derive(Serialize)]
struct RunReport {
    elapsed_secs: f64,
    producers: usize,
    attempts: u64,
    seed: Option<CacheLoadReport>,
    live_sources: Vec<&'static str>,
    queue: HarvestStats,
    mixer: MixSnapshot,
    slots_reclaimed: usize,
}

pub fn run(cfg: RunCommandConfig<'_>) {
    let Some(duration) = super::parse_duration(cfg.duration) else {
        eprintln!("Invalid duration: {}", cfg.duration);
        std::process::exit(1);
    };

    let config = HarvestConfig {
        capacity: cfg.capacity,
        poll_interval: Duration::from_millis(cfg.poll_ms),
        ..Default::default()
    };
    let mixer = Sha256Mixer::new(None);
    let live = super::make_live_sources(cfg.live);
    let queue = super::start_queue_or_exit(config, &mixer, live.clone());

    let seed = if cfg.seed_files.is_empty() {
        None
    } else {
        let mut cache = EntropyCache::new(cfg.seed_files.iter().map(PathBuf::from));
        Some(cache.load(&queue.harvester(), super::read_cache_file))
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }

    if !cfg.json {
        println!(
            "Harvesting for {:?}: {} producers, {} slots, live sources: [{}]",
            duration,
            cfg.producers,
            cfg.capacity,
            live.names().join(", ")
        );
    }

    let interval = Duration::from_micros(cfg.interval_us);
    let started = Instant::now();
    let deadline = started + duration;
    let attempts: u64 = std::thread::scope(|s| {
        let handles: Vec<_> = (0..cfg.producers)
            .map(|_| {
                let harvester = queue.harvester();
                let running = &running;
                s.spawn(move || {
                    let mut n = 0u64;
                    let mut last = harvestq_core::cycle_count();
                    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
                        if !interval.is_zero() {
                            std::thread::sleep(interval);
                        }
                        let now = harvestq_core::cycle_count();
                        let delta = now.wrapping_sub(last);
                        last = now;
                        harvester.harvest(&delta.to_le_bytes(), 2, RandomSource::Interrupt);
                        n += 1;
                    }
                    n
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    });

    queue.request_flush();
    queue.request_shutdown();
    let stats = queue.stats();
    let slots_reclaimed = queue.teardown();

    let report = RunReport {
        elapsed_secs: started.elapsed().as_secs_f64(),
        producers: cfg.producers,
        attempts,
        seed,
        live_sources: live.names(),
        queue: stats,
        mixer: mixer.snapshot(),
        slots_reclaimed,
    };

    if cfg.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn print_report(r: &RunReport) {
    println!("\n{}", "=".repeat(60));
    println!("HARVEST QUEUE REPORT");
    println!("{}", "=".repeat(60));
    println!("Elapsed:    {:.2}s", r.elapsed_secs);
    if let Some(seed) = &r.seed {
        println!(
            "Seed files: {} read, {} bytes",
            seed.files_read.len(),
            seed.bytes
        );
    }
    println!(
        "Harvested:  {} of {} producer attempts (+ seed/live)",
        r.queue.harvested, r.attempts
    );
    let offered = r.queue.harvested + r.queue.dropped;
    let drop_pct = if offered > 0 {
        r.queue.dropped as f64 / offered as f64 * 100.0
    } else {
        0.0
    };
    println!("Dropped:    {} ({drop_pct:.1}%)", r.queue.dropped);
    println!(
        "Delivered:  {} in {} batches",
        r.queue.delivered, r.queue.batches
    );
    println!("Reclaimed:  {} slots", r.slots_reclaimed);

    println!("\n{:<16} {:>10}", "Source", "Events");
    println!("{}", "-".repeat(27));
    for (src, n) in &r.mixer.per_source {
        println!("{:<16} {:>10}", src.to_string(), n);
    }
    println!(
        "\nMixer: {} events, {} bits credited, state {}…",
        r.mixer.events, r.mixer.bits_credited, r.mixer.fingerprint
    );
}
