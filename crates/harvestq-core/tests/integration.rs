//! Integration tests for harvestq-core.
//!
//! These exercise the whole pipeline through the public API:
//! producers → harvest queue → consumer → sink → free queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use harvestq_core::{
    HARVEST_SIZE, HarvestConfig, HarvestEvent, HarvestQueue, Harvester, LoopControl,
    RandomSource,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    payload: Vec<u8>,
    source: RandomSource,
    sequence: u32,
}

type SeenLog = Arc<Mutex<Vec<Seen>>>;

fn config(capacity: usize) -> HarvestConfig {
    HarvestConfig {
        capacity,
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn recording_sink(log: SeenLog) -> impl FnMut(&HarvestEvent) + Send + 'static {
    move |ev: &HarvestEvent| {
        log.lock().unwrap().push(Seen {
            payload: ev.payload().to_vec(),
            source: ev.source(),
            sequence: ev.sequence(),
        });
    }
}

/// A pump that parks the consumer on its first call until released.
fn parking_pump() -> (
    impl FnMut(&Harvester) + Send + 'static,
    mpsc::Receiver<()>,
    mpsc::Sender<()>,
) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let mut parked = false;
    let pump = move |_: &Harvester| {
        if !parked {
            parked = true;
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
        }
    };
    (pump, entered_rx, release_tx)
}

#[test]
fn concrete_scenario_four_slots() {
    let log = SeenLog::default();
    let queue = HarvestQueue::start(config(4), recording_sink(Arc::clone(&log))).unwrap();

    for p in [b"a", b"b", b"c", b"d"] {
        queue.harvest(p, 8, RandomSource::Keyboard);
    }
    queue.request_flush();

    let seen = log.lock().unwrap().clone();
    let expected: Vec<Seen> = [b"a", b"b", b"c", b"d"]
        .iter()
        .enumerate()
        .map(|(i, p)| Seen {
            payload: p.to_vec(),
            source: RandomSource::Keyboard,
            sequence: i as u32,
        })
        .collect();
    assert_eq!(seen, expected);
    assert_eq!(queue.occupancy().free, 4);

    queue.request_shutdown();
    assert_eq!(queue.teardown(), 4);
}

#[test]
fn fifo_order_single_producer() {
    let log = SeenLog::default();
    let queue = HarvestQueue::start(config(64), recording_sink(Arc::clone(&log))).unwrap();

    for i in 0u8..50 {
        queue.harvest(&[i], 1, RandomSource::Interrupt);
    }
    queue.request_flush();

    let payloads: Vec<u8> = log.lock().unwrap().iter().map(|s| s.payload[0]).collect();
    assert_eq!(payloads, (0u8..50).collect::<Vec<_>>());
}

#[test]
fn saturation_drops_exactly_the_overflow() {
    let log = SeenLog::default();
    let (pump, entered, release) = parking_pump();
    let queue = HarvestQueue::start_with_pump(config(4), recording_sink(Arc::clone(&log)), pump).unwrap();

    // Consumer is parked in the pump: nothing drains from here on.
    entered.recv().unwrap();
    for p in [b"1", b"2", b"3", b"4", b"5"] {
        queue.harvest(p, 8, RandomSource::Mouse);
    }

    let occ = queue.occupancy();
    assert_eq!((occ.free, occ.pending, occ.in_flight), (0, 4, 0));
    assert!(occ.is_conserved());
    assert_eq!(queue.stats().dropped, 1);

    release.send(()).unwrap();
    queue.request_flush();

    let payloads: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|s| s.payload.clone()).collect();
    assert_eq!(
        payloads,
        vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec(), b"4".to_vec()]
    );
    assert_eq!(queue.occupancy().free, 4);
}

#[test]
fn flush_barrier_delivers_everything_harvested_before_it() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let queue = HarvestQueue::start(config(128), move |_: &HarvestEvent| {
        std::thread::sleep(Duration::from_micros(200));
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    for round in 0..3 {
        for i in 0..40u32 {
            queue.harvest(&i.to_le_bytes(), 4, RandomSource::NetEther);
        }
        queue.request_flush();
        assert_eq!(delivered.load(Ordering::SeqCst), 40 * (round + 1));
    }
}

#[test]
fn flush_requested_mid_sink_waits_for_a_fresh_drain() {
    let log = SeenLog::default();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let sink_log = Arc::clone(&log);
    let queue = HarvestQueue::start(config(8), move |ev: &HarvestEvent| {
        if ev.payload() == b"old" {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
        }
        sink_log.lock().unwrap().push(Seen {
            payload: ev.payload().to_vec(),
            source: ev.source(),
            sequence: ev.sequence(),
        });
    })
    .unwrap();

    queue.harvest(b"old", 8, RandomSource::Attach);
    entered_rx.recv().unwrap();
    queue.harvest(b"new", 8, RandomSource::Attach);

    std::thread::scope(|s| {
        let flusher = s.spawn(|| queue.request_flush());
        while queue.control() != LoopControl::Flush {
            std::thread::yield_now();
        }
        release_tx.send(()).unwrap();
        flusher.join().unwrap();
    });

    let payloads: Vec<Vec<u8>> = log.lock().unwrap().iter().map(|s| s.payload.clone()).collect();
    assert_eq!(payloads, vec![b"old".to_vec(), b"new".to_vec()]);
}

#[test]
fn overlapping_flushes_each_cover_their_own_harvests() {
    let log = SeenLog::default();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let sink_log = Arc::clone(&log);
    let cfg = HarvestConfig {
        capacity: 8,
        // Only flushes wake the consumer.
        poll_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let queue = HarvestQueue::start(cfg, move |ev: &HarvestEvent| {
        if ev.payload() == b"a" {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
        }
        sink_log.lock().unwrap().push(Seen {
            payload: ev.payload().to_vec(),
            source: ev.source(),
            sequence: ev.sequence(),
        });
    })
    .unwrap();

    std::thread::scope(|s| {
        queue.harvest(b"a", 8, RandomSource::Mouse);
        let first = s.spawn(|| queue.request_flush());
        entered_rx.recv().unwrap();

        queue.harvest(b"b", 8, RandomSource::Mouse);
        let second = s.spawn(|| {
            queue.request_flush();
            log.lock()
                .unwrap()
                .iter()
                .map(|s| s.payload.clone())
                .collect::<Vec<_>>()
        });
        // Give the second flusher time to register behind the first.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.control(), LoopControl::Flush);

        release_tx.send(()).unwrap();
        first.join().unwrap();
        let seen_by_second = second.join().unwrap();
        assert_eq!(seen_by_second, vec![b"a".to_vec(), b"b".to_vec()]);
    });

    assert_eq!(queue.control(), LoopControl::Run);
    assert_eq!(queue.stats().delivered, 2);
}

#[test]
fn no_sink_calls_after_shutdown() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let queue = HarvestQueue::start(config(8), move |_: &HarvestEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    queue.harvest(b"before", 8, RandomSource::Swi);
    queue.request_flush();
    queue.request_shutdown();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    for _ in 0..3 {
        queue.harvest(b"after", 8, RandomSource::Swi);
    }
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    let occ = queue.occupancy();
    assert_eq!(occ.pending, 3);
    assert!(occ.is_conserved());
}

#[test]
fn oversized_sample_is_truncated() {
    let log = SeenLog::default();
    let queue = HarvestQueue::start(config(4), recording_sink(Arc::clone(&log))).unwrap();

    let big: Vec<u8> = (0..=255).collect();
    queue.harvest(&big, 64, RandomSource::PureOs);
    queue.request_flush();

    let seen = log.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload.len(), HARVEST_SIZE);
    assert_eq!(seen[0].payload, big[..HARVEST_SIZE]);
}

#[test]
fn conservation_under_concurrent_load() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 5_000;

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let queue = HarvestQueue::start(config(32), move |ev: &HarvestEvent| {
        assert!(ev.size() <= HARVEST_SIZE);
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let monitor = s.spawn(|| {
            let mut checks = 0usize;
            while !done.load(Ordering::Acquire) {
                assert!(queue.occupancy().is_conserved());
                checks += 1;
            }
            checks
        });

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let harvester = queue.harvester();
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let sample = (((p as u64) << 32) | i as u64).to_le_bytes();
                        harvester.harvest(&sample, 2, RandomSource::Interrupt);
                    }
                })
            })
            .collect();
        for h in producers {
            h.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(monitor.join().unwrap() > 0);
    });

    queue.request_flush();
    let stats = queue.stats();
    assert_eq!(
        stats.harvested + stats.dropped,
        (PRODUCERS * PER_PRODUCER) as u64
    );
    assert_eq!(stats.delivered, stats.harvested);
    assert_eq!(delivered.load(Ordering::Relaxed) as u64, stats.harvested);
    assert_eq!(stats.occupancy.free, 32);
    assert!(stats.occupancy.is_conserved());
}

#[test]
fn sink_may_harvest_without_deadlock() {
    let log = SeenLog::default();
    let harvester: Arc<OnceLock<Harvester>> = Arc::new(OnceLock::new());
    let sink_harvester = Arc::clone(&harvester);
    let sink_log = Arc::clone(&log);

    let queue = HarvestQueue::start(config(8), move |ev: &HarvestEvent| {
        if ev.source() == RandomSource::Keyboard {
            if let Some(h) = sink_harvester.get() {
                h.harvest(ev.payload(), 1, RandomSource::Mouse);
            }
        }
        sink_log.lock().unwrap().push(Seen {
            payload: ev.payload().to_vec(),
            source: ev.source(),
            sequence: ev.sequence(),
        });
    })
    .unwrap();
    let _ = harvester.set(queue.harvester());

    queue.harvest(b"k", 8, RandomSource::Keyboard);
    queue.request_flush();
    queue.request_flush();

    let sources: Vec<RandomSource> = log.lock().unwrap().iter().map(|s| s.source).collect();
    assert_eq!(sources, vec![RandomSource::Keyboard, RandomSource::Mouse]);
}

#[test]
fn sink_panic_surfaces_at_shutdown() {
    let queue = HarvestQueue::start(config(4), |ev: &HarvestEvent| {
        if ev.payload() == b"boom" {
            panic!("sink failure");
        }
    })
    .unwrap();

    queue.harvest(b"boom", 8, RandomSource::Attach);
    // The exit guard releases the flush waiter when the consumer dies.
    queue.request_flush();
    assert!(!queue.is_running());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        queue.request_shutdown();
    }));
    assert!(result.is_err());
}

#[test]
fn zero_capacity_is_rejected() {
    let err = HarvestQueue::start(config(0), |_: &HarvestEvent| {}).err();
    assert_eq!(err.map(|e| e.kind()), Some(std::io::ErrorKind::InvalidInput));
}
