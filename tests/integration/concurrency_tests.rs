//! Accessors racing the pulse handler.
//!
//! The writer drives pulse `g` at `BASE + g²` ms, so every generation has a
//! unique timestamp and interval; a reader that mixes two pulses cannot
//! produce a matching pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use wattmeter::config::MeterConfig;
use wattmeter::meter::{PulseTiming, Timestamp};

use crate::harness::Rig;

const BASE_MS: u64 = 1_000;
const PULSES: u64 = 5_000;

fn no_debounce() -> Rig {
    let config = MeterConfig {
        debounce_enabled: false,
        ..MeterConfig::default()
    };
    Rig::start(config, Timestamp::from_millis(BASE_MS))
}

fn expected(generation: u64) -> (Timestamp, u64) {
    if generation == 0 {
        return (Timestamp::from_millis(BASE_MS), 0);
    }
    let g = generation;
    (Timestamp::from_millis(BASE_MS + g * g), 2 * g - 1)
}

fn check(t: PulseTiming) {
    let (last, interval_ms) = expected(u64::from(t.generation));
    assert_eq!(t.last, last, "torn timestamp at generation {}", t.generation);
    assert_eq!(
        t.interval.as_nanos(),
        u128::from(interval_ms) * 1_000_000,
        "torn interval at generation {}",
        t.generation
    );
}

#[test]
fn timing_reads_never_mix_generations() {
    let rig = no_debounce();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..3 {
            let attrs = rig.attrs.clone();
            let done = &done;
            s.spawn(move || {
                let mut last_seen = 0;
                while !done.load(Ordering::Acquire) {
                    let t = attrs.timing();
                    check(t);
                    assert!(t.generation >= last_seen, "generation went backward");
                    last_seen = t.generation;
                }
            });
        }

        for g in 1..=PULSES {
            assert!(rig.pulse_at(BASE_MS + g * g));
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(u64::from(rig.attrs.timing().generation), PULSES);
    assert_eq!(u64::from(rig.attrs.read_pulse_count()), PULSES);
}

#[test]
fn text_reads_always_name_a_completed_pulse() {
    let rig = no_debounce();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let attrs = rig.attrs.clone();
        let done = &done;
        s.spawn(move || {
            while !done.load(Ordering::Acquire) {
                // Intervals are 0 or an odd number of whole milliseconds.
                let text = attrs.read_last_interval();
                let (secs, frac) = text.split_once('.').expect("SECONDS.NNNNNNNNN");
                assert_eq!(frac.len(), 9);
                let nanos: u64 = secs.parse::<u64>().unwrap() * 1_000_000_000
                    + frac.parse::<u64>().unwrap();
                assert_eq!(nanos % 1_000_000, 0, "sub-millisecond residue in {}", text);
                let ms = nanos / 1_000_000;
                assert!(ms == 0 || ms % 2 == 1, "interval {} ms is no pulse's", ms);

                // Every pulse lands on a whole millisecond.
                let stamp = attrs.read_last_timestamp();
                assert!(stamp.ends_with("000000"), "torn timestamp {}", stamp);
            }
        });

        for g in 1..=PULSES {
            rig.pulse_at(BASE_MS + g * g);
        }
        done.store(true, Ordering::Release);
    });
}

#[test]
fn count_reset_races_pulses_without_loss_after_quiesce() {
    let rig = no_debounce();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let attrs = rig.attrs.clone();
        let done = &done;
        s.spawn(move || {
            while !done.load(Ordering::Acquire) {
                attrs.write_pulse_count(0);
                assert!(attrs.read_pulse_count() <= PULSES as u32);
            }
        });

        for g in 1..=PULSES {
            rig.pulse_at(BASE_MS + g);
        }
        done.store(true, Ordering::Release);
    });

    rig.attrs.write_pulse_count(0);
    for g in 1..=10 {
        rig.pulse_at(BASE_MS + PULSES + g);
    }
    assert_eq!(rig.attrs.read_pulse_count(), 10);
    assert_eq!(u64::from(rig.attrs.timing().generation), PULSES + 10);
}
