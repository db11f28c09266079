//! End-to-end pulse scenarios: counting, reset, debounce.

use wattmeter::config::MeterConfig;
use wattmeter::meter::{Attribute, Timestamp};

use crate::harness::Rig;

/// 12:34:56 on the first day after the epoch.
const BASE_MS: u64 = (12 * 3600 + 34 * 60 + 56) * 1_000;

fn three_pulses() -> Rig {
    let rig = Rig::start(MeterConfig::default(), Timestamp::from_millis(BASE_MS));
    assert_eq!(rig.attrs.read_pulse_count(), 0);
    assert!(!rig.attrs.read_output_mirror());

    for t in [0, 1_000, 3_000] {
        rig.pulse_at(BASE_MS + t);
    }
    rig
}

#[test]
fn three_pulses_accumulate_and_time() {
    let rig = three_pulses();

    assert_eq!(rig.attrs.read_pulse_count(), 3);
    assert!(rig.attrs.read_output_mirror());
    assert_eq!(rig.output_level(), Some(true));
    assert_eq!(rig.attrs.read_last_interval().as_str(), "2.000000000");
    assert_eq!(rig.attrs.read_last_timestamp().as_str(), "12:34:59:000000000");
}

#[test]
fn reset_leaves_timing_alone() {
    let rig = three_pulses();

    rig.attrs.write_pulse_count(0);
    assert_eq!(rig.attrs.read_pulse_count(), 0);
    assert_eq!(rig.attrs.read_last_interval().as_str(), "2.000000000");
    assert_eq!(rig.attrs.read_last_timestamp().as_str(), "12:34:59:000000000");
    assert!(rig.attrs.read_output_mirror(), "reset does not touch the mirror");

    rig.pulse_at(BASE_MS + 3_500);
    assert_eq!(rig.attrs.read_pulse_count(), 1);
    assert_eq!(rig.attrs.read_last_interval().as_str(), "0.500000000");
}

#[test]
fn debounce_collapses_close_transitions() {
    let rig = Rig::with_defaults();
    assert!(rig.attrs.read_debounce_enabled());

    rig.pulse_at(10_000);
    rig.pulse_at(10_050);
    assert_eq!(rig.attrs.read_pulse_count(), 1);
    assert_eq!(rig.rt.diagnostics().suppressed_edges, 3, "one bounce + two falling edges");
}

#[test]
fn disabled_debounce_counts_every_transition() {
    let rig = Rig::with_defaults();
    rig.attrs.store(Attribute::Debounce, "0").unwrap();

    rig.pulse_at(10_000);
    rig.pulse_at(10_050);
    assert_eq!(rig.attrs.read_pulse_count(), 2);
    assert_eq!(rig.attrs.read_last_interval().as_str(), "0.050000000");
    assert!(!rig.attrs.read_output_mirror());
}

#[test]
fn window_measured_from_last_accepted_pulse() {
    let rig = Rig::with_defaults();
    // 0 accepted; 150 bounces; 250 is 250 ms after the accepted pulse.
    rig.pulse_at(0);
    rig.pulse_at(150);
    rig.pulse_at(250);
    assert_eq!(rig.attrs.read_pulse_count(), 2);
    assert_eq!(rig.attrs.read_last_interval().as_str(), "0.250000000");
}

#[test]
fn reenabling_debounce_applies_to_next_edge() {
    let rig = Rig::with_defaults();
    rig.attrs.write_debounce_enabled(false);
    rig.pulse_at(1_000);
    rig.pulse_at(1_010);
    assert_eq!(rig.attrs.read_pulse_count(), 2);

    rig.attrs.write_debounce_enabled(true);
    rig.pulse_at(1_020);
    assert_eq!(rig.attrs.read_pulse_count(), 2);
    rig.pulse_at(1_300);
    assert_eq!(rig.attrs.read_pulse_count(), 3);
}

#[test]
fn falling_polarity_counts_falling_edges_only() {
    let config = MeterConfig {
        edge: wattmeter::meter::EdgePolarity::Falling,
        ..MeterConfig::default()
    };
    let rig = Rig::start(config, Timestamp::EPOCH);
    let input = rig.config.input_gpio;

    rig.clock.set(Timestamp::from_millis(1_000));
    rig.probe.edge(input, wattmeter::meter::Edge::Rising);
    assert_eq!(rig.attrs.read_pulse_count(), 0);
    rig.probe.edge(input, wattmeter::meter::Edge::Falling);
    assert_eq!(rig.attrs.read_pulse_count(), 1);
}

#[test]
fn text_surface_by_name() {
    let rig = three_pulses();
    assert_eq!(rig.attrs.show_named("pulse_count").unwrap().as_str(), "3");
    assert_eq!(rig.attrs.show_named("output").unwrap().as_str(), "1");
    assert_eq!(rig.attrs.show_named("diff_time").unwrap().as_str(), "2.000000000");

    rig.attrs.store_named("pulse_count", "1000\n").unwrap();
    assert_eq!(rig.attrs.read_pulse_count(), 1_000);
    assert!(rig.attrs.store_named("output", "0").is_err());
    assert!(rig.attrs.read_output_mirror());
}

#[test]
fn simultaneous_pulses_give_zero_interval() {
    let config = MeterConfig {
        debounce_enabled: false,
        ..MeterConfig::default()
    };
    let rig = Rig::start(config, Timestamp::from_millis(BASE_MS));
    rig.pulse_at(BASE_MS + 500);
    rig.pulse_at(BASE_MS + 500);

    assert_eq!(rig.attrs.read_pulse_count(), 2);
    assert_eq!(rig.attrs.read_last_interval().as_str(), "0.000000000");
    assert!(!rig.attrs.read_output_mirror());
    assert!(rig.rt.supervise().is_ok());
}
