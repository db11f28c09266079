//! Startup, teardown and persistence across restarts.

use core::time::Duration;

use wattmeter::adapters::nvs::NvsAdapter;
use wattmeter::adapters::sim::{ManualClock, SimFailure, SimLines};
use wattmeter::app::lifecycle::MeterRuntime;
use wattmeter::app::ports::{ConfigPort, CountStore};
use wattmeter::config::MeterConfig;
use wattmeter::error::{ClockError, Error, LineError};
use wattmeter::meter::Timestamp;

use crate::harness::Rig;

fn persisting() -> MeterConfig {
    MeterConfig {
        persist_count: true,
        ..MeterConfig::default()
    }
}

#[test]
fn every_startup_failure_leaves_the_board_clean() {
    for step in [
        SimFailure::AcquireOutput,
        SimFailure::AcquireInput,
        SimFailure::Register,
    ] {
        let cfg = MeterConfig::default();
        let lines = SimLines::new();
        let probe = lines.probe();
        probe.fail_next(step);

        let clock = ManualClock::at(Timestamp::from_millis(1));
        let result = MeterRuntime::start(cfg.clone(), clock, lines, None);
        assert!(matches!(result, Err(Error::Line(_))), "{:?} must fail", step);
        assert!(!probe.is_claimed(cfg.input_gpio), "{:?} leaked input", step);
        assert!(!probe.is_claimed(cfg.output_gpio), "{:?} leaked output", step);
        assert!(!probe.has_sink(cfg.input_gpio), "{:?} leaked handler", step);
    }
}

#[test]
fn reserved_gpio_rejected_before_touching_lines() {
    let cfg = MeterConfig {
        input_gpio: 24,
        ..MeterConfig::default()
    };
    let lines = SimLines::new();
    let probe = lines.probe();
    let clock = ManualClock::at(Timestamp::EPOCH);
    assert!(matches!(
        MeterRuntime::start(cfg.clone(), clock, lines, None),
        Err(Error::Config(_))
    ));
    assert!(!probe.is_claimed(cfg.output_gpio));
}

#[test]
fn busy_output_line_fails_startup() {
    use embedded_hal::digital::OutputPin;
    use wattmeter::app::ports::PulseLines;

    let cfg = MeterConfig::default();
    let mut lines = SimLines::new();
    let probe = lines.probe();
    // Someone else already drives the output pin.
    let mut foreign = lines.acquire_output(cfg.output_gpio).unwrap();
    foreign.set_high().unwrap();

    let clock = ManualClock::at(Timestamp::EPOCH);
    let err = MeterRuntime::start(cfg.clone(), clock, lines, None).err();
    assert_eq!(err, Some(Error::Line(LineError::Busy(cfg.output_gpio))));
    assert!(!probe.is_claimed(cfg.input_gpio));
}

#[test]
fn edges_after_shutdown_go_nowhere() {
    let rig = Rig::with_defaults();
    let probe = rig.probe.clone();
    let attrs = rig.attrs.clone();
    let input = rig.config.input_gpio;
    let output = rig.config.output_gpio;

    rig.pulse_at(1_000);
    rig.rt.shutdown(None).unwrap();

    assert!(!probe.pulse(input), "no handler may remain attached");
    assert_eq!(attrs.read_pulse_count(), 1, "accessors outlive the runtime");
    assert_eq!(probe.level(output), Some(false));
    assert!(!probe.is_claimed(input));
    assert!(!probe.is_claimed(output));
}

#[test]
fn clock_failure_mid_run_halts_counting() {
    let rig = Rig::with_defaults();
    rig.pulse_at(1_000);
    assert!(rig.rt.supervise().is_ok());

    rig.clock.break_down();
    rig.probe.pulse(rig.config.input_gpio);
    assert_eq!(rig.rt.supervise(), Err(Error::Clock(ClockError::Unavailable)));

    // The fault is sticky; the last good pulse stays visible.
    assert_eq!(rig.rt.supervise(), Err(Error::Clock(ClockError::Unavailable)));
    assert_eq!(rig.attrs.read_pulse_count(), 1);
    assert_eq!(rig.attrs.read_last_timestamp().as_str(), "00:00:01:000000000");
}

#[test]
fn count_survives_restart_when_persisted() {
    let mut nvs = NvsAdapter::new().unwrap();

    let rig = Rig::start(persisting(), Timestamp::EPOCH);
    for t in [1_000, 2_000, 3_000, 4_000, 5_000] {
        rig.pulse_at(t);
    }
    rig.rt.shutdown(Some(&mut nvs)).unwrap();
    assert_eq!(nvs.load_count(), Ok(Some(5)));

    let clock = ManualClock::at(Timestamp::from_millis(10_000));
    let lines = SimLines::new();
    let probe = lines.probe();
    let rt = MeterRuntime::start(persisting(), clock.clone(), lines, Some(&nvs)).unwrap();
    let attrs = rt.attributes();
    assert_eq!(attrs.read_pulse_count(), 5);
    assert_eq!(attrs.read_last_interval().as_str(), "0.000000000");
    assert!(attrs.read_output_mirror(), "mirror follows restored parity");
    assert_eq!(probe.level(MeterConfig::default().output_gpio), Some(true));

    clock.advance(Duration::from_secs(2));
    probe.pulse(MeterConfig::default().input_gpio);
    assert_eq!(attrs.read_pulse_count(), 6);
    assert!(!attrs.read_output_mirror());
    assert_eq!(probe.level(MeterConfig::default().output_gpio), Some(false));
}

#[test]
fn count_not_restored_without_persistence() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.save_count(77).unwrap();

    let clock = ManualClock::at(Timestamp::EPOCH);
    let rt = MeterRuntime::start(MeterConfig::default(), clock, SimLines::new(), Some(&nvs))
        .unwrap();
    assert_eq!(rt.attributes().read_pulse_count(), 0);
}

#[test]
fn stored_config_drives_startup() {
    let mut nvs = NvsAdapter::new().unwrap();
    let cfg = MeterConfig {
        input_gpio: 10,
        output_gpio: 11,
        debounce_enabled: false,
        ..MeterConfig::default()
    };
    nvs.save(&cfg).unwrap();

    let loaded = nvs.load().unwrap();
    let lines = SimLines::new();
    let probe = lines.probe();
    let rt = MeterRuntime::start(loaded, ManualClock::at(Timestamp::EPOCH), lines, None).unwrap();
    assert!(probe.is_claimed(10));
    assert!(probe.is_claimed(11));
    assert!(!rt.attributes().read_debounce_enabled());
}

#[test]
fn json_override_validated_before_use() {
    let cfg = MeterConfig::from_json(r#"{"debounce_ms": 50, "edge": "Falling"}"#).unwrap();
    assert_eq!(cfg.debounce_ms, 50);
    assert_eq!(cfg.input_gpio, MeterConfig::default().input_gpio);
    assert!(MeterConfig::from_json(r#"{"output_gpio": 6}"#).is_err());
}
