//! Shared rig: a started meter on a simulated board.

use wattmeter::adapters::sim::{ManualClock, SimLines, SimProbe};
use wattmeter::app::lifecycle::MeterRuntime;
use wattmeter::config::MeterConfig;
use wattmeter::meter::{MeterAttributes, Timestamp};

pub struct Rig {
    pub rt: MeterRuntime<SimLines>,
    pub attrs: MeterAttributes,
    pub probe: SimProbe,
    pub clock: ManualClock,
    pub config: MeterConfig,
}

impl Rig {
    pub fn start(config: MeterConfig, at: Timestamp) -> Self {
        let clock = ManualClock::at(at);
        let lines = SimLines::new();
        let probe = lines.probe();
        let rt = MeterRuntime::start(config.clone(), clock.clone(), lines, None)
            .expect("meter starts on a clean board");
        Self {
            attrs: rt.attributes(),
            rt,
            probe,
            clock,
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::start(MeterConfig::default(), Timestamp::EPOCH)
    }

    /// One full pulse cycle on the input at absolute time `ms`.
    pub fn pulse_at(&self, ms: u64) -> bool {
        self.clock.set(Timestamp::from_millis(ms));
        self.probe.pulse(self.config.input_gpio)
    }

    pub fn output_level(&self) -> Option<bool> {
        self.probe.level(self.config.output_gpio)
    }
}
