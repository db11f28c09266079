//! Wattmeter firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspLines         SystemClock     NvsAdapter     ReportServer  │
//! │  (PulseLines)     (ClockSource)   (Config+Count) (TCP :9123)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        MeterRuntime → PulseHandler (ISR context)       │    │
//! │  │        EdgeFilter · MeterState · MeterAttributes       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Main loop: reports · supervision · checkpoint · telemetry     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::{Duration, Instant};

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use wattmeter::adapters::gpio::EspLines;
use wattmeter::adapters::nvs::NvsAdapter;
use wattmeter::adapters::report_server::ReportServer;
use wattmeter::adapters::time::SystemClock;
use wattmeter::app::lifecycle::MeterRuntime;
use wattmeter::app::ports::{ConfigPort, CountStore};
use wattmeter::config::MeterConfig;
use wattmeter::error::Error;
use wattmeter::report::derive_rate;

const LOOP_TICK: Duration = Duration::from_millis(100);

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Wattmeter v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => Some(n),
        Err(e) => {
            // Counting still works; nothing is persisted this session.
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            None
        }
    };
    let config = load_config(nvs.as_mut());

    // ── 3. Network (for the report server) ────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let _wifi = match option_env!("WATTMETER_WIFI_SSID") {
        Some(ssid) => {
            let pass = option_env!("WATTMETER_WIFI_PASS").unwrap_or("");
            match connect_wifi(peripherals.modem, sysloop, ssid, pass) {
                Ok(wifi) => Some(wifi),
                Err(e) => {
                    warn!("WiFi: connect to '{}' failed ({}), reports unavailable", ssid, e);
                    None
                }
            }
        }
        None => {
            info!("WiFi: no credentials compiled in, reports unavailable");
            None
        }
    };

    let mut reports = match ReportServer::bind(config.report_port) {
        Ok(server) => Some(server),
        Err(e) => {
            warn!("ReportServer: bind failed ({}), reports disabled", e);
            None
        }
    };

    // ── 4. Start the meter ────────────────────────────────────
    let clock = SystemClock::new().map_err(Error::Clock)?;
    let mut meter = MeterRuntime::start(
        config.clone(),
        clock,
        EspLines::new(),
        nvs.as_ref().map(|n| n as &dyn CountStore),
    )?;
    let attrs = meter.attributes();

    info!("System ready. Entering main loop.");

    // ── 5. Main loop ──────────────────────────────────────────
    let checkpoint_every = Duration::from_secs(u64::from(config.checkpoint_interval_secs));
    let telemetry_every = Duration::from_secs(u64::from(config.telemetry_interval_secs));
    let mut last_checkpoint = Instant::now();
    let mut last_telemetry = Instant::now();

    loop {
        std::thread::sleep(LOOP_TICK);

        if let Some(server) = reports.as_mut() {
            server.poll(&attrs, config.rate_scale);
        }

        // A clock fault is fatal to the meter: tear down and stop.
        if let Err(e) = meter.supervise() {
            error!("Meter fault: {}, halting", e);
            let store = nvs.as_mut().map(|n| n as &mut dyn CountStore);
            if let Err(save) = meter.shutdown(store) {
                warn!("Final checkpoint failed: {}", save);
            }
            return Err(e.into());
        }

        if last_checkpoint.elapsed() >= checkpoint_every {
            last_checkpoint = Instant::now();
            if let Some(store) = nvs.as_mut() {
                if let Err(e) = meter.checkpoint(store) {
                    warn!("Checkpoint failed: {}", e);
                }
            }
        }

        if last_telemetry.elapsed() >= telemetry_every {
            last_telemetry = Instant::now();
            let timing = attrs.timing();
            let diag = meter.diagnostics();
            info!(
                "Telemetry: count={} rate={} interval={} debounce={} suppressed={} output_errors={} reports={:?}",
                attrs.read_pulse_count(),
                derive_rate(timing.interval, config.rate_scale),
                attrs.read_last_interval(),
                attrs.read_debounce_enabled(),
                diag.suppressed_edges,
                diag.output_errors,
                reports.as_ref().map(ReportServer::stats),
            );
        }
    }
}

/// Stored config, then the compile-time JSON override (persisted if valid).
fn load_config(nvs: Option<&mut NvsAdapter>) -> MeterConfig {
    let Some(nvs) = nvs else {
        return MeterConfig::default();
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            MeterConfig::default()
        }
    };

    let Some(json) = option_env!("WATTMETER_CONFIG") else {
        return config;
    };
    match MeterConfig::from_json(json) {
        Ok(overridden) if overridden != config => {
            info!("Config: applying build-time override");
            if let Err(e) = nvs.save(&overridden) {
                warn!("Config: override not persisted ({})", e);
            }
            overridden
        }
        Ok(_) => config,
        Err(e) => {
            warn!("Config: build-time override rejected ({})", e);
            config
        }
    }
}

fn connect_wifi(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    ssid: &str,
    pass: &str,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), None)?, sysloop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("SSID longer than 32 bytes"))?,
        password: pass
            .try_into()
            .map_err(|_| anyhow::anyhow!("password longer than 64 bytes"))?,
        auth_method: if pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("WiFi: connected to '{}'", ssid);
    Ok(wifi)
}
