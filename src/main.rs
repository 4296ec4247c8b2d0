//! BLE keyboard firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  BluedroidStack (HostStack)   NvsAdapter (ConfigPort)        │
//! │  LogEventSink (EventSink)                                    │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ─────────────────       │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              Peripheral (pure logic)                   │  │
//! │  │  GAP FSM · Registry · Dispatcher · Notification gate   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bluedroid delivers callbacks on its own task; this task only drains
//! application events and retries advertising after a failure.
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use ble_keyboard::adapters::bluedroid::{self, BluedroidStack};
use ble_keyboard::adapters::log_sink::LogEventSink;
use ble_keyboard::adapters::nvs::NvsAdapter;
use ble_keyboard::app::events::GapEvent;
use ble_keyboard::app::service::{Peripheral, SharedPeripheral};
use ble_keyboard::config::PeripheralConfig;

const LOOP_INTERVAL: Duration = Duration::from_millis(100);
/// Loop iterations between advertising retries (5 s).
const ADV_RETRY_TICKS: u32 = 50;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("BLE keyboard v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsAdapter::new() {
        Ok(nvs) => nvs.load_or_default(),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            PeripheralConfig::default()
        }
    };

    // ── 3. Host stack + peripheral ────────────────────────────
    let stack = BluedroidStack::init(&config.device_name)
        .map_err(|e| anyhow!("{}", e))
        .context("Bluedroid bring-up")?;

    let mut peripheral = Peripheral::new(config, stack);
    peripheral
        .init()
        .map_err(|e| anyhow!("{}", e))
        .context("GATT service registration")?;

    let shared = SharedPeripheral::new(peripheral);
    if !bluedroid::install(shared.clone()) {
        return Err(anyhow!("peripheral already installed"));
    }

    // Bluedroid is ready as soon as the GATT app is registered.
    shared.handle_gap_event(GapEvent::Synced);
    info!("System ready. Entering event loop.");

    // ── 4. Event loop ─────────────────────────────────────────
    let mut log_sink = LogEventSink::new();
    let mut ticks_since_failure: u32 = 0;

    loop {
        std::thread::sleep(LOOP_INTERVAL);

        shared.with(|p| {
            p.flush_events(&mut log_sink);

            if p.adv_error().is_none() {
                ticks_since_failure = 0;
                return;
            }
            ticks_since_failure += 1;
            if ticks_since_failure >= ADV_RETRY_TICKS {
                ticks_since_failure = 0;
                info!("Retrying advertising");
                if let Err(e) = p.retry_advertising() {
                    warn!("Advertising retry failed: {}", e);
                }
            }
        });
    }
}
