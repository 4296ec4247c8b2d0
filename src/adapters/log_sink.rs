//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the
//! ESP-IDF logger (UART / USB-CDC in production, stderr on the host).

use log::{info, warn};

use crate::app::events::{AppEvent, ControlPointCommand};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events logged so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::Connected { conn, peer } => {
                info!("LINK  | {} up, peer {}", conn, peer);
            }
            AppEvent::Secured { conn } => {
                info!("LINK  | {} encrypted", conn);
            }
            AppEvent::Disconnected { reason } => {
                info!("LINK  | down, reason=0x{:02X}", reason);
            }
            AppEvent::SubscriptionChanged { handle, cccd } => {
                info!(
                    "CCCD  | handle={} notify={} indicate={}",
                    handle, cccd.notify, cccd.indicate
                );
            }
            AppEvent::KeyboardLeds(leds) => {
                info!("HID   | LEDs=0b{:05b}", leds);
            }
            AppEvent::ControlPoint(cmd) => match cmd {
                ControlPointCommand::Suspend => info!("HID   | host suspended"),
                ControlPointCommand::ExitSuspend => info!("HID   | host resumed"),
            },
            AppEvent::ProtocolModeChanged(mode) => {
                info!("HID   | protocol mode {:?}", mode);
            }
            AppEvent::AdvertisingFailed(e) => {
                warn!("ADV   | {}", e);
            }
        }
    }
}
