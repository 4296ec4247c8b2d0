//! Test harness around the recording host stack.
//!
//! Boots a [`Peripheral`] on [`SimStack`] and wraps the ATT access enum
//! in small helpers so tests read as "connect, write CCCD, send".

#![allow(dead_code)]

use ble_keyboard::adapters::sim::SimStack;
use ble_keyboard::app::events::{AppEvent, ConnHandle, GapEvent, PeerAddr};
use ble_keyboard::app::ports::EventSink;
use ble_keyboard::app::service::Peripheral;
use ble_keyboard::config::PeripheralConfig;
use ble_keyboard::error::AttError;
use ble_keyboard::gatt::dispatcher::{Access, AttBuf};
use ble_keyboard::gatt::registry::AttrKey;

pub const CONN: ConnHandle = ConnHandle(1);
pub const PEER: PeerAddr = PeerAddr::public([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);

/// Large enough for the report map.
const READ_BUF_LEN: usize = 128;

// ── Boot / link helpers ───────────────────────────────────────

pub fn boot_with(config: PeripheralConfig) -> Peripheral<SimStack> {
    let mut p = Peripheral::new(config, SimStack::new());
    p.init().expect("init");
    p.handle_gap_event(GapEvent::Synced);
    p
}

/// Booted and advertising, with the recorded call log cleared.
pub fn boot() -> Peripheral<SimStack> {
    let mut p = boot_with(PeripheralConfig::default());
    p.stack_mut().clear();
    let _ = p.drain_events().count();
    p
}

pub fn connect(p: &mut Peripheral<SimStack>) {
    p.handle_gap_event(GapEvent::Connect {
        status: 0,
        conn: CONN,
        peer: PEER,
    });
}

pub fn encrypt(p: &mut Peripheral<SimStack>) {
    p.handle_gap_event(GapEvent::EncryptionChange {
        conn: CONN,
        status: 0,
    });
}

pub fn disconnect(p: &mut Peripheral<SimStack>, reason: i32) {
    p.handle_gap_event(GapEvent::Disconnect { conn: CONN, reason });
}

/// Connected and encrypted, with the call log and event queue cleared.
pub fn secured() -> Peripheral<SimStack> {
    let mut p = boot();
    connect(&mut p);
    encrypt(&mut p);
    p.stack_mut().clear();
    let _ = p.drain_events().count();
    p
}

pub fn handle(p: &Peripheral<SimStack>, key: AttrKey) -> u16 {
    p.handle_of(key).expect("attribute registered")
}

// ── ATT helpers ───────────────────────────────────────────────

pub fn read_chr(p: &mut Peripheral<SimStack>, handle: u16) -> Result<Vec<u8>, AttError> {
    let mut storage = [0u8; READ_BUF_LEN];
    let mut buf = AttBuf::new(&mut storage);
    p.on_access(CONN, handle, Access::ReadChr(&mut buf))?;
    Ok(buf.as_slice().to_vec())
}

pub fn read_dsc(p: &mut Peripheral<SimStack>, handle: u16) -> Result<Vec<u8>, AttError> {
    let mut storage = [0u8; READ_BUF_LEN];
    let mut buf = AttBuf::new(&mut storage);
    p.on_access(CONN, handle, Access::ReadDsc(&mut buf))?;
    Ok(buf.as_slice().to_vec())
}

pub fn write_chr(p: &mut Peripheral<SimStack>, handle: u16, data: &[u8]) -> Result<(), AttError> {
    p.on_access(CONN, handle, Access::WriteChr(data))
}

pub fn write_dsc(p: &mut Peripheral<SimStack>, handle: u16, data: &[u8]) -> Result<(), AttError> {
    p.on_access(CONN, handle, Access::WriteDsc(data))
}

/// Enable notifications on the Input Report.
pub fn subscribe_input(p: &mut Peripheral<SimStack>) {
    let cccd = handle(p, AttrKey::InputReportCccd);
    write_dsc(p, cccd, &[0x01, 0x00]).expect("CCCD write");
}

// ── Event capture ─────────────────────────────────────────────

#[derive(Default)]
pub struct CaptureSink {
    pub events: Vec<AppEvent>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for CaptureSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
