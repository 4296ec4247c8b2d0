//! Fuzz target: `Peripheral::on_access`
//!
//! Interprets the input as a stream of ATT accesses against a booted,
//! encrypted peripheral and checks that:
//! - No panics under any byte sequence
//! - Unregistered handles are always `NotFound`
//! - The battery level never leaves 0..=100
//!
//! cargo fuzz run fuzz_access

#![no_main]

use ble_keyboard::adapters::sim::SimStack;
use ble_keyboard::app::events::{ConnHandle, GapEvent, PeerAddr};
use ble_keyboard::app::service::Peripheral;
use ble_keyboard::config::PeripheralConfig;
use ble_keyboard::error::AttError;
use ble_keyboard::gatt::dispatcher::{Access, AttBuf};
use libfuzzer_sys::fuzz_target;

const CONN: ConnHandle = ConnHandle(1);

fuzz_target!(|data: &[u8]| {
    let mut p = Peripheral::new(PeripheralConfig::default(), SimStack::new());
    if p.init().is_err() {
        return;
    }
    p.handle_gap_event(GapEvent::Synced);
    p.handle_gap_event(GapEvent::Connect {
        status: 0,
        conn: CONN,
        peer: PeerAddr::public([0; 6]),
    });
    p.handle_gap_event(GapEvent::EncryptionChange { conn: CONN, status: 0 });

    // Record layout: [op, handle_lo, len, cap, payload[len]...]
    let mut rest = data;
    while rest.len() >= 4 {
        let op = rest[0] & 0x03;
        // Keep handles near the registered range so most accesses hit.
        let handle = u16::from(rest[1]) & 0x3F;
        let len = usize::from(rest[2] & 0x0F).min(rest.len() - 4);
        let cap = usize::from(rest[3]);
        let payload = &rest[4..4 + len];
        rest = &rest[4 + len..];

        let mut storage = vec![0u8; cap];
        let mut buf = AttBuf::new(&mut storage);
        let access = match op {
            0 => Access::ReadChr(&mut buf),
            1 => Access::WriteChr(payload),
            2 => Access::ReadDsc(&mut buf),
            _ => Access::WriteDsc(payload),
        };
        let result = p.on_access(CONN, handle, access);

        if p.attribute(handle).is_none() {
            assert_eq!(result, Err(AttError::NotFound));
        }
        assert!(p.values().battery_level <= 100);
        let _ = p.drain_events().count();
    }
});
