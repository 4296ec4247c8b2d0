//! Fuzz target: `Peripheral::handle_gap_event`
//!
//! Decodes arbitrary bytes into GAP events and checks after each one that
//! the state machine has settled and the link record agrees with it.
//!
//! cargo fuzz run fuzz_gap_events

#![no_main]

use ble_keyboard::adapters::sim::SimStack;
use ble_keyboard::app::events::{ConnHandle, GapEvent, PeerAddr};
use ble_keyboard::app::service::Peripheral;
use ble_keyboard::config::PeripheralConfig;
use ble_keyboard::fsm::LinkState;
use libfuzzer_sys::fuzz_target;

fn decode(chunk: [u8; 3]) -> GapEvent {
    let [tag, a, b] = chunk;
    let conn = ConnHandle(u16::from(a & 0x01) + 1);
    let status = i32::from(b);
    match tag % 8 {
        0 => GapEvent::Synced,
        1 => GapEvent::Reset { reason: status },
        2 => GapEvent::Connect {
            status,
            conn,
            peer: PeerAddr::public([a, b, 0, 0, 0, 1]),
        },
        3 => GapEvent::Disconnect { conn, reason: status },
        4 => GapEvent::EncryptionChange { conn, status },
        5 => GapEvent::Subscribe {
            conn,
            attr_handle: u16::from(b & 0x3F),
            notify: a & 0x02 != 0,
            indicate: a & 0x04 != 0,
        },
        6 => GapEvent::RepeatPairing { conn },
        _ => GapEvent::Mtu {
            conn,
            value: u16::from_le_bytes([a, b]),
        },
    }
}

fuzz_target!(|data: &[u8]| {
    let mut p = Peripheral::new(PeripheralConfig::default(), SimStack::new());
    if p.init().is_err() {
        return;
    }

    for chunk in data.chunks_exact(3) {
        p.handle_gap_event(decode([chunk[0], chunk[1], chunk[2]]));

        let state = p.state();
        assert!(!matches!(
            state,
            LinkState::Connecting | LinkState::RepeatPairing | LinkState::Disconnected
        ));
        assert_eq!(p.connection().is_some(), state.is_connected());
        let _ = p.drain_events().count();
        // Keep the recorder from growing without bound.
        p.stack_mut().clear();
    }
});
