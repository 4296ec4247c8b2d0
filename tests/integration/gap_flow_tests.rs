//! Integration tests for the GAP link lifecycle: boot → advertise →
//! connect → secure → disconnect → advertise, plus repeat pairing and
//! stack resets.

use ble_keyboard::adapters::sim::{SimStack, StackCall};
use ble_keyboard::adv::AdvParams;
use ble_keyboard::app::events::{AppEvent, ConnHandle, GapEvent, GapReply};
use ble_keyboard::config::PeripheralConfig;
use ble_keyboard::error::{AdvError, StackError};
use ble_keyboard::fsm::LinkState;
use ble_keyboard::gatt::formats::Cccd;
use ble_keyboard::gatt::registry::AttrKey;

use crate::mock_stack::{
    boot, boot_with, connect, disconnect, encrypt, handle, secured, subscribe_input, CaptureSink,
    CONN, PEER,
};

fn state_changes(events: &[AppEvent]) -> Vec<(LinkState, LinkState)> {
    events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_registers_services_then_advertises() {
    let p = boot_with(PeripheralConfig::default());
    let calls = &p.stack().calls;

    assert!(matches!(calls[0], StackCall::ConfigureSecurity(_)));
    let registered = calls
        .iter()
        .filter(|c| matches!(c, StackCall::RegisterService { .. }))
        .count();
    assert_eq!(registered, 3);

    let tail: Vec<_> = calls.iter().rev().take(3).rev().collect();
    assert!(matches!(tail[0], StackCall::SetAdvData(_)));
    assert!(matches!(tail[1], StackCall::SetScanResponse(_)));
    assert_eq!(*tail[2], StackCall::StartAdvertising(AdvParams::default()));
    assert_eq!(p.state(), LinkState::Advertising);
}

#[test]
fn nothing_advertises_before_sync() {
    let mut p = ble_keyboard::app::service::Peripheral::new(
        PeripheralConfig::default(),
        SimStack::new(),
    );
    p.init().unwrap();
    assert_eq!(p.state(), LinkState::Idle);
    assert_eq!(p.stack().adv_starts(), 0);
}

// ── Connect / security ────────────────────────────────────────

#[test]
fn connect_records_link_and_initiates_security() {
    let mut p = boot();
    connect(&mut p);

    assert_eq!(p.state(), LinkState::Connected);
    let link = p.connection().copied().expect("link recorded");
    assert_eq!(link.handle, CONN);
    assert_eq!(link.peer, PEER);
    assert!(!link.encrypted);
    assert_eq!(p.stack().calls, vec![StackCall::InitiateSecurity(CONN)]);

    let mut sink = CaptureSink::new();
    p.flush_events(&mut sink);
    assert!(sink.contains(&AppEvent::Connected {
        conn: CONN,
        peer: PEER
    }));
    assert_eq!(
        state_changes(&sink.events),
        [
            (LinkState::Advertising, LinkState::Connecting),
            (LinkState::Connecting, LinkState::Connected),
        ]
    );
}

#[test]
fn security_initiation_failure_leaves_link_unsecured() {
    let mut p = boot();
    p.stack_mut().faults.initiate_security = Some(StackError(-3));
    connect(&mut p);

    assert_eq!(p.state(), LinkState::Connected);
    assert!(p.connection().is_some());
}

#[test]
fn failed_connect_goes_back_to_advertising() {
    let mut p = boot();
    p.handle_gap_event(GapEvent::Connect {
        status: 0x3E,
        conn: CONN,
        peer: PEER,
    });

    assert_eq!(p.state(), LinkState::Advertising);
    assert!(p.connection().is_none());
    assert_eq!(p.stack().adv_starts(), 1);
    assert_eq!(p.stack().security_requests(), 0);
}

#[test]
fn encryption_success_secures_link() {
    let mut p = boot();
    connect(&mut p);
    encrypt(&mut p);

    assert_eq!(p.state(), LinkState::Secured);
    assert!(p.connection().is_some_and(|c| c.encrypted));
    let events: Vec<_> = p.drain_events().collect();
    assert!(events.contains(&AppEvent::Secured { conn: CONN }));
}

#[test]
fn encryption_failure_is_reported_not_retried() {
    let mut p = boot();
    connect(&mut p);
    p.handle_gap_event(GapEvent::EncryptionChange {
        conn: CONN,
        status: 0x05,
    });

    assert_eq!(p.state(), LinkState::Connected);
    assert!(!p.connection().unwrap().encrypted);
    // Only the request made on connect.
    assert_eq!(p.stack().security_requests(), 1);
}

#[test]
fn encryption_lost_drops_back_to_connected() {
    let mut p = secured();
    p.handle_gap_event(GapEvent::EncryptionChange {
        conn: CONN,
        status: 0x3D,
    });
    assert_eq!(p.state(), LinkState::Connected);
    assert!(!p.connection().unwrap().encrypted);
}

// ── Disconnect ────────────────────────────────────────────────

#[test]
fn disconnect_clears_link_and_readvertises_exactly_once() {
    let mut p = secured();
    subscribe_input(&mut p);
    let input = handle(&p, AttrKey::InputReport);
    assert!(p.is_subscribed(input));
    let _ = p.drain_events().count();

    disconnect(&mut p, 0x13);

    assert!(p.connection().is_none());
    assert_eq!(p.subscription(input), Some(Cccd::DISABLED));
    assert_eq!(p.state(), LinkState::Advertising);
    assert_eq!(p.stack().adv_starts(), 1);

    let events: Vec<_> = p.drain_events().collect();
    assert!(events.contains(&AppEvent::Disconnected { reason: 0x13 }));
    assert_eq!(
        state_changes(&events),
        [
            (LinkState::Secured, LinkState::Disconnected),
            (LinkState::Disconnected, LinkState::Advertising),
        ]
    );
}

#[test]
fn abnormal_disconnect_from_unsecured_link_readvertises() {
    let mut p = boot();
    connect(&mut p);
    disconnect(&mut p, 0x08);

    assert_eq!(p.state(), LinkState::Advertising);
    assert_eq!(p.stack().adv_starts(), 1);
}

#[test]
fn reconnect_after_disconnect() {
    let mut p = secured();
    disconnect(&mut p, 0x13);
    connect(&mut p);
    encrypt(&mut p);
    assert_eq!(p.state(), LinkState::Secured);
}

#[test]
fn disconnect_for_unknown_connection_is_ignored() {
    let mut p = secured();
    let reply = p.handle_gap_event(GapEvent::Disconnect {
        conn: ConnHandle(9),
        reason: 0x13,
    });
    assert_eq!(reply, GapReply::UnknownConnection);
    assert_eq!(p.state(), LinkState::Secured);
    assert!(p.connection().is_some());
}

#[test]
fn second_connect_while_linked_is_ignored() {
    let mut p = secured();
    p.handle_gap_event(GapEvent::Connect {
        status: 0,
        conn: ConnHandle(2),
        peer: PEER,
    });
    assert_eq!(p.state(), LinkState::Secured);
    assert_eq!(p.connection().unwrap().handle, CONN);
}

// ── Repeat pairing ────────────────────────────────────────────

#[test]
fn repeat_pairing_deletes_bond_and_retries() {
    let mut p = secured();
    let reply = p.handle_gap_event(GapEvent::RepeatPairing { conn: CONN });

    assert_eq!(reply, GapReply::RetryPairing);
    assert_eq!(p.stack().calls, vec![StackCall::DeleteBond(PEER)]);
    assert_eq!(p.state(), LinkState::Connected);
    assert!(!p.connection().unwrap().encrypted);

    // Pairing then completes normally.
    encrypt(&mut p);
    assert_eq!(p.state(), LinkState::Secured);
}

#[test]
fn repeat_pairing_retries_even_if_bond_delete_fails() {
    let mut p = secured();
    p.stack_mut().faults.delete_bond = Some(StackError(-1));
    let reply = p.handle_gap_event(GapEvent::RepeatPairing { conn: CONN });
    assert_eq!(reply, GapReply::RetryPairing);
}

#[test]
fn repeat_pairing_on_unsecured_link() {
    let mut p = boot();
    connect(&mut p);
    let reply = p.handle_gap_event(GapEvent::RepeatPairing { conn: CONN });
    assert_eq!(reply, GapReply::RetryPairing);
    assert_eq!(p.state(), LinkState::Connected);
}

// ── MTU ───────────────────────────────────────────────────────

#[test]
fn mtu_exchange_updates_link() {
    let mut p = secured();
    p.handle_gap_event(GapEvent::Mtu {
        conn: CONN,
        value: 185,
    });
    assert_eq!(p.connection().unwrap().mtu, 185);
}

// ── Stack reset / advertising failures ────────────────────────

#[test]
fn stack_reset_drops_link_and_waits_for_sync() {
    let mut p = secured();
    p.handle_gap_event(GapEvent::Reset { reason: 0x10 });

    assert_eq!(p.state(), LinkState::Idle);
    assert!(p.connection().is_none());
    assert_eq!(p.stack().adv_starts(), 0);

    p.handle_gap_event(GapEvent::Synced);
    assert_eq!(p.state(), LinkState::Advertising);
    assert_eq!(p.stack().adv_starts(), 1);
}

#[test]
fn rejected_adv_data_aborts_start() {
    let mut p = secured();
    p.stack_mut().faults.adv_data = Some(StackError(-2));
    disconnect(&mut p, 0x13);

    assert_eq!(p.state(), LinkState::Advertising);
    assert_eq!(p.stack().adv_starts(), 0);
    assert_eq!(p.adv_error(), Some(AdvError::SetData(StackError(-2))));
    let events: Vec<_> = p.drain_events().collect();
    assert!(events.contains(&AppEvent::AdvertisingFailed(AdvError::SetData(
        StackError(-2)
    ))));
}

#[test]
fn rejected_scan_response_aborts_start() {
    let mut stack = SimStack::new();
    stack.faults.scan_response = Some(StackError(-4));
    let mut p = ble_keyboard::app::service::Peripheral::new(PeripheralConfig::default(), stack);
    p.init().unwrap();
    p.handle_gap_event(GapEvent::Synced);

    assert_eq!(p.stack().adv_starts(), 0);
    assert_eq!(p.adv_error(), Some(AdvError::SetScanResponse(StackError(-4))));
}
