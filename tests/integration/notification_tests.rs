//! Integration tests for outbound notifications: gate preconditions,
//! subscription policy and the full keypress round trip.

use ble_keyboard::adapters::log_sink::LogEventSink;
use ble_keyboard::adapters::sim::{SimStack, StackCall};
use ble_keyboard::app::events::{AppEvent, GapEvent};
use ble_keyboard::app::service::Peripheral;
use ble_keyboard::config::{PeripheralConfig, SubscribePolicy};
use ble_keyboard::error::{SendError, StackError};
use ble_keyboard::fsm::LinkState;
use ble_keyboard::gatt::formats::{Cccd, KeyboardReport};
use ble_keyboard::gatt::registry::AttrKey;

use crate::mock_stack::{
    boot, boot_with, connect, disconnect, encrypt, handle, secured, subscribe_input, write_dsc,
    CaptureSink, CONN,
};

/// Left Shift + 'a'.
const SHIFT_A: KeyboardReport = KeyboardReport::key(0x02, 0x04);

// ── Gate preconditions ────────────────────────────────────────

#[test]
fn nothing_is_sent_without_a_link() {
    let mut p = boot();
    assert_eq!(
        p.send_input_report(&SHIFT_A),
        Err(SendError::NotConnected)
    );
    assert_eq!(p.set_battery_level(80), Err(SendError::NotConnected));
    assert!(p.stack().notifications().is_empty());
}

#[test]
fn unsubscribed_value_is_not_sent() {
    let mut p = secured();
    assert_eq!(
        p.send_input_report(&SHIFT_A),
        Err(SendError::NotSubscribed)
    );
    assert!(p.stack().notifications().is_empty());
}

#[test]
fn input_report_needs_encrypted_link() {
    let mut p = boot();
    connect(&mut p);
    subscribe_input(&mut p);

    assert_eq!(p.send_input_report(&SHIFT_A), Err(SendError::Unencrypted));
    assert!(p.stack().notifications().is_empty());

    encrypt(&mut p);
    p.send_input_report(&SHIFT_A).unwrap();
    assert_eq!(p.stack().notifications().len(), 1);
}

#[test]
fn non_notifiable_handle_is_rejected() {
    let mut p = secured();
    let map = handle(&p, AttrKey::ReportMap);
    assert_eq!(p.send(map, &[0]), Err(SendError::UnknownHandle));
    assert_eq!(p.send(0x0001, &[0]), Err(SendError::UnknownHandle));
}

#[test]
fn payload_must_fit_att_mtu() {
    let mut p = secured();
    subscribe_input(&mut p);
    let input = handle(&p, AttrKey::InputReport);

    assert_eq!(p.send(input, &[0; 21]), Err(SendError::TooLarge));

    p.handle_gap_event(GapEvent::Mtu {
        conn: CONN,
        value: 64,
    });
    p.send(input, &[0; 21]).unwrap();
}

#[test]
fn stack_refusal_is_a_transport_error() {
    let mut p = secured();
    subscribe_input(&mut p);
    p.stack_mut().faults.notify = Some(StackError(-5));
    assert_eq!(
        p.send_input_report(&SHIFT_A),
        Err(SendError::Transport(StackError(-5)))
    );
}

// ── Round trip ────────────────────────────────────────────────

#[test]
fn keypress_reaches_subscribed_host_and_link_loss_resets() {
    let mut p = boot();
    connect(&mut p);
    encrypt(&mut p);
    assert_eq!(p.state(), LinkState::Secured);

    let input = handle(&p, AttrKey::InputReport);
    let cccd = handle(&p, AttrKey::InputReportCccd);
    write_dsc(&mut p, cccd, &[0x01, 0x00]).unwrap();
    p.stack_mut().clear();

    p.send_input_report(&SHIFT_A).unwrap();
    p.send_input_report(&KeyboardReport::RELEASED).unwrap();
    assert_eq!(
        p.stack().notifications(),
        vec![
            (input, vec![0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]),
            (input, vec![0x00; 8]),
        ]
    );
    assert!(matches!(
        p.stack().calls[0],
        StackCall::Notify { conn: CONN, .. }
    ));

    p.stack_mut().clear();
    disconnect(&mut p, 0x13);
    assert_eq!(p.subscription(input), Some(Cccd::DISABLED));
    assert_eq!(p.state(), LinkState::Advertising);
    assert_eq!(p.stack().adv_starts(), 1);

    // A fresh link starts unsubscribed.
    connect(&mut p);
    encrypt(&mut p);
    assert_eq!(
        p.send_input_report(&SHIFT_A),
        Err(SendError::NotSubscribed)
    );
}

#[test]
fn battery_notification_on_unencrypted_link() {
    let mut p = boot();
    connect(&mut p);
    let level = handle(&p, AttrKey::BatteryLevel);
    let cccd = handle(&p, AttrKey::BatteryLevelCccd);
    write_dsc(&mut p, cccd, &[0x01, 0x00]).unwrap();

    p.set_battery_level(150).unwrap();
    assert_eq!(p.values().battery_level, 100);
    assert_eq!(p.stack().notifications(), vec![(level, vec![100])]);
}

#[test]
fn indication_is_used_only_when_supported() {
    let mut p = secured();
    let level = handle(&p, AttrKey::BatteryLevel);
    let cccd = handle(&p, AttrKey::BatteryLevelCccd);

    // Battery Level declares notify only.
    write_dsc(&mut p, cccd, &[0x02, 0x00]).unwrap();
    assert_eq!(p.set_battery_level(50), Err(SendError::NotSubscribed));

    write_dsc(&mut p, cccd, &[0x03, 0x00]).unwrap();
    p.set_battery_level(50).unwrap();
    assert_eq!(
        p.stack().calls,
        vec![StackCall::Notify {
            conn: CONN,
            handle: level,
            data: vec![50]
        }]
    );
}

// ── Subscribe policy ──────────────────────────────────────────

fn linked_with_policy(policy: SubscribePolicy) -> Peripheral<SimStack> {
    let mut p = boot_with(PeripheralConfig {
        subscribe_policy: policy,
        ..PeripheralConfig::default()
    });
    connect(&mut p);
    p.stack_mut().clear();
    let _ = p.drain_events().count();
    p
}

#[test]
fn stack_subscribe_on_unencrypted_link_initiates_security() {
    let mut p = linked_with_policy(SubscribePolicy::InitiateSecurity);
    let input = handle(&p, AttrKey::InputReport);
    p.handle_gap_event(GapEvent::Subscribe {
        conn: CONN,
        attr_handle: input,
        notify: true,
        indicate: false,
    });

    assert!(p.is_subscribed(input));
    assert_eq!(p.stack().security_requests(), 1);
    let events: Vec<_> = p.drain_events().collect();
    assert!(events.contains(&AppEvent::SubscriptionChanged {
        handle: input,
        cccd: Cccd {
            notify: true,
            indicate: false
        },
    }));
}

#[test]
fn stack_subscribe_with_log_only_policy_waits() {
    let mut p = linked_with_policy(SubscribePolicy::LogOnly);
    let input = handle(&p, AttrKey::InputReport);
    p.handle_gap_event(GapEvent::Subscribe {
        conn: CONN,
        attr_handle: input,
        notify: true,
        indicate: false,
    });

    assert!(p.is_subscribed(input));
    assert_eq!(p.stack().security_requests(), 0);
}

#[test]
fn cccd_write_applies_the_same_policy() {
    let mut p = linked_with_policy(SubscribePolicy::InitiateSecurity);
    subscribe_input(&mut p);
    assert_eq!(p.stack().security_requests(), 1);

    let mut p = linked_with_policy(SubscribePolicy::LogOnly);
    subscribe_input(&mut p);
    assert_eq!(p.stack().security_requests(), 0);
}

#[test]
fn unsubscribe_never_initiates_security() {
    let mut p = linked_with_policy(SubscribePolicy::InitiateSecurity);
    let cccd = handle(&p, AttrKey::InputReportCccd);
    write_dsc(&mut p, cccd, &[0x00, 0x00]).unwrap();
    assert_eq!(p.stack().security_requests(), 0);
}

#[test]
fn subscribe_on_encrypted_link_is_just_recorded() {
    let mut p = secured();
    subscribe_input(&mut p);
    assert_eq!(p.stack().security_requests(), 0);
}

#[test]
fn subscribe_on_non_notifiable_handle_is_ignored() {
    let mut p = linked_with_policy(SubscribePolicy::InitiateSecurity);
    let map = handle(&p, AttrKey::ReportMap);
    p.handle_gap_event(GapEvent::Subscribe {
        conn: CONN,
        attr_handle: map,
        notify: true,
        indicate: false,
    });
    assert_eq!(p.stack().security_requests(), 0);
    assert_eq!(p.drain_events().count(), 0);
}

// ── Event delivery ────────────────────────────────────────────

#[test]
fn queued_events_reach_the_sink_in_order() {
    let mut p = boot();
    connect(&mut p);
    encrypt(&mut p);

    let mut sink = CaptureSink::new();
    p.flush_events(&mut sink);
    let first_connected = sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::Connected { .. }));
    let first_secured = sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::Secured { .. }));
    assert!(first_connected < first_secured);
    assert!(first_connected.is_some());

    // Queue is empty after a flush.
    let before = sink.events.len();
    p.flush_events(&mut sink);
    assert_eq!(sink.events.len(), before);
}

#[test]
fn log_sink_counts_emitted_events() {
    let mut p = boot();
    connect(&mut p);
    let mut sink = LogEventSink::new();
    p.flush_events(&mut sink);
    assert_eq!(sink.emitted(), 3);
}
