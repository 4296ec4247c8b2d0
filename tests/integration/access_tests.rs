//! Integration tests for ATT reads and writes routed through the
//! attribute dispatcher.

use ble_keyboard::app::events::{AppEvent, ConnHandle, ControlPointCommand};
use ble_keyboard::error::{AttError, SendError};
use ble_keyboard::gatt::dispatcher::{Access, AttBuf};
use ble_keyboard::gatt::formats::{Cccd, KeyboardReport, ProtocolMode};
use ble_keyboard::gatt::registry::{AttrKey, AttrKind};
use ble_keyboard::services::hid::{REPORT_MAP, REPORT_MAP_LEN};

use crate::mock_stack::{
    boot, connect, encrypt, handle, read_chr, read_dsc, secured, write_chr, write_dsc, CONN,
};

// ── Lookup / operation checks ─────────────────────────────────

#[test]
fn unknown_handle_is_not_found() {
    let mut p = secured();
    assert_eq!(read_chr(&mut p, 0x0001), Err(AttError::NotFound));
    assert_eq!(write_chr(&mut p, 0xFFFF, &[0]), Err(AttError::NotFound));
    assert_eq!(read_dsc(&mut p, 0x0002), Err(AttError::NotFound));
}

#[test]
fn declarations_are_not_served_by_the_dispatcher() {
    let mut p = boot();
    let decl = handle(&p, AttrKey::BatteryLevel) - 1;
    assert_eq!(
        p.attribute(decl).map(|a| a.kind),
        Some(AttrKind::CharacteristicDeclaration)
    );
    assert_eq!(read_chr(&mut p, decl), Err(AttError::Unsupported));
}

#[test]
fn operation_must_match_attribute_kind() {
    let mut p = boot();
    let level = handle(&p, AttrKey::BatteryLevel);
    let cccd = handle(&p, AttrKey::BatteryLevelCccd);
    assert_eq!(read_dsc(&mut p, level), Err(AttError::Unsupported));
    assert_eq!(read_chr(&mut p, cccd), Err(AttError::Unsupported));
}

#[test]
fn undeclared_operation_is_unsupported() {
    let mut p = secured();
    let level = handle(&p, AttrKey::BatteryLevel);
    let map = handle(&p, AttrKey::ReportMap);
    let cp = handle(&p, AttrKey::HidControlPoint);
    let format = handle(&p, AttrKey::BatteryLevelFormat);

    assert_eq!(write_chr(&mut p, level, &[50]), Err(AttError::Unsupported));
    assert_eq!(write_chr(&mut p, map, &[0]), Err(AttError::Unsupported));
    assert_eq!(read_chr(&mut p, cp), Err(AttError::Unsupported));
    assert_eq!(write_dsc(&mut p, format, &[0; 7]), Err(AttError::Unsupported));
    assert_eq!(p.values().battery_level, 100);
}

#[test]
fn short_read_buffer_is_insufficient_resources() {
    let mut p = boot();
    let map = handle(&p, AttrKey::ReportMap);
    let mut storage = [0u8; 16];
    let mut buf = AttBuf::new(&mut storage);
    assert_eq!(
        p.on_access(CONN, map, Access::ReadChr(&mut buf)),
        Err(AttError::InsufficientResources)
    );
    assert_eq!(AttError::InsufficientResources.att_code(), 0x11);
}

// ── Device Information ────────────────────────────────────────

#[test]
fn manufacturer_name() {
    let mut p = boot();
    let h = handle(&p, AttrKey::ManufacturerName);
    assert_eq!(read_chr(&mut p, h).unwrap(), b"X");
}

#[test]
fn pnp_id_is_little_endian() {
    let mut p = boot();
    let h = handle(&p, AttrKey::PnpId);
    assert_eq!(
        read_chr(&mut p, h).unwrap(),
        [0x02, 0x02, 0xE5, 0x11, 0xA1, 0x10, 0x02]
    );
}

// ── Battery ───────────────────────────────────────────────────

#[test]
fn battery_level_reads_current_value() {
    let mut p = boot();
    let h = handle(&p, AttrKey::BatteryLevel);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0x64]);

    let _ = p.set_battery_level(42);
    assert_eq!(read_chr(&mut p, h).unwrap(), [42]);
}

#[test]
fn battery_presentation_format() {
    let mut p = boot();
    let h = handle(&p, AttrKey::BatteryLevelFormat);
    assert_eq!(
        read_dsc(&mut p, h).unwrap(),
        [0x04, 0x00, 0xAD, 0x27, 0x01, 0x00, 0x00]
    );
}

// ── CCCD ──────────────────────────────────────────────────────

#[test]
fn cccd_starts_disabled() {
    let mut p = boot();
    let h = handle(&p, AttrKey::InputReportCccd);
    assert_eq!(read_dsc(&mut p, h).unwrap(), [0x00, 0x00]);
}

#[test]
fn cccd_write_then_read() {
    let mut p = secured();
    let value = handle(&p, AttrKey::BatteryLevel);
    let cccd = handle(&p, AttrKey::BatteryLevelCccd);

    write_dsc(&mut p, cccd, &[0x01, 0x00]).unwrap();
    assert_eq!(read_dsc(&mut p, cccd).unwrap(), [0x01, 0x00]);
    assert!(p.is_subscribed(value));

    let events: Vec<_> = p.drain_events().collect();
    assert!(events.contains(&AppEvent::SubscriptionChanged {
        handle: value,
        cccd: Cccd {
            notify: true,
            indicate: false
        },
    }));

    write_dsc(&mut p, cccd, &[0x00, 0x00]).unwrap();
    assert!(!p.is_subscribed(value));
}

#[test]
fn cccd_reserved_bits_are_dropped() {
    let mut p = secured();
    let cccd = handle(&p, AttrKey::InputReportCccd);
    write_dsc(&mut p, cccd, &[0xFD, 0xFF]).unwrap();
    assert_eq!(read_dsc(&mut p, cccd).unwrap(), [0x01, 0x00]);
}

#[test]
fn short_cccd_write_is_rejected_without_side_effects() {
    let mut p = secured();
    let value = handle(&p, AttrKey::InputReport);
    let cccd = handle(&p, AttrKey::InputReportCccd);

    assert_eq!(write_dsc(&mut p, cccd, &[0x01]), Err(AttError::Malformed));
    assert_eq!(write_dsc(&mut p, cccd, &[]), Err(AttError::Malformed));
    assert_eq!(p.subscription(value), Some(Cccd::DISABLED));
    assert_eq!(p.drain_events().count(), 0);
}

// ── Connection ownership ──────────────────────────────────────

const STRANGER: ConnHandle = ConnHandle(7);

#[test]
fn cccd_write_without_link_is_rejected() {
    let mut p = boot();
    let value = handle(&p, AttrKey::InputReport);
    let cccd = handle(&p, AttrKey::InputReportCccd);

    assert_eq!(
        p.on_access(STRANGER, cccd, Access::WriteDsc(&[0x01, 0x00])),
        Err(AttError::UnknownConnection)
    );
    assert!(!p.is_subscribed(value));
    assert_eq!(p.drain_events().count(), 0);

    // The next central starts from a clean slate.
    connect(&mut p);
    encrypt(&mut p);
    assert_eq!(
        p.send_input_report(&KeyboardReport::key(0x00, 0x04)),
        Err(SendError::NotSubscribed)
    );
    assert!(p.stack().notifications().is_empty());
}

#[test]
fn write_from_foreign_connection_is_rejected() {
    let mut p = secured();
    let value = handle(&p, AttrKey::InputReport);
    let cccd = handle(&p, AttrKey::InputReportCccd);
    let leds = handle(&p, AttrKey::OutputReport);

    assert_eq!(
        p.on_access(STRANGER, cccd, Access::WriteDsc(&[0x01, 0x00])),
        Err(AttError::UnknownConnection)
    );
    assert_eq!(
        p.on_access(STRANGER, leds, Access::WriteChr(&[0x01])),
        Err(AttError::UnknownConnection)
    );
    assert!(!p.is_subscribed(value));
    assert_eq!(p.values().keyboard_leds, 0);
    assert_eq!(
        p.send_input_report(&KeyboardReport::key(0x00, 0x04)),
        Err(SendError::NotSubscribed)
    );
    assert!(p.stack().notifications().is_empty());
    assert_eq!(p.drain_events().count(), 0);
}

#[test]
fn reads_are_served_without_a_live_link() {
    let mut p = boot();
    let h = handle(&p, AttrKey::BatteryLevel);
    let mut storage = [0u8; 4];
    let mut buf = AttBuf::new(&mut storage);
    p.on_access(STRANGER, h, Access::ReadChr(&mut buf)).unwrap();
    assert_eq!(buf.as_slice(), [100]);
}

// ── HID ───────────────────────────────────────────────────────

#[test]
fn hid_information() {
    let mut p = boot();
    let h = handle(&p, AttrKey::HidInformation);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0x11, 0x01, 0x00, 0x02]);
}

#[test]
fn report_map_is_served_whole() {
    let mut p = boot();
    let h = handle(&p, AttrKey::ReportMap);
    let map = read_chr(&mut p, h).unwrap();
    assert_eq!(map.len(), REPORT_MAP_LEN);
    assert_eq!(map, REPORT_MAP);
}

#[test]
fn report_references() {
    let mut p = boot();
    let input = handle(&p, AttrKey::InputReportReference);
    let output = handle(&p, AttrKey::OutputReportReference);
    assert_eq!(read_dsc(&mut p, input).unwrap(), [0x01, 0x01]);
    assert_eq!(read_dsc(&mut p, output).unwrap(), [0x01, 0x02]);
}

#[test]
fn input_report_read_returns_last_report() {
    let mut p = secured();
    let h = handle(&p, AttrKey::InputReport);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0; 8]);

    // Not subscribed, so nothing goes out; the value is still kept.
    let _ = p.send_input_report(&KeyboardReport::key(0x02, 0x04));
    assert_eq!(
        read_chr(&mut p, h).unwrap(),
        [0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn output_report_write_sets_leds() {
    let mut p = secured();
    let h = handle(&p, AttrKey::OutputReport);

    write_chr(&mut p, h, &[0x03]).unwrap();
    assert_eq!(p.values().keyboard_leds, 0x03);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0x03]);
    let events: Vec<_> = p.drain_events().collect();
    assert_eq!(events, [AppEvent::KeyboardLeds(0x03)]);

    assert_eq!(write_chr(&mut p, h, &[]), Err(AttError::Malformed));
}

#[test]
fn control_point_suspend_and_exit() {
    let mut p = secured();
    let h = handle(&p, AttrKey::HidControlPoint);

    write_chr(&mut p, h, &[0x00]).unwrap();
    assert!(p.values().suspended);
    write_chr(&mut p, h, &[0x01]).unwrap();
    assert!(!p.values().suspended);

    let events: Vec<_> = p.drain_events().collect();
    assert_eq!(
        events,
        [
            AppEvent::ControlPoint(ControlPointCommand::Suspend),
            AppEvent::ControlPoint(ControlPointCommand::ExitSuspend),
        ]
    );
}

#[test]
fn control_point_rejects_unknown_command() {
    let mut p = secured();
    let h = handle(&p, AttrKey::HidControlPoint);
    assert_eq!(write_chr(&mut p, h, &[0x02]), Err(AttError::Malformed));
    assert_eq!(write_chr(&mut p, h, &[]), Err(AttError::Malformed));
    assert!(!p.values().suspended);
}

#[test]
fn protocol_mode_read_and_write() {
    let mut p = secured();
    let h = handle(&p, AttrKey::ProtocolMode);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0x01]);

    write_chr(&mut p, h, &[0x00]).unwrap();
    assert_eq!(p.values().protocol_mode, ProtocolMode::Boot);
    assert_eq!(read_chr(&mut p, h).unwrap(), [0x00]);

    assert_eq!(write_chr(&mut p, h, &[0x07]), Err(AttError::Malformed));
    assert_eq!(p.values().protocol_mode, ProtocolMode::Boot);
}
