//! HID over GATT service (0x1812) for a boot-compatible keyboard.
//!
//! Input reports carry no report-id byte on the wire; the id is conveyed
//! by the Report Reference descriptor and must match the id embedded in
//! the report map.

use log::info;

use crate::app::events::{AppEvent, ControlPointCommand};
use crate::error::AttError;
use crate::gatt::dispatcher::{AccessCtx, AttBuf};
use crate::gatt::formats::{take, ProtocolMode, ReportReference, ReportType};
use crate::gatt::registry::{AttrKey, Caps, CharDecl, DescDecl, ServiceDecl};
use crate::gatt::uuids;

pub static SERVICE: ServiceDecl = ServiceDecl {
    uuid: uuids::HUMAN_INTERFACE_DEVICE,
    characteristics: &[
        CharDecl {
            uuid: uuids::HID_INFORMATION,
            key: AttrKey::HidInformation,
            caps: Caps::READ,
            descriptors: &[],
        },
        CharDecl {
            uuid: uuids::REPORT_MAP,
            key: AttrKey::ReportMap,
            caps: Caps::READ,
            descriptors: &[],
        },
        CharDecl {
            uuid: uuids::HID_CONTROL_POINT,
            key: AttrKey::HidControlPoint,
            caps: Caps::WRITE_NO_RSP,
            descriptors: &[],
        },
        CharDecl {
            uuid: uuids::REPORT,
            key: AttrKey::InputReport,
            caps: Caps::READ.union(Caps::NOTIFY).union(Caps::ENCRYPTED),
            descriptors: &[
                DescDecl {
                    uuid: uuids::REPORT_REFERENCE,
                    key: AttrKey::InputReportReference,
                    caps: Caps::READ,
                },
                DescDecl {
                    uuid: uuids::CLIENT_CHARACTERISTIC_CONFIGURATION,
                    key: AttrKey::InputReportCccd,
                    caps: Caps::READ.union(Caps::WRITE),
                },
            ],
        },
        CharDecl {
            uuid: uuids::REPORT,
            key: AttrKey::OutputReport,
            caps: Caps::READ.union(Caps::WRITE).union(Caps::WRITE_NO_RSP),
            descriptors: &[DescDecl {
                uuid: uuids::REPORT_REFERENCE,
                key: AttrKey::OutputReportReference,
                caps: Caps::READ,
            }],
        },
        CharDecl {
            uuid: uuids::PROTOCOL_MODE,
            key: AttrKey::ProtocolMode,
            caps: Caps::READ.union(Caps::WRITE_NO_RSP),
            descriptors: &[],
        },
    ],
};

// ───────────────────────────────────────────────────────────────
// Report map
// ───────────────────────────────────────────────────────────────

/// Offset of the Report ID value inside [`REPORT_MAP`].
const REPORT_ID_OFFSET: usize = 7;

pub const REPORT_MAP_LEN: usize = 65;

/// Keyboard: 8 modifier bits, 1 reserved byte, 5 LED outputs (+3 pad),
/// 6 key slots.  The Report ID byte is patched per configuration.
pub const REPORT_MAP: [u8; REPORT_MAP_LEN] = [
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x01, //   Report ID (1)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant) reserved byte
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant) padding
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

pub fn report_map(report_id: u8) -> [u8; REPORT_MAP_LEN] {
    let mut map = REPORT_MAP;
    map[REPORT_ID_OFFSET] = report_id;
    map
}

// ───────────────────────────────────────────────────────────────
// Handlers
// ───────────────────────────────────────────────────────────────

pub(super) fn read_info(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&ctx.values.hid_info.to_bytes())
}

pub(super) fn read_report_map(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&report_map(ctx.values.report_id))
}

pub(super) fn write_control_point(
    ctx: &mut AccessCtx<'_>,
    data: &[u8],
) -> Result<Option<AppEvent>, AttError> {
    let [value] = take::<1>(data)?;
    let cmd = match value {
        0x00 => ControlPointCommand::Suspend,
        0x01 => ControlPointCommand::ExitSuspend,
        _ => return Err(AttError::Malformed),
    };
    ctx.values.suspended = cmd == ControlPointCommand::Suspend;
    info!("HID: control point {:?}", cmd);
    Ok(Some(AppEvent::ControlPoint(cmd)))
}

pub(super) fn read_input_report(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&ctx.values.input_report.to_bytes())
}

pub(super) fn read_input_reference(
    ctx: &AccessCtx<'_>,
    out: &mut AttBuf<'_>,
) -> Result<(), AttError> {
    let rr = ReportReference {
        report_id: ctx.values.report_id,
        report_type: ReportType::Input,
    };
    out.append(&rr.to_bytes())
}

pub(super) fn read_output_report(
    ctx: &AccessCtx<'_>,
    out: &mut AttBuf<'_>,
) -> Result<(), AttError> {
    out.append(&[ctx.values.keyboard_leds])
}

pub(super) fn write_output_report(
    ctx: &mut AccessCtx<'_>,
    data: &[u8],
) -> Result<Option<AppEvent>, AttError> {
    let [leds] = take::<1>(data)?;
    ctx.values.keyboard_leds = leds;
    Ok(Some(AppEvent::KeyboardLeds(leds)))
}

pub(super) fn read_output_reference(
    ctx: &AccessCtx<'_>,
    out: &mut AttBuf<'_>,
) -> Result<(), AttError> {
    let rr = ReportReference {
        report_id: ctx.values.report_id,
        report_type: ReportType::Output,
    };
    out.append(&rr.to_bytes())
}

pub(super) fn read_protocol_mode(
    ctx: &AccessCtx<'_>,
    out: &mut AttBuf<'_>,
) -> Result<(), AttError> {
    out.append(&[ctx.values.protocol_mode as u8])
}

pub(super) fn write_protocol_mode(
    ctx: &mut AccessCtx<'_>,
    data: &[u8],
) -> Result<Option<AppEvent>, AttError> {
    let [raw] = take::<1>(data)?;
    let mode = ProtocolMode::from_byte(raw).ok_or(AttError::Malformed)?;
    ctx.values.protocol_mode = mode;
    Ok(Some(AppEvent::ProtocolModeChanged(mode)))
}
