//! GATT services exposed by the keyboard: Device Information, Battery and
//! HID over GATT.
//!
//! Each submodule contributes a static [`ServiceDecl`] and the read/write
//! handlers for its attributes.  [`build_handler_table`] stitches the
//! handlers into the dispatcher's table, one row per [`AttrKey`].

pub mod battery;
pub mod device_info;
pub mod hid;

use heapless::String;

use crate::app::events::AppEvent;
use crate::config::{MAX_MANUFACTURER_LEN, PeripheralConfig};
use crate::error::AttError;
use crate::gatt::dispatcher::{AccessCtx, AttBuf, AttrHandler};
use crate::gatt::formats::{
    Cccd, HidInformation, KeyboardReport, PnpId, PresentationFormat, ProtocolMode,
};
use crate::gatt::registry::{AttrKey, ServiceDecl};
use crate::gatt::uuids;

/// Registration order; handles are assigned in this order.
pub static SERVICES: [&ServiceDecl; 3] = [
    &device_info::SERVICE,
    &battery::SERVICE,
    &hid::SERVICE,
];

// ───────────────────────────────────────────────────────────────
// Value cells
// ───────────────────────────────────────────────────────────────

/// Every mutable or configured attribute value, owned by the peripheral.
#[derive(Debug, Clone)]
pub struct ServiceValues {
    pub manufacturer: String<MAX_MANUFACTURER_LEN>,
    pub pnp_id: PnpId,
    pub battery_level: u8,
    pub battery_format: PresentationFormat,
    pub hid_info: HidInformation,
    pub report_id: u8,
    pub protocol_mode: ProtocolMode,
    /// Last report pushed to the host; served on Input Report reads.
    pub input_report: KeyboardReport,
    /// LED bitmap from the last Output Report write.
    pub keyboard_leds: u8,
    pub suspended: bool,
}

impl ServiceValues {
    pub fn from_config(cfg: &PeripheralConfig) -> Self {
        Self {
            manufacturer: cfg.manufacturer.clone(),
            pnp_id: cfg.pnp_id,
            battery_level: cfg.battery_level.min(100),
            battery_format: PresentationFormat {
                format: PresentationFormat::FORMAT_UINT8,
                exponent: 0,
                unit: uuids::UNIT_PERCENTAGE,
                namespace: PresentationFormat::NAMESPACE_SIG,
                description: 0x0000,
            },
            hid_info: cfg.hid_info,
            report_id: cfg.report_id,
            protocol_mode: ProtocolMode::Report,
            input_report: KeyboardReport::RELEASED,
            keyboard_leds: 0,
            suspended: false,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Handler table
// ───────────────────────────────────────────────────────────────

/// One row per `AttrKey`, in discriminant order.
pub fn build_handler_table() -> [AttrHandler; AttrKey::COUNT] {
    [
        // Index 0 — Device Information
        AttrHandler {
            key: AttrKey::ManufacturerName,
            read: Some(device_info::read_manufacturer),
            write: None,
        },
        // Index 1
        AttrHandler {
            key: AttrKey::PnpId,
            read: Some(device_info::read_pnp_id),
            write: None,
        },
        // Index 2 — Battery
        AttrHandler {
            key: AttrKey::BatteryLevel,
            read: Some(battery::read_level),
            write: None,
        },
        // Index 3
        AttrHandler {
            key: AttrKey::BatteryLevelCccd,
            read: Some(read_cccd),
            write: Some(write_cccd),
        },
        // Index 4
        AttrHandler {
            key: AttrKey::BatteryLevelFormat,
            read: Some(battery::read_format),
            write: None,
        },
        // Index 5 — HID
        AttrHandler {
            key: AttrKey::HidInformation,
            read: Some(hid::read_info),
            write: None,
        },
        // Index 6
        AttrHandler {
            key: AttrKey::ReportMap,
            read: Some(hid::read_report_map),
            write: None,
        },
        // Index 7
        AttrHandler {
            key: AttrKey::HidControlPoint,
            read: None,
            write: Some(hid::write_control_point),
        },
        // Index 8
        AttrHandler {
            key: AttrKey::InputReport,
            read: Some(hid::read_input_report),
            write: None,
        },
        // Index 9
        AttrHandler {
            key: AttrKey::InputReportReference,
            read: Some(hid::read_input_reference),
            write: None,
        },
        // Index 10
        AttrHandler {
            key: AttrKey::InputReportCccd,
            read: Some(read_cccd),
            write: Some(write_cccd),
        },
        // Index 11
        AttrHandler {
            key: AttrKey::OutputReport,
            read: Some(hid::read_output_report),
            write: Some(hid::write_output_report),
        },
        // Index 12
        AttrHandler {
            key: AttrKey::OutputReportReference,
            read: Some(hid::read_output_reference),
            write: None,
        },
        // Index 13
        AttrHandler {
            key: AttrKey::ProtocolMode,
            read: Some(hid::read_protocol_mode),
            write: Some(hid::write_protocol_mode),
        },
    ]
}

// ───────────────────────────────────────────────────────────────
// Shared CCCD handlers
// ───────────────────────────────────────────────────────────────

/// CCCD reads are served from the gate's record for the owning value.
fn read_cccd(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    let cccd = ctx
        .gate
        .subscription(ctx.attr.value_handle)
        .ok_or(AttError::NotFound)?;
    out.append(&cccd.to_bytes())
}

fn write_cccd(ctx: &mut AccessCtx<'_>, data: &[u8]) -> Result<Option<AppEvent>, AttError> {
    let cccd = Cccd::from_bytes(data)?;
    let handle = ctx.attr.value_handle;
    ctx.gate.set_subscription(handle, cccd)?;
    Ok(Some(AppEvent::SubscriptionChanged { handle, cccd }))
}
