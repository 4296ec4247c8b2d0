//! Battery service (0x180F).
//!
//! A single Battery Level value (percent, `uint8`) that a central may
//! subscribe to, plus a Presentation Format descriptor describing the
//! unit.  The level is changed at runtime through
//! `Peripheral::set_battery_level`.

use crate::error::AttError;
use crate::gatt::dispatcher::{AccessCtx, AttBuf};
use crate::gatt::registry::{AttrKey, Caps, CharDecl, DescDecl, ServiceDecl};
use crate::gatt::uuids;

pub static SERVICE: ServiceDecl = ServiceDecl {
    uuid: uuids::BATTERY,
    characteristics: &[CharDecl {
        uuid: uuids::BATTERY_LEVEL,
        key: AttrKey::BatteryLevel,
        caps: Caps::READ.union(Caps::NOTIFY),
        descriptors: &[
            DescDecl {
                uuid: uuids::CLIENT_CHARACTERISTIC_CONFIGURATION,
                key: AttrKey::BatteryLevelCccd,
                caps: Caps::READ.union(Caps::WRITE),
            },
            DescDecl {
                uuid: uuids::PRESENTATION_FORMAT,
                key: AttrKey::BatteryLevelFormat,
                caps: Caps::READ,
            },
        ],
    }],
};

pub(super) fn read_level(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&[ctx.values.battery_level])
}

pub(super) fn read_format(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&ctx.values.battery_format.to_bytes())
}
