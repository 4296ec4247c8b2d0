//! Device Information service (0x180A).

use crate::error::AttError;
use crate::gatt::dispatcher::{AccessCtx, AttBuf};
use crate::gatt::registry::{AttrKey, Caps, CharDecl, ServiceDecl};
use crate::gatt::uuids;

pub static SERVICE: ServiceDecl = ServiceDecl {
    uuid: uuids::DEVICE_INFORMATION,
    characteristics: &[
        CharDecl {
            uuid: uuids::MANUFACTURER_NAME,
            key: AttrKey::ManufacturerName,
            caps: Caps::READ,
            descriptors: &[],
        },
        CharDecl {
            uuid: uuids::PNP_ID,
            key: AttrKey::PnpId,
            caps: Caps::READ,
            descriptors: &[],
        },
    ],
};

pub(super) fn read_manufacturer(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(ctx.values.manufacturer.as_bytes())
}

pub(super) fn read_pnp_id(ctx: &AccessCtx<'_>, out: &mut AttBuf<'_>) -> Result<(), AttError> {
    out.append(&ctx.values.pnp_id.to_bytes())
}
