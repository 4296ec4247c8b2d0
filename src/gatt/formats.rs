//! Fixed-size binary value formats.
//!
//! All layouts are packed little-endian with no padding:
//!
//! | Value                    | Size | Layout                                         |
//! |--------------------------|------|------------------------------------------------|
//! | Battery Level            | 1    | percent (0–100)                                |
//! | CCCD                     | 2    | bit0 notify, bit1 indicate                     |
//! | Presentation Format      | 7    | format, exponent, unit:2, namespace, descr:2   |
//! | PnP ID                   | 7    | vid source, vid:2, pid:2, version:2            |
//! | HID Information          | 4    | bcdHID:2, country code, flags                  |
//! | Report Reference         | 2    | report id, report type                         |
//! | Keyboard input report    | 8    | modifiers, reserved, keycodes[6]               |

use serde::{Deserialize, Serialize};

use crate::error::AttError;

// ───────────────────────────────────────────────────────────────
// CCCD
// ───────────────────────────────────────────────────────────────

/// Client Characteristic Configuration value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cccd {
    pub notify: bool,
    pub indicate: bool,
}

impl Cccd {
    pub const LEN: usize = 2;
    pub const DISABLED: Self = Self {
        notify: false,
        indicate: false,
    };

    const NOTIFY_BIT: u16 = 0x0001;
    const INDICATE_BIT: u16 = 0x0002;

    /// Decode from the first two bytes of `raw`.  Reserved bits are dropped.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, AttError> {
        let bits = u16::from_le_bytes(take::<2>(raw)?);
        Ok(Self {
            notify: bits & Self::NOTIFY_BIT != 0,
            indicate: bits & Self::INDICATE_BIT != 0,
        })
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bits = 0u16;
        if self.notify {
            bits |= Self::NOTIFY_BIT;
        }
        if self.indicate {
            bits |= Self::INDICATE_BIT;
        }
        bits.to_le_bytes()
    }

    pub fn is_enabled(self) -> bool {
        self.notify || self.indicate
    }
}

// ───────────────────────────────────────────────────────────────
// Characteristic Presentation Format (0x2904)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationFormat {
    pub format: u8,
    pub exponent: i8,
    pub unit: u16,
    pub namespace: u8,
    pub description: u16,
}

impl PresentationFormat {
    pub const LEN: usize = 7;
    /// GATT format code for `uint8`.
    pub const FORMAT_UINT8: u8 = 0x04;
    /// Bluetooth SIG namespace.
    pub const NAMESPACE_SIG: u8 = 0x01;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let unit = self.unit.to_le_bytes();
        let descr = self.description.to_le_bytes();
        [
            self.format,
            self.exponent as u8,
            unit[0],
            unit[1],
            self.namespace,
            descr[0],
            descr[1],
        ]
    }
}

// ───────────────────────────────────────────────────────────────
// PnP ID (0x2A50)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnpId {
    /// 0x01 = Bluetooth SIG, 0x02 = USB-IF.
    pub vendor_id_source: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

impl PnpId {
    pub const LEN: usize = 7;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let vid = self.vendor_id.to_le_bytes();
        let pid = self.product_id.to_le_bytes();
        let ver = self.version.to_le_bytes();
        [
            self.vendor_id_source,
            vid[0],
            vid[1],
            pid[0],
            pid[1],
            ver[0],
            ver[1],
        ]
    }
}

// ───────────────────────────────────────────────────────────────
// HID Information (0x2A4A)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidInformation {
    /// HID version, BCD (0x0111 = 1.11).
    pub bcd_hid: u16,
    pub country_code: u8,
    /// bit0 RemoteWake, bit1 NormallyConnectable.
    pub flags: u8,
}

impl HidInformation {
    pub const LEN: usize = 4;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let bcd = self.bcd_hid.to_le_bytes();
        [bcd[0], bcd[1], self.country_code, self.flags]
    }
}

// ───────────────────────────────────────────────────────────────
// Report Reference (0x2908)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReportType {
    Input = 0x01,
    Output = 0x02,
    Feature = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportReference {
    pub report_id: u8,
    pub report_type: ReportType,
}

impl ReportReference {
    pub const LEN: usize = 2;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        [self.report_id, self.report_type as u8]
    }
}

// ───────────────────────────────────────────────────────────────
// Protocol Mode (0x2A4E)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolMode {
    Boot = 0x00,
    Report = 0x01,
}

impl ProtocolMode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Boot),
            0x01 => Some(Self::Report),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Keyboard input report
// ───────────────────────────────────────────────────────────────

/// Boot-compatible 8-byte keyboard input report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    /// Bitmap: LCtrl, LShift, LAlt, LGui, RCtrl, RShift, RAlt, RGui.
    pub modifiers: u8,
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    pub const LEN: usize = 8;

    /// All keys released.
    pub const RELEASED: Self = Self {
        modifiers: 0,
        keycodes: [0; 6],
    };

    /// A single key press with optional modifiers.
    pub const fn key(modifiers: u8, keycode: u8) -> Self {
        Self {
            modifiers,
            keycodes: [keycode, 0, 0, 0, 0, 0],
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let k = self.keycodes;
        [self.modifiers, 0, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Copy exactly `N` leading bytes out of a write payload.
///
/// Trailing bytes beyond `N` are ignored; fewer than `N` is `Malformed`.
pub fn take<const N: usize>(raw: &[u8]) -> Result<[u8; N], AttError> {
    raw.first_chunk::<N>().copied().ok_or(AttError::Malformed)
}
