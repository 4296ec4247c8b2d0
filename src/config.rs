//! Peripheral configuration parameters
//!
//! Identity, profile values and policy knobs for the keyboard.
//! Defaults match the stock firmware; an override blob can be persisted
//! through the [`ConfigPort`](crate::app::ports::ConfigPort).

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gatt::formats::{HidInformation, PnpId};
use crate::gatt::uuids;

/// Longest name that fits a complete-name AD structure in 31 bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 29;
pub const MAX_MANUFACTURER_LEN: usize = 32;
pub const MAX_ADV_SERVICES: usize = 4;

/// GAP appearance "HID Keyboard".
pub const APPEARANCE_KEYBOARD: u16 = 0x03C1;

// ───────────────────────────────────────────────────────────────
// Policy / security enums
// ───────────────────────────────────────────────────────────────

/// What to do when a central subscribes on a link that is not yet
/// encrypted.  The subscription is recorded either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubscribePolicy {
    /// Log and wait for the central to secure the link.
    LogOnly,
    /// Ask the stack to start pairing/encryption right away.
    #[default]
    InitiateSecurity,
}

/// SMP IO capability advertised during pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IoCapability {
    DisplayOnly = 0x00,
    DisplayYesNo = 0x01,
    KeyboardOnly = 0x02,
    NoInputNoOutput = 0x03,
    KeyboardDisplay = 0x04,
}

/// SMP key distribution bits.
pub mod key_dist {
    pub const ENC: u8 = 0x01;
    pub const ID: u8 = 0x02;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub bonding: bool,
    pub mitm: bool,
    pub io_capability: IoCapability,
    /// Keys we distribute and ask the central to distribute.
    pub key_distribution: u8,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bonding: true,
            mitm: true,
            io_capability: IoCapability::NoInputNoOutput,
            key_distribution: key_dist::ENC | key_dist::ID,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Peripheral configuration
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    // --- Identity ---
    pub device_name: String<MAX_DEVICE_NAME_LEN>,
    pub appearance: u16,
    pub manufacturer: String<MAX_MANUFACTURER_LEN>,
    pub pnp_id: PnpId,

    // --- Profile values ---
    /// Battery level reported at boot (percent).
    pub battery_level: u8,
    pub hid_info: HidInformation,
    /// Report ID of the keyboard input/output reports.
    pub report_id: u8,

    // --- Advertising ---
    pub include_tx_power: bool,

    // --- Security ---
    pub security: SecurityConfig,
    pub subscribe_policy: SubscribePolicy,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: bounded("M5STICK-C"),
            appearance: APPEARANCE_KEYBOARD,
            manufacturer: bounded("X"),
            pnp_id: PnpId {
                vendor_id_source: 0x02, // USB-IF
                vendor_id: 0xE502,
                product_id: 0xA111,
                version: 0x0210,
            },

            battery_level: 100,
            hid_info: HidInformation {
                bcd_hid: 0x0111,
                country_code: 0x00,
                flags: 0x02, // normally connectable
            },
            report_id: 0x01,

            include_tx_power: true,

            security: SecurityConfig::default(),
            subscribe_policy: SubscribePolicy::default(),
        }
    }
}

impl PeripheralConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device_name must not be empty"));
        }
        if self.battery_level > 100 {
            return Err(ConfigError::Invalid("battery_level must be 0-100"));
        }
        if self.report_id == 0 {
            return Err(ConfigError::Invalid("report_id 0 is reserved"));
        }
        if self.security.key_distribution & !(key_dist::ENC | key_dist::ID) != 0 {
            return Err(ConfigError::Invalid("key_distribution has unknown bits"));
        }
        Ok(())
    }

    /// Decode and validate a persisted blob.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_postcard(&self) -> Result<std::vec::Vec<u8>, ConfigError> {
        self.validate()?;
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Advertising parameters derived from this configuration.
    pub fn advertising(&self) -> AdvertisingConfig {
        AdvertisingConfig {
            device_name: self.device_name.clone(),
            appearance: self.appearance,
            service_uuids: Vec::from_slice(&[uuids::HUMAN_INTERFACE_DEVICE]).unwrap_or_default(),
            include_tx_power: self.include_tx_power,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Advertising configuration
// ───────────────────────────────────────────────────────────────

/// Immutable once built; re-submitted on every advertising (re)start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingConfig {
    pub device_name: String<MAX_DEVICE_NAME_LEN>,
    pub appearance: u16,
    pub service_uuids: Vec<u16, MAX_ADV_SERVICES>,
    pub include_tx_power: bool,
}

/// Copy as much of `s` as fits, cutting on a char boundary.
pub fn bounded<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
