//! Advertising controller.
//!
//! Builds the legacy advertising and scan-response payloads from an
//! [`AdvertisingConfig`] and hands them to the host stack before starting
//! connectable, general-discoverable advertising with no timeout.
//!
//! Advertising data (≤ 31 bytes):
//!
//! | AD type | Field                         |
//! |---------|-------------------------------|
//! | `0x01`  | Flags: LE General Disc, no BR/EDR |
//! | `0x0A`  | TX power level (optional)     |
//! | `0x19`  | Appearance                    |
//! | `0x03`  | Complete list of 16-bit UUIDs |
//!
//! Scan response: the complete local name (`0x09`), or the shortened
//! name (`0x08`) if it would not fit.

use heapless::Vec;
use log::{error, info, warn};

use crate::app::ports::HostStack;
use crate::config::AdvertisingConfig;
use crate::error::AdvError;

/// Legacy advertising PDU payload limit.
pub const MAX_ADV_LEN: usize = 31;

pub type AdvPayload = Vec<u8, MAX_ADV_LEN>;

/// AD structure types.
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const UUID16_COMPLETE: u8 = 0x03;
    pub const SHORT_NAME: u8 = 0x08;
    pub const COMPLETE_NAME: u8 = 0x09;
    pub const TX_POWER: u8 = 0x0A;
    pub const APPEARANCE: u8 = 0x19;
}

pub const FLAG_LE_GENERAL_DISC: u8 = 0x02;
pub const FLAG_BR_EDR_UNSUPPORTED: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Connectable undirected.
    Undirected,
    NonConnectable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvParams {
    pub connect: ConnectMode,
    /// `None` advertises until stopped.
    pub duration_ms: Option<u32>,
    /// Interval bounds in 0.625 ms units; `None` leaves the stack default.
    pub interval: Option<(u16, u16)>,
}

impl Default for AdvParams {
    fn default() -> Self {
        Self {
            connect: ConnectMode::Undirected,
            duration_ms: None,
            interval: None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Payload builders
// ───────────────────────────────────────────────────────────────

fn push_field(out: &mut AdvPayload, ad_type: u8, value: &[u8]) -> Result<(), AdvError> {
    let len = u8::try_from(value.len() + 1).map_err(|_| AdvError::PayloadTooLong)?;
    out.push(len).map_err(|_| AdvError::PayloadTooLong)?;
    out.push(ad_type).map_err(|_| AdvError::PayloadTooLong)?;
    out.extend_from_slice(value)
        .map_err(|_| AdvError::PayloadTooLong)
}

pub fn build_adv_data(cfg: &AdvertisingConfig, tx_power_dbm: i8) -> Result<AdvPayload, AdvError> {
    let mut out = AdvPayload::new();
    push_field(
        &mut out,
        ad_type::FLAGS,
        &[FLAG_LE_GENERAL_DISC | FLAG_BR_EDR_UNSUPPORTED],
    )?;
    if cfg.include_tx_power {
        push_field(&mut out, ad_type::TX_POWER, &[tx_power_dbm as u8])?;
    }
    push_field(&mut out, ad_type::APPEARANCE, &cfg.appearance.to_le_bytes())?;
    if !cfg.service_uuids.is_empty() {
        let mut uuids: Vec<u8, { MAX_ADV_LEN - 2 }> = Vec::new();
        for uuid in &cfg.service_uuids {
            uuids
                .extend_from_slice(&uuid.to_le_bytes())
                .map_err(|_| AdvError::PayloadTooLong)?;
        }
        push_field(&mut out, ad_type::UUID16_COMPLETE, &uuids)?;
    }
    Ok(out)
}

pub fn build_scan_response(cfg: &AdvertisingConfig) -> Result<AdvPayload, AdvError> {
    let name = cfg.device_name.as_bytes();
    let room = MAX_ADV_LEN - 2;
    let mut out = AdvPayload::new();
    if name.len() <= room {
        push_field(&mut out, ad_type::COMPLETE_NAME, name)?;
    } else {
        // Cut on a char boundary so the shortened name stays valid UTF-8.
        let cut = cfg
            .device_name
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= room)
            .last()
            .unwrap_or(0);
        push_field(&mut out, ad_type::SHORT_NAME, &name[..cut])?;
    }
    Ok(out)
}

// ───────────────────────────────────────────────────────────────
// Start / stop
// ───────────────────────────────────────────────────────────────

/// Submit both payloads, then start advertising.
///
/// A failure at any step aborts the start; nothing is retried here.
pub fn start<H: HostStack>(stack: &mut H, cfg: &AdvertisingConfig) -> Result<(), AdvError> {
    let adv = build_adv_data(cfg, stack.tx_power_dbm())?;
    let rsp = build_scan_response(cfg)?;

    stack.set_adv_data(&adv).map_err(|e| {
        error!("ADV: setting advertising data failed: {}", e);
        AdvError::SetData(e)
    })?;
    stack.set_scan_response(&rsp).map_err(|e| {
        error!("ADV: setting scan response failed: {}", e);
        AdvError::SetScanResponse(e)
    })?;
    stack.start_advertising(&AdvParams::default()).map_err(|e| {
        error!("ADV: start failed: {}", e);
        AdvError::Start(e)
    })?;

    info!("ADV: advertising as '{}'", cfg.device_name);
    Ok(())
}

pub fn stop<H: HostStack>(stack: &mut H) -> Result<(), AdvError> {
    stack.stop_advertising().map_err(|e| {
        warn!("ADV: stop failed: {}", e);
        AdvError::Stop(e)
    })?;
    info!("ADV: advertising stopped");
    Ok(())
}
