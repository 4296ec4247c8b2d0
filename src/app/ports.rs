//! Port traits: the hexagonal boundary between the peripheral core and
//! the BLE host stack.
//!
//! ```text
//!   stack callbacks ──▶ adapter ──▶ Peripheral (domain) ──▶ HostStack port ──▶ stack commands
//! ```
//!
//! The core never calls the stack directly: every outbound command goes
//! through [`HostStack`], so the whole connection and attribute lifecycle
//! runs against a recording simulation on the host.

use crate::adv::AdvParams;
use crate::app::events::{AppEvent, ConnHandle, PeerAddr};
use crate::config::{PeripheralConfig, SecurityConfig};
use crate::error::{ConfigError, StackError};
use crate::gatt::registry::ServiceDecl;

// ───────────────────────────────────────────────────────────────
// Host stack port (driven adapter: domain → BLE host)
// ───────────────────────────────────────────────────────────────

/// Outbound commands the peripheral issues to the BLE host stack.
///
/// Every method is synchronous and returns as soon as the stack has
/// accepted (or refused) the command.
pub trait HostStack {
    /// Register one primary service.
    ///
    /// Returns the handle of the service declaration.  Implementations
    /// must allocate the remaining handles contiguously in declaration
    /// order (characteristic declaration, value, descriptors, …).
    fn register_service(&mut self, service: &'static ServiceDecl) -> Result<u16, StackError>;

    /// Install pairing/bonding parameters.
    fn configure_security(&mut self, security: &SecurityConfig) -> Result<(), StackError>;

    fn set_adv_data(&mut self, data: &[u8]) -> Result<(), StackError>;

    fn set_scan_response(&mut self, data: &[u8]) -> Result<(), StackError>;

    fn start_advertising(&mut self, params: &AdvParams) -> Result<(), StackError>;

    fn stop_advertising(&mut self) -> Result<(), StackError>;

    /// Advertising TX power in dBm, for the TX Power Level AD field.
    fn tx_power_dbm(&self) -> i8;

    fn notify(&mut self, conn: ConnHandle, attr_handle: u16, data: &[u8]) -> Result<(), StackError>;

    fn indicate(
        &mut self,
        conn: ConnHandle,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), StackError>;

    /// Start pairing / encryption on `conn`.
    fn initiate_security(&mut self, conn: ConnHandle) -> Result<(), StackError>;

    /// Forget the bond with `peer`.
    fn delete_bond(&mut self, peer: &PeerAddr) -> Result<(), StackError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / application)
// ───────────────────────────────────────────────────────────────

/// The peripheral emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the peripheral configuration.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected with [`ConfigError::Invalid`], never clamped.
pub trait ConfigPort {
    /// Returns [`PeripheralConfig::default()`] when nothing is stored.
    fn load(&self) -> Result<PeripheralConfig, ConfigError>;

    fn save(&mut self, config: &PeripheralConfig) -> Result<(), ConfigError>;
}
