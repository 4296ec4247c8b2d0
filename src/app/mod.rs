//! Application core: pure domain logic, zero I/O.
//!
//! [`service::Peripheral`] owns the GAP state machine and the GATT
//! server.  All interaction with the BLE host stack happens through the
//! **port traits** in [`ports`], keeping this layer fully testable
//! without a radio.

pub mod events;
pub mod ports;
pub mod service;
