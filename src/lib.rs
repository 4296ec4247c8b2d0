//! BLE HID keyboard peripheral library.
//!
//! Exposes the pure-logic modules for integration testing.  The Bluedroid
//! adapter is compiled only with the `espidf` feature; everything else
//! runs on the host against the recording simulation in
//! [`adapters::sim`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod adv;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod gatt;
pub mod services;
