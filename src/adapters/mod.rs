//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements  | Connects to                          |
//! |-------------|-------------|--------------------------------------|
//! | `bluedroid` | HostStack   | ESP-IDF Bluedroid GATT/GAP           |
//! | `sim`       | HostStack   | In-memory call recorder (host only)  |
//! | `log_sink`  | EventSink   | Serial log output                    |
//! | `nvs`       | ConfigPort  | NVS / in-memory store                |

#[cfg(feature = "espidf")]
pub mod bluedroid;
pub mod log_sink;
pub mod nvs;
#[cfg(not(feature = "espidf"))]
pub mod sim;
