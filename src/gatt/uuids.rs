//! Bluetooth SIG assigned 16-bit UUIDs used by this peripheral.

// Services
pub const DEVICE_INFORMATION: u16 = 0x180A;
pub const BATTERY: u16 = 0x180F;
pub const HUMAN_INTERFACE_DEVICE: u16 = 0x1812;

// Characteristics
pub const MANUFACTURER_NAME: u16 = 0x2A29;
pub const PNP_ID: u16 = 0x2A50;
pub const BATTERY_LEVEL: u16 = 0x2A19;
pub const HID_INFORMATION: u16 = 0x2A4A;
pub const REPORT_MAP: u16 = 0x2A4B;
pub const HID_CONTROL_POINT: u16 = 0x2A4C;
pub const REPORT: u16 = 0x2A4D;
pub const PROTOCOL_MODE: u16 = 0x2A4E;

// Descriptors
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;
pub const PRESENTATION_FORMAT: u16 = 0x2904;
pub const REPORT_REFERENCE: u16 = 0x2908;

// GATT declarations (occupy handles but carry no app-level value)
pub const PRIMARY_SERVICE: u16 = 0x2800;
pub const CHARACTERISTIC: u16 = 0x2803;

/// GATT unit "percentage".
pub const UNIT_PERCENTAGE: u16 = 0x27AD;
