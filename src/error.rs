//! Unified error types for the keyboard peripheral.
//!
//! Every failure the core can report is one of the small `Copy` enums
//! below.  They are grouped by the boundary they cross:
//!
//! | Type            | Raised by                 | Seen by                  |
//! |-----------------|---------------------------|--------------------------|
//! | `AttError`      | attribute dispatcher      | peer (as ATT error code) |
//! | `SendError`     | notification gate         | application              |
//! | `AdvError`      | advertising controller    | GAP state machine / boot |
//! | `RegistryError` | service registration      | boot (fatal)             |
//! | `StackError`    | any `HostStack` call      | wrapped by the above     |

use core::fmt;

// ---------------------------------------------------------------------------
// Host stack return code
// ---------------------------------------------------------------------------

/// Raw non-zero return code from the underlying BLE host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackError(pub i32);

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host stack rc={}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ATT access errors
// ---------------------------------------------------------------------------

/// ATT "Unlikely Error", the generic catch-all response.
pub const ATT_ERR_UNLIKELY: u8 = 0x0E;
/// ATT "Insufficient Resources".
pub const ATT_ERR_INSUFFICIENT_RES: u8 = 0x11;

/// Why an attribute access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttError {
    /// No attribute is registered at the requested handle.
    NotFound,
    /// The attribute exists but does not declare this operation.
    Unsupported,
    /// Write payload is shorter than the attribute's value type.
    Malformed,
    /// The outgoing buffer cannot hold the full value.
    InsufficientResources,
    /// A write arrived from a connection that is not the live link.
    UnknownConnection,
}

impl AttError {
    /// ATT protocol error code sent back to the peer.
    pub const fn att_code(self) -> u8 {
        match self {
            Self::NotFound | Self::Unsupported | Self::Malformed | Self::UnknownConnection => {
                ATT_ERR_UNLIKELY
            }
            Self::InsufficientResources => ATT_ERR_INSUFFICIENT_RES,
        }
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "attribute not found"),
            Self::Unsupported => write!(f, "operation not supported by attribute"),
            Self::Malformed => write!(f, "write payload malformed"),
            Self::InsufficientResources => write!(f, "insufficient resources"),
            Self::UnknownConnection => write!(f, "write from unknown connection"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// No central is connected.
    NotConnected,
    /// The central has not enabled notifications for this characteristic.
    NotSubscribed,
    /// The characteristic requires an encrypted link and the link is not.
    Unencrypted,
    /// The handle does not name a notifiable characteristic value.
    UnknownHandle,
    /// Payload exceeds `mtu - 3`.
    TooLarge,
    /// The host stack refused the notification.
    Transport(StackError),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no central connected"),
            Self::NotSubscribed => write!(f, "central not subscribed"),
            Self::Unencrypted => write!(f, "link not encrypted"),
            Self::UnknownHandle => write!(f, "handle is not notifiable"),
            Self::TooLarge => write!(f, "payload exceeds ATT MTU"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Advertising errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvError {
    /// Advertising payload does not fit in 31 bytes.
    PayloadTooLong,
    /// The stack rejected the advertising data.
    SetData(StackError),
    /// The stack rejected the scan response data.
    SetScanResponse(StackError),
    /// The stack refused to start advertising.
    Start(StackError),
    /// The stack refused to stop advertising.
    Stop(StackError),
}

impl fmt::Display for AdvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLong => write!(f, "advertising payload exceeds 31 bytes"),
            Self::SetData(e) => write!(f, "set advertising data: {e}"),
            Self::SetScanResponse(e) => write!(f, "set scan response: {e}"),
            Self::Start(e) => write!(f, "start advertising: {e}"),
            Self::Stop(e) => write!(f, "stop advertising: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registration errors
// ---------------------------------------------------------------------------

/// Registration failures abort initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The stack rejected a service table.
    Rejected { service: u16, err: StackError },
    /// The fixed-capacity handle table is full.
    Full,
    /// The stack handed out a handle that is already in use.
    HandleCollision(u16),
    /// `register` was called after the table was sealed.
    Sealed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { service, err } => {
                write!(f, "service 0x{service:04X} rejected: {err}")
            }
            Self::Full => write!(f, "attribute table full"),
            Self::HandleCollision(h) => write!(f, "handle {h} already registered"),
            Self::Sealed => write!(f, "registry already sealed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    Invalid(&'static str),
    /// A persisted blob could not be decoded.
    Corrupted,
    /// The storage backend failed.
    Io,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::Corrupted => write!(f, "config blob corrupted"),
            Self::Io => write!(f, "config storage I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Att(AttError),
    Send(SendError),
    Adv(AdvError),
    Registry(RegistryError),
    Stack(StackError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Att(e) => write!(f, "att: {e}"),
            Self::Send(e) => write!(f, "send: {e}"),
            Self::Adv(e) => write!(f, "advertising: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Stack(e) => write!(f, "stack: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<AttError> for Error {
    fn from(e: AttError) -> Self {
        Self::Att(e)
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

impl From<AdvError> for Error {
    fn from(e: AdvError) -> Self {
        Self::Adv(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Self::Stack(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
