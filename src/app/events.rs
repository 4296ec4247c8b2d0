//! Inbound GAP events and outbound application events.
//!
//! The host-stack adapter translates its callbacks into [`GapEvent`]s and
//! feeds them to [`Peripheral::handle_gap_event`](super::service::Peripheral::handle_gap_event);
//! the returned [`GapReply`] tells the adapter how to answer the stack.
//!
//! The peripheral queues [`AppEvent`]s for the application, which drains
//! them into an [`EventSink`](super::ports::EventSink).

use core::fmt;

use crate::error::AdvError;
use crate::fsm::LinkState;
use crate::gatt::formats::{Cccd, ProtocolMode};

// ───────────────────────────────────────────────────────────────
// Identifiers
// ───────────────────────────────────────────────────────────────

/// Stack-assigned connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    Public,
    Random,
}

/// Bluetooth device address.  Bytes are stored most-significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr {
    pub kind: AddrKind,
    pub addr: [u8; 6],
}

impl PeerAddr {
    pub const fn public(addr: [u8; 6]) -> Self {
        Self {
            kind: AddrKind::Public,
            addr,
        }
    }

    pub const fn random(addr: [u8; 6]) -> Self {
        Self {
            kind: AddrKind::Random,
            addr,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.addr;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )?;
        if self.kind == AddrKind::Random {
            f.write_str(" (random)")?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// GAP-level events delivered by the host stack, already decoded.
/// Status and reason codes are the stack's raw values (0 = success).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    /// Host and controller are in sync; the stack is ready for commands.
    Synced,
    /// The host stack reset itself.
    Reset { reason: i32 },
    Connect {
        status: i32,
        conn: ConnHandle,
        peer: PeerAddr,
    },
    Disconnect { conn: ConnHandle, reason: i32 },
    EncryptionChange { conn: ConnHandle, status: i32 },
    /// The stack reports a change to a characteristic's CCCD.
    Subscribe {
        conn: ConnHandle,
        attr_handle: u16,
        notify: bool,
        indicate: bool,
    },
    /// A bonded peer is pairing again while our bond record still exists.
    RepeatPairing { conn: ConnHandle },
    Mtu { conn: ConnHandle, value: u16 },
}

/// How the adapter should answer the stack for the event just handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapReply {
    Handled,
    /// The stale bond was deleted; let the pairing proceed.
    RetryPairing,
    /// The event referenced a connection we do not know.
    UnknownConnection,
}

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointCommand {
    Suspend,
    ExitSuspend,
}

/// Structured events emitted by the peripheral core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The link state machine moved between states.
    StateChanged { from: LinkState, to: LinkState },

    Connected { conn: ConnHandle, peer: PeerAddr },

    /// The link is now encrypted.
    Secured { conn: ConnHandle },

    Disconnected { reason: i32 },

    /// A central changed its CCCD for the value at `handle`.
    SubscriptionChanged { handle: u16, cccd: Cccd },

    /// Output report write: Num/Caps/Scroll/Compose/Kana LED bitmap.
    KeyboardLeds(u8),

    ControlPoint(ControlPointCommand),

    ProtocolModeChanged(ProtocolMode),

    /// Advertising could not be (re)started.
    AdvertisingFailed(AdvError),
}
