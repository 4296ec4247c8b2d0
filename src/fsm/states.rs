//! Concrete state handlers and table builder.
//!
//! ```text
//!  IDLE ──[synced]──▶ ADVERTISING ──[connect ok]──▶ CONNECTING
//!                        ▲    │                         │ (initiate security)
//!                        │ [connect failed]             ▼
//!                        │    ▼              ┌──── CONNECTED ◀──────────┐
//!                        └─ DISCONNECTED ◀───┤        │ [enc ok]        │ [enc lost]
//!                             ▲              │        ▼                 │
//!                             │              └──── SECURED ─────────────┘
//!                             │                       │
//!                             └────[disconnect]───────┘
//!
//!  CONNECTED/SECURED ──[repeat pairing]──▶ REPEAT_PAIRING ──▶ CONNECTED
//!  Any state ──[stack reset]──▶ IDLE
//! ```

use log::{debug, info, warn};

use super::context::{Connection, LinkContext};
use super::{LinkState, StateDescriptor};
use crate::app::events::{AppEvent, GapEvent, GapReply};
use crate::app::ports::HostStack;
use crate::gatt::formats::Cccd;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table<H: HostStack>() -> [StateDescriptor<H>; LinkState::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: LinkState::Idle,
            name: "Idle",
            on_enter: Some(idle_enter::<H>),
            on_exit: None,
            on_event: idle_event::<H>,
            on_settle: None,
        },
        // Index 1 — Advertising
        StateDescriptor {
            id: LinkState::Advertising,
            name: "Advertising",
            on_enter: Some(advertising_enter::<H>),
            on_exit: None,
            on_event: advertising_event::<H>,
            on_settle: None,
        },
        // Index 2 — Connecting
        StateDescriptor {
            id: LinkState::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter::<H>),
            on_exit: None,
            on_event: ignore_event::<H>,
            on_settle: Some(settle_connected::<H>),
        },
        // Index 3 — Connected (unsecured)
        StateDescriptor {
            id: LinkState::Connected,
            name: "Connected",
            on_enter: None,
            on_exit: None,
            on_event: connected_event::<H>,
            on_settle: None,
        },
        // Index 4 — Secured
        StateDescriptor {
            id: LinkState::Secured,
            name: "Secured",
            on_enter: Some(secured_enter::<H>),
            on_exit: None,
            on_event: secured_event::<H>,
            on_settle: None,
        },
        // Index 5 — RepeatPairing
        StateDescriptor {
            id: LinkState::RepeatPairing,
            name: "RepeatPairing",
            on_enter: Some(repeat_pairing_enter::<H>),
            on_exit: None,
            on_event: ignore_event::<H>,
            on_settle: Some(settle_connected::<H>),
        },
        // Index 6 — Disconnected
        StateDescriptor {
            id: LinkState::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter::<H>),
            on_exit: None,
            on_event: ignore_event::<H>,
            on_settle: Some(settle_advertising::<H>),
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    ctx.clear_link();
}

fn idle_event<H: HostStack>(_ctx: &mut LinkContext<H>, event: &GapEvent) -> Option<LinkState> {
    match event {
        GapEvent::Synced => Some(LinkState::Advertising),
        other => {
            debug!("GAP: {:?} while idle; ignored", other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ADVERTISING state
// ═══════════════════════════════════════════════════════════════════════════

fn advertising_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    // Failure is recorded in ctx.adv_error; a retry comes from the
    // application or the next disconnect/sync cycle.
    let _ = ctx.start_advertising();
}

fn advertising_event<H: HostStack>(
    ctx: &mut LinkContext<H>,
    event: &GapEvent,
) -> Option<LinkState> {
    match *event {
        GapEvent::Connect {
            status: 0,
            conn,
            peer,
        } => {
            info!("GAP: connection established {} peer {}", conn, peer);
            ctx.gate.reset();
            ctx.connection = Some(Connection::new(conn, peer));
            ctx.push_event(AppEvent::Connected { conn, peer });
            Some(LinkState::Connecting)
        }
        GapEvent::Connect { status, .. } => {
            warn!("GAP: connection failed (status={})", status);
            ctx.disconnect_reason = status;
            Some(LinkState::Disconnected)
        }
        ref other => {
            debug!("GAP: {:?} while advertising; ignored", other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING state (transient)
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    if let Some(link) = ctx.connection {
        ctx.initiate_security(link.handle);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED / SECURED states
// ═══════════════════════════════════════════════════════════════════════════

fn connected_event<H: HostStack>(ctx: &mut LinkContext<H>, event: &GapEvent) -> Option<LinkState> {
    match *event {
        GapEvent::EncryptionChange { conn, status } => {
            if !ctx.expect_current(conn, "encryption change") {
                return None;
            }
            if status == 0 {
                if let Some(link) = ctx.connection.as_mut() {
                    link.encrypted = true;
                }
                Some(LinkState::Secured)
            } else {
                warn!("GAP: encryption failed on {} (status={})", conn, status);
                None
            }
        }
        _ => link_event(ctx, event),
    }
}

fn secured_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    if let Some(link) = ctx.connection {
        info!("GAP: link {} encrypted", link.handle);
        ctx.push_event(AppEvent::Secured { conn: link.handle });
    }
}

fn secured_event<H: HostStack>(ctx: &mut LinkContext<H>, event: &GapEvent) -> Option<LinkState> {
    match *event {
        GapEvent::EncryptionChange { conn, status } => {
            if !ctx.expect_current(conn, "encryption change") {
                return None;
            }
            if status == 0 {
                debug!("GAP: {} re-encrypted", conn);
                return None;
            }
            warn!("GAP: encryption lost on {} (status={})", conn, status);
            if let Some(link) = ctx.connection.as_mut() {
                link.encrypted = false;
            }
            Some(LinkState::Connected)
        }
        _ => link_event(ctx, event),
    }
}

/// Events handled identically whether or not the link is encrypted.
fn link_event<H: HostStack>(ctx: &mut LinkContext<H>, event: &GapEvent) -> Option<LinkState> {
    match *event {
        GapEvent::Disconnect { conn, reason } => {
            if !ctx.expect_current(conn, "disconnect") {
                return None;
            }
            info!("GAP: {} disconnected (reason=0x{:02X})", conn, reason);
            ctx.disconnect_reason = reason;
            Some(LinkState::Disconnected)
        }
        GapEvent::RepeatPairing { conn } => {
            if !ctx.expect_current(conn, "repeat pairing") {
                return None;
            }
            Some(LinkState::RepeatPairing)
        }
        GapEvent::Subscribe {
            conn,
            attr_handle,
            notify,
            indicate,
        } => {
            ctx.on_subscribe(conn, attr_handle, Cccd { notify, indicate });
            None
        }
        GapEvent::Mtu { conn, value } => {
            ctx.on_mtu(conn, value);
            None
        }
        GapEvent::Connect { conn, .. } => {
            warn!("GAP: second connection {} while linked; ignored", conn);
            None
        }
        GapEvent::Synced | GapEvent::Reset { .. } | GapEvent::EncryptionChange { .. } => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPEAT_PAIRING state (transient)
// ═══════════════════════════════════════════════════════════════════════════

fn repeat_pairing_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    // Retry is answered even when bond deletion fails.
    ctx.reply = GapReply::RetryPairing;
    let Some(link) = ctx.connection.as_mut() else {
        return;
    };
    link.encrypted = false;
    let peer = link.peer;
    match ctx.stack.delete_bond(&peer) {
        Ok(()) => info!("GAP: stale bond for {} deleted; retrying pairing", peer),
        Err(e) => warn!("GAP: deleting bond for {} failed: {}", peer, e),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED state (transient)
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter<H: HostStack>(ctx: &mut LinkContext<H>) {
    ctx.clear_link();
    ctx.push_event(AppEvent::Disconnected {
        reason: ctx.disconnect_reason,
    });
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared
// ═══════════════════════════════════════════════════════════════════════════

fn ignore_event<H: HostStack>(_ctx: &mut LinkContext<H>, event: &GapEvent) -> Option<LinkState> {
    debug!("GAP: {:?} in transient state; ignored", event);
    None
}

fn settle_connected<H: HostStack>(_ctx: &mut LinkContext<H>) -> Option<LinkState> {
    Some(LinkState::Connected)
}

fn settle_advertising<H: HostStack>(_ctx: &mut LinkContext<H>) -> Option<LinkState> {
    Some(LinkState::Advertising)
}
