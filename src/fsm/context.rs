//! Link context: the "blackboard" shared by all state handlers.
//!
//! Owns the host-stack handle, the attribute registry, the notification
//! gate, every attribute value and the (at most one) live connection.
//! Handlers read and mutate it; the engine never looks inside.

use heapless::Deque;
use log::{info, warn};

use crate::adv;
use crate::app::events::{AppEvent, ConnHandle, GapReply, PeerAddr};
use crate::app::ports::HostStack;
use crate::config::{AdvertisingConfig, PeripheralConfig, SubscribePolicy};
use crate::error::AdvError;
use crate::gatt::formats::Cccd;
use crate::gatt::gate::NotificationGate;
use crate::gatt::registry::Registry;
use crate::services::ServiceValues;

/// ATT MTU before any exchange.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Pending application events; oldest is dropped on overflow.
pub const EVENT_QUEUE_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// The single live link.  Created on a successful connect, dropped on
/// disconnect or stack reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub handle: ConnHandle,
    pub peer: PeerAddr,
    pub encrypted: bool,
    pub mtu: u16,
}

impl Connection {
    pub fn new(handle: ConnHandle, peer: PeerAddr) -> Self {
        Self {
            handle,
            peer,
            encrypted: false,
            mtu: DEFAULT_ATT_MTU,
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub struct LinkContext<H> {
    pub stack: H,
    pub config: PeripheralConfig,
    pub adv: AdvertisingConfig,
    pub registry: Registry,
    pub gate: NotificationGate,
    pub values: ServiceValues,
    pub connection: Option<Connection>,

    /// Answer for the GAP event being handled; reset before each event.
    pub reply: GapReply,
    /// Reason carried into `Disconnected`.
    pub disconnect_reason: i32,
    /// Outcome of the most recent advertising start.
    pub adv_error: Option<AdvError>,

    events: Deque<AppEvent, EVENT_QUEUE_LEN>,
}

impl<H: HostStack> LinkContext<H> {
    pub fn new(config: PeripheralConfig, stack: H) -> Self {
        Self {
            stack,
            adv: config.advertising(),
            values: ServiceValues::from_config(&config),
            config,
            registry: Registry::new(),
            gate: NotificationGate::new(),
            connection: None,
            reply: GapReply::Handled,
            disconnect_reason: 0,
            adv_error: None,
            events: Deque::new(),
        }
    }

    // -- events --------------------------------------------------------------

    pub fn push_event(&mut self, event: AppEvent) {
        if self.events.is_full() {
            if let Some(dropped) = self.events.pop_front() {
                warn!("event queue full, dropping {:?}", dropped);
            }
        }
        // Cannot fail: a slot was just freed if needed.
        let _ = self.events.push_back(event);
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = AppEvent> + '_ {
        core::iter::from_fn(move || self.events.pop_front())
    }

    // -- link helpers --------------------------------------------------------

    /// `true` if `conn` is the live connection.
    pub fn is_current(&self, conn: ConnHandle) -> bool {
        self.connection.is_some_and(|c| c.handle == conn)
    }

    /// Like [`is_current`](Self::is_current) but marks the reply and logs
    /// when the event targets an unknown connection.
    pub fn expect_current(&mut self, conn: ConnHandle, what: &str) -> bool {
        if self.is_current(conn) {
            return true;
        }
        warn!("GAP: {} for unknown {}; ignored", what, conn);
        self.reply = GapReply::UnknownConnection;
        false
    }

    /// Drop the connection and every transient subscription.
    pub fn clear_link(&mut self) {
        self.connection = None;
        self.gate.reset();
    }

    pub fn start_advertising(&mut self) -> Result<(), AdvError> {
        let result = adv::start(&mut self.stack, &self.adv);
        self.adv_error = result.err();
        if let Err(e) = result {
            self.push_event(AppEvent::AdvertisingFailed(e));
        }
        result
    }

    /// Ask the stack to secure `conn`.  Failures are logged, never fatal.
    pub fn initiate_security(&mut self, conn: ConnHandle) {
        match self.stack.initiate_security(conn) {
            Ok(()) => info!("GAP: security initiated on {}", conn),
            Err(e) => warn!("GAP: failed to initiate security on {}: {}", conn, e),
        }
    }

    // -- subscriptions -------------------------------------------------------

    /// A central changed a CCCD through the stack's own bookkeeping.
    pub fn on_subscribe(&mut self, conn: ConnHandle, handle: u16, cccd: Cccd) {
        if !self.expect_current(conn, "subscribe") {
            return;
        }
        if self.gate.set_subscription(handle, cccd).is_err() {
            warn!("GAP: subscribe on non-notifiable handle {}; ignored", handle);
            return;
        }
        self.push_event(AppEvent::SubscriptionChanged { handle, cccd });
        self.apply_subscribe_policy(handle, cccd);
    }

    /// Decide what to do about a subscription on an unencrypted link.
    pub fn apply_subscribe_policy(&mut self, handle: u16, cccd: Cccd) {
        let Some(link) = self.connection else {
            return;
        };
        if link.encrypted || !cccd.is_enabled() {
            return;
        }
        match self.config.subscribe_policy {
            SubscribePolicy::LogOnly => {
                info!(
                    "GAP: handle {} subscribed on unencrypted link; waiting for central",
                    handle
                );
            }
            SubscribePolicy::InitiateSecurity => {
                info!(
                    "GAP: handle {} subscribed on unencrypted link; securing",
                    handle
                );
                self.initiate_security(link.handle);
            }
        }
    }

    pub fn on_mtu(&mut self, conn: ConnHandle, value: u16) {
        if !self.expect_current(conn, "MTU update") {
            return;
        }
        if let Some(link) = self.connection.as_mut() {
            link.mtu = value.max(DEFAULT_ATT_MTU);
            info!("GAP: {} MTU {}", conn, link.mtu);
        }
    }
}
