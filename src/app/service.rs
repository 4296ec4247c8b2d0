//! Peripheral service: the hexagonal core.
//!
//! [`Peripheral`] owns the GAP state machine, the attribute registry,
//! the dispatcher, the notification gate and every attribute value.
//! There are no statics: each instance is an independent GATT server
//! driving its own [`HostStack`].
//!
//! ```text
//!  GapEvent ──▶ ┌──────────────────────────────┐ ──▶ HostStack
//!  ATT access ─▶│          Peripheral          │
//!  send() ─────▶│ FSM · Registry · Dispatcher  │ ──▶ AppEvent queue ──▶ EventSink
//!               │ · NotificationGate           │
//!               └──────────────────────────────┘
//! ```
//!
//! The stack's callback context and the application's report task both
//! reach the same instance through [`SharedPeripheral`].

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info, warn};

use crate::adv;
use crate::config::PeripheralConfig;
use crate::error::{AdvError, AttError, RegistryError, Result, SendError};
use crate::fsm::context::{Connection, LinkContext};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, LinkState};
use crate::gatt::dispatcher::{Access, Dispatcher};
use crate::gatt::formats::{Cccd, KeyboardReport};
use crate::gatt::registry::{AttrKey, AttrKind, Attribute};
use crate::services::{self, ServiceValues};

use super::events::{AppEvent, ConnHandle, GapEvent, GapReply};
use super::ports::{EventSink, HostStack};

// ───────────────────────────────────────────────────────────────
// Peripheral
// ───────────────────────────────────────────────────────────────

pub struct Peripheral<H: HostStack> {
    fsm: Fsm<H>,
    ctx: LinkContext<H>,
    dispatcher: Dispatcher,
    started: bool,
}

impl<H: HostStack> Peripheral<H> {
    /// Build the server context.  Nothing is sent to the stack until
    /// [`init`](Self::init).
    pub fn new(config: PeripheralConfig, stack: H) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), LinkState::Idle),
            ctx: LinkContext::new(config, stack),
            dispatcher: Dispatcher::new(services::build_handler_table()),
            started: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Configure security and register every service with the stack.
    ///
    /// Any rejection aborts initialisation: the peripheral never runs
    /// with a partially registered attribute space.  Advertising starts
    /// on the first [`GapEvent::Synced`].
    pub fn init(&mut self) -> Result<()> {
        if self.started {
            return Err(RegistryError::Sealed.into());
        }
        self.ctx.config.validate()?;

        self.ctx
            .stack
            .configure_security(&self.ctx.config.security)
            .inspect_err(|e| error!("GATT: security configuration rejected: {}", e))?;

        for decl in services::SERVICES {
            let base = self.ctx.stack.register_service(decl).map_err(|err| {
                error!("GATT: service 0x{:04X} rejected: {}", decl.uuid, err);
                RegistryError::Rejected {
                    service: decl.uuid,
                    err,
                }
            })?;
            self.ctx.registry.register(decl, base)?;
        }
        self.ctx.registry.seal();

        for attr in self.ctx.registry.iter() {
            if attr.kind == AttrKind::Value && attr.caps.notifiable() {
                self.ctx
                    .gate
                    .enroll(attr.handle)
                    .map_err(|_| RegistryError::Full)?;
            }
        }

        self.fsm.start(&mut self.ctx);
        self.started = true;
        info!(
            "Peripheral '{}' ready ({} attributes)",
            self.ctx.config.device_name,
            self.ctx.registry.len()
        );
        Ok(())
    }

    // ── Inbound: GAP ──────────────────────────────────────────

    /// Single entry point for every GAP event from the stack.
    pub fn handle_gap_event(&mut self, event: GapEvent) -> GapReply {
        if !self.started {
            warn!("GAP: {:?} before init; ignored", event);
            return GapReply::Handled;
        }
        self.ctx.reply = GapReply::Handled;
        match event {
            GapEvent::Reset { reason } => {
                warn!("GAP: host stack reset (reason={})", reason);
                self.fsm.force_transition(LinkState::Idle, &mut self.ctx);
                self.ctx.clear_link();
            }
            _ => {
                self.fsm.handle(&event, &mut self.ctx);
            }
        }
        self.ctx.reply
    }

    // ── Inbound: ATT ──────────────────────────────────────────

    /// Single entry point for every attribute read or write.
    ///
    /// Writes are accepted only from the live link; CCCD state belongs to
    /// that connection alone.  The error maps to the ATT response via
    /// [`AttError::att_code`].
    pub fn on_access(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        access: Access<'_, '_>,
    ) -> core::result::Result<(), AttError> {
        if !self.ctx.is_current(conn) {
            let op = access.op();
            if op.is_write() {
                warn!(
                    "ATT: {} on handle {} from {} without a live link; rejected",
                    op, handle, conn
                );
                return Err(AttError::UnknownConnection);
            }
            debug!("ATT: {} on handle {} from {} without a live link", op, handle, conn);
        }
        let event = self.dispatcher.dispatch(
            &self.ctx.registry,
            &mut self.ctx.values,
            &mut self.ctx.gate,
            handle,
            access,
        )?;
        if let Some(event) = event {
            if let AppEvent::SubscriptionChanged { handle, cccd } = event {
                self.ctx.apply_subscribe_policy(handle, cccd);
            }
            self.ctx.push_event(event);
        }
        Ok(())
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Notify (or indicate) `data` on the characteristic value at `handle`.
    pub fn send(&mut self, handle: u16, data: &[u8]) -> core::result::Result<(), SendError> {
        let attr = self.ctx.registry.lookup(handle).ok();
        let result = self
            .ctx
            .gate
            .send(self.ctx.connection.as_ref(), attr, data, &mut self.ctx.stack);
        match result {
            Err(e @ (SendError::NotConnected | SendError::NotSubscribed)) => {
                debug!("GATT: send on handle {} skipped: {}", handle, e);
            }
            Err(e) => warn!("GATT: send on handle {} failed: {}", handle, e),
            Ok(()) => {}
        }
        result
    }

    /// Record `report` as the current input state and push it to the host.
    pub fn send_input_report(
        &mut self,
        report: &KeyboardReport,
    ) -> core::result::Result<(), SendError> {
        self.ctx.values.input_report = *report;
        let handle = self
            .ctx
            .registry
            .handle_of(AttrKey::InputReport)
            .ok_or(SendError::UnknownHandle)?;
        self.send(handle, &report.to_bytes())
    }

    /// Update the battery level (clamped to 100) and notify a subscribed
    /// central.  The new value is stored even when nobody is listening.
    pub fn set_battery_level(&mut self, percent: u8) -> core::result::Result<(), SendError> {
        let level = percent.min(100);
        self.ctx.values.battery_level = level;
        let handle = self
            .ctx
            .registry
            .handle_of(AttrKey::BatteryLevel)
            .ok_or(SendError::UnknownHandle)?;
        self.send(handle, &[level])
    }

    /// Try again after a failed advertising start.  No-op unless the
    /// peripheral is in `Advertising`.
    pub fn retry_advertising(&mut self) -> core::result::Result<(), AdvError> {
        if self.fsm.current_state() != LinkState::Advertising {
            return Ok(());
        }
        self.ctx.start_advertising()
    }

    /// Take the peripheral off air, e.g. before entering light sleep.
    /// No-op unless in `Advertising`; [`retry_advertising`](Self::retry_advertising)
    /// puts it back.
    pub fn stop_advertising(&mut self) -> core::result::Result<(), AdvError> {
        if self.fsm.current_state() != LinkState::Advertising {
            return Ok(());
        }
        adv::stop(&mut self.ctx.stack)
    }

    /// Pop every queued event into `sink`.
    pub fn flush_events(&mut self, sink: &mut impl EventSink) {
        for event in self.ctx.drain_events() {
            sink.emit(&event);
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = AppEvent> + '_ {
        self.ctx.drain_events()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.fsm.current_state()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.ctx.connection.as_ref()
    }

    pub fn is_subscribed(&self, handle: u16) -> bool {
        self.ctx.gate.is_subscribed(handle)
    }

    pub fn subscription(&self, handle: u16) -> Option<Cccd> {
        self.ctx.gate.subscription(handle)
    }

    pub fn handle_of(&self, key: AttrKey) -> Option<u16> {
        self.ctx.registry.handle_of(key)
    }

    pub fn attribute(&self, handle: u16) -> Option<&Attribute> {
        self.ctx.registry.lookup(handle).ok()
    }

    pub fn values(&self) -> &ServiceValues {
        &self.ctx.values
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.ctx.config
    }

    pub fn adv_error(&self) -> Option<AdvError> {
        self.ctx.adv_error
    }

    pub fn stack(&self) -> &H {
        &self.ctx.stack
    }

    pub fn stack_mut(&mut self) -> &mut H {
        &mut self.ctx.stack
    }
}

// ───────────────────────────────────────────────────────────────
// SharedPeripheral
// ───────────────────────────────────────────────────────────────

/// Cloneable handle for use from the stack callbacks and application
/// tasks at the same time.  Every call holds the lock for its duration.
pub struct SharedPeripheral<H: HostStack>(Arc<Mutex<Peripheral<H>>>);

impl<H: HostStack> Clone for SharedPeripheral<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: HostStack> SharedPeripheral<H> {
    pub fn new(peripheral: Peripheral<H>) -> Self {
        Self(Arc::new(Mutex::new(peripheral)))
    }

    /// Run `f` with exclusive access.  A poisoned lock is recovered: the
    /// peripheral holds no invariants a panicking caller could break
    /// half-way.
    pub fn with<R>(&self, f: impl FnOnce(&mut Peripheral<H>) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn handle_gap_event(&self, event: GapEvent) -> GapReply {
        self.with(|p| p.handle_gap_event(event))
    }

    pub fn on_access(
        &self,
        conn: ConnHandle,
        handle: u16,
        access: Access<'_, '_>,
    ) -> core::result::Result<(), AttError> {
        self.with(|p| p.on_access(conn, handle, access))
    }

    pub fn send(&self, handle: u16, data: &[u8]) -> core::result::Result<(), SendError> {
        self.with(|p| p.send(handle, data))
    }

    pub fn send_input_report(
        &self,
        report: &KeyboardReport,
    ) -> core::result::Result<(), SendError> {
        self.with(|p| p.send_input_report(report))
    }

    pub fn set_battery_level(&self, percent: u8) -> core::result::Result<(), SendError> {
        self.with(|p| p.set_battery_level(percent))
    }

    pub fn state(&self) -> LinkState {
        self.with(|p| p.state())
    }
}
