//! Function-pointer finite state machine for the GAP link lifecycle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                         │
//! │  ┌───────────────┬──────────┬─────────┬─────────────┬────────────┐  │
//! │  │ LinkState     │ on_enter │ on_exit │ on_event    │ on_settle  │  │
//! │  ├───────────────┼──────────┼─────────┼─────────────┼────────────┤  │
//! │  │ Idle          │ fn(ctx)  │    -    │ fn(ctx, ev) │     -      │  │
//! │  │ Advertising   │ fn(ctx)  │    -    │ fn(ctx, ev) │     -      │  │
//! │  │ Connecting    │ fn(ctx)  │    -    │ fn(ctx, ev) │ fn(ctx)    │  │
//! │  │ Connected     │    -     │    -    │ fn(ctx, ev) │     -      │  │
//! │  │ Secured       │ fn(ctx)  │    -    │ fn(ctx, ev) │     -      │  │
//! │  │ RepeatPairing │ fn(ctx)  │    -    │ fn(ctx, ev) │ fn(ctx)    │  │
//! │  │ Disconnected  │ fn(ctx)  │    -    │ fn(ctx, ev) │ fn(ctx)    │  │
//! │  └───────────────┴──────────┴─────────┴─────────────┴────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each [`GapEvent`] is offered to `on_event` of the **current** state.
//! If it returns `Some(next)`, the engine runs `on_exit` for the current
//! state, then `on_enter` for the next.  Transient states (`Connecting`,
//! `RepeatPairing`, `Disconnected`) carry an `on_settle` that names the
//! state to fall through to once their entry action has run, so a single
//! event can walk e.g. `Connected → Disconnected → Advertising`.

pub mod context;
pub mod states;

use core::fmt;

use context::LinkContext;
use log::info;

use crate::app::events::{AppEvent, GapEvent};
use crate::app::ports::HostStack;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkState {
    Idle = 0,
    Advertising = 1,
    Connecting = 2,
    /// Connected, link not encrypted.
    Connected = 3,
    /// Connected and encrypted.
    Secured = 4,
    RepeatPairing = 5,
    Disconnected = 6,
}

impl LinkState {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Idle,
        Self::Advertising,
        Self::Connecting,
        Self::Connected,
        Self::Secured,
        Self::RepeatPairing,
        Self::Disconnected,
    ];

    /// Convert an index back to `LinkState`.  Out-of-range falls back to
    /// `Idle` (asserts in debug builds).
    pub fn from_index(idx: usize) -> Self {
        Self::ALL.get(idx).copied().unwrap_or_else(|| {
            debug_assert!(false, "invalid state index: {idx}");
            Self::Idle
        })
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Secured)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit`: run exactly once per transition.
pub type StateActionFn<H> = fn(&mut LinkContext<H>);

/// Event handler.  Returns `Some(next)` to transition, `None` to stay.
pub type StateEventFn<H> = fn(&mut LinkContext<H>, &GapEvent) -> Option<LinkState>;

/// Fall-through for transient states, evaluated right after `on_enter`.
pub type StateSettleFn<H> = fn(&mut LinkContext<H>) -> Option<LinkState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor<H> {
    pub id: LinkState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<H>>,
    pub on_exit: Option<StateActionFn<H>>,
    pub on_event: StateEventFn<H>,
    pub on_settle: Option<StateSettleFn<H>>,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm<H> {
    /// Indexed by `LinkState as usize`.
    table: [StateDescriptor<H>; LinkState::COUNT],
    current: usize,
}

impl<H: HostStack> Fsm<H> {
    pub fn new(table: [StateDescriptor<H>; LinkState::COUNT], initial: LinkState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first event.
    pub fn start(&mut self, ctx: &mut LinkContext<H>) {
        info!("GAP starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Offer `event` to the current state and apply the resulting
    /// transition, if any.  Returns `true` when the state changed.
    pub fn handle(&mut self, event: &GapEvent, ctx: &mut LinkContext<H>) -> bool {
        let before = self.current;
        if let Some(next) = (self.table[self.current].on_event)(ctx, event) {
            self.transition(next, ctx);
        }
        self.current != before
    }

    /// Jump to `next` regardless of what the current state wants.
    pub fn force_transition(&mut self, next: LinkState, ctx: &mut LinkContext<H>) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> LinkState {
        LinkState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: LinkState, ctx: &mut LinkContext<H>) {
        let mut next_idx = next as usize;
        // Every transient state settles into a non-transient one, so the
        // chain is bounded by the table size.
        for _ in 0..LinkState::COUNT {
            let from = self.current_state();
            info!(
                "GAP transition: {} -> {}",
                self.table[self.current].name, self.table[next_idx].name
            );

            if let Some(exit) = self.table[self.current].on_exit {
                exit(ctx);
            }
            self.current = next_idx;
            ctx.push_event(AppEvent::StateChanged {
                from,
                to: self.current_state(),
            });
            if let Some(enter) = self.table[self.current].on_enter {
                enter(ctx);
            }

            match self.table[self.current].on_settle.and_then(|settle| settle(ctx)) {
                Some(n) if n as usize != self.current => next_idx = n as usize,
                _ => return,
            }
        }
        debug_assert!(false, "transient states did not settle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::{SimStack, StackCall};
    use crate::app::events::{ConnHandle, GapReply, PeerAddr};
    use crate::config::PeripheralConfig;
    use crate::error::StackError;

    const CONN: ConnHandle = ConnHandle(1);
    const PEER: PeerAddr = PeerAddr::public([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);

    fn make_ctx() -> LinkContext<SimStack> {
        LinkContext::new(PeripheralConfig::default(), SimStack::new())
    }

    fn make_fsm() -> Fsm<SimStack> {
        Fsm::new(states::build_state_table(), LinkState::Idle)
    }

    fn started() -> (Fsm<SimStack>, LinkContext<SimStack>) {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        fsm.handle(&GapEvent::Synced, &mut ctx);
        (fsm, ctx)
    }

    fn connect(fsm: &mut Fsm<SimStack>, ctx: &mut LinkContext<SimStack>) {
        fsm.handle(
            &GapEvent::Connect {
                status: 0,
                conn: CONN,
                peer: PEER,
            },
            ctx,
        );
    }

    #[test]
    fn starts_in_idle() {
        let fsm = make_fsm();
        assert_eq!(fsm.current_state(), LinkState::Idle);
    }

    #[test]
    fn sync_starts_advertising() {
        let (fsm, ctx) = started();
        assert_eq!(fsm.current_state(), LinkState::Advertising);
        assert_eq!(ctx.stack.adv_starts(), 1);
    }

    #[test]
    fn connect_records_link_and_initiates_security() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        let link = ctx.connection.unwrap();
        assert_eq!(link.handle, CONN);
        assert_eq!(link.peer, PEER);
        assert!(!link.encrypted);
        assert_eq!(ctx.stack.security_requests(), 1);
    }

    #[test]
    fn security_initiation_failure_stays_connected() {
        let (mut fsm, mut ctx) = started();
        ctx.stack.faults.initiate_security = Some(StackError(-1));
        connect(&mut fsm, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert!(ctx.connection.is_some());
    }

    #[test]
    fn failed_connect_restarts_advertising() {
        let (mut fsm, mut ctx) = started();
        fsm.handle(
            &GapEvent::Connect {
                status: 13,
                conn: CONN,
                peer: PEER,
            },
            &mut ctx,
        );
        assert_eq!(fsm.current_state(), LinkState::Advertising);
        assert!(ctx.connection.is_none());
        assert_eq!(ctx.stack.adv_starts(), 2);
    }

    #[test]
    fn encryption_success_secures_link() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        fsm.handle(&GapEvent::EncryptionChange { conn: CONN, status: 0 }, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Secured);
        assert!(ctx.connection.unwrap().encrypted);
    }

    #[test]
    fn encryption_failure_is_not_retried() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        let requests = ctx.stack.security_requests();
        fsm.handle(&GapEvent::EncryptionChange { conn: CONN, status: 5 }, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert_eq!(ctx.stack.security_requests(), requests);
    }

    #[test]
    fn disconnect_readvertises_once() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        ctx.stack.clear();
        fsm.handle(&GapEvent::Disconnect { conn: CONN, reason: 0x13 }, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Advertising);
        assert!(ctx.connection.is_none());
        assert_eq!(ctx.stack.adv_starts(), 1);
    }

    #[test]
    fn repeat_pairing_deletes_bond_and_retries() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        fsm.handle(&GapEvent::RepeatPairing { conn: CONN }, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert_eq!(ctx.reply, GapReply::RetryPairing);
        assert_eq!(ctx.stack.count(|c| *c == StackCall::DeleteBond(PEER)), 1);
    }

    #[test]
    fn repeat_pairing_retries_even_if_delete_fails() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        ctx.stack.faults.delete_bond = Some(StackError(-2));
        fsm.handle(&GapEvent::RepeatPairing { conn: CONN }, &mut ctx);
        assert_eq!(ctx.reply, GapReply::RetryPairing);
    }

    #[test]
    fn events_for_other_connections_are_ignored() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        fsm.handle(
            &GapEvent::Disconnect {
                conn: ConnHandle(9),
                reason: 0,
            },
            &mut ctx,
        );
        assert_eq!(fsm.current_state(), LinkState::Connected);
        assert_eq!(ctx.reply, GapReply::UnknownConnection);
    }

    #[test]
    fn transitions_emit_state_events() {
        let (_fsm, mut ctx) = started();
        let events: Vec<_> = ctx.drain_events().collect();
        assert!(events.contains(&AppEvent::StateChanged {
            from: LinkState::Idle,
            to: LinkState::Advertising,
        }));
    }

    #[test]
    fn force_transition_to_idle_clears_link() {
        let (mut fsm, mut ctx) = started();
        connect(&mut fsm, &mut ctx);
        fsm.force_transition(LinkState::Idle, &mut ctx);
        assert_eq!(fsm.current_state(), LinkState::Idle);
        assert!(ctx.connection.is_none());
    }

    #[test]
    fn state_from_index_roundtrip() {
        for i in 0..LinkState::COUNT {
            assert_eq!(LinkState::from_index(i) as usize, i);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn state_from_invalid_index_returns_idle() {
        assert_eq!(LinkState::from_index(99), LinkState::Idle);
    }
}
