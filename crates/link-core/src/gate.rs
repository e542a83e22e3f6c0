//! Single-slot readiness gate and the link state it publishes.

use tokio::sync::watch;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No transport attached.
    #[default]
    Closed,
    /// Waiting for the transport to report open.
    Opening,
    /// Target idle; the next command may be dispatched.
    Idle,
    /// One command is outstanding on the wire.
    InFlight,
}

impl LinkState {
    /// `true` exactly when the gate would admit a command.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Readiness flag owned by the protocol driver.
///
/// `Idle` is the `ready = true` state. Only transport signals move the gate to
/// `Idle`; only [`ReadinessGate::try_acquire`] clears it.
#[derive(Debug)]
pub(crate) struct ReadinessGate {
    state: watch::Sender<LinkState>,
}

impl ReadinessGate {
    pub(crate) fn new() -> (Self, watch::Receiver<LinkState>) {
        let (state, observer) = watch::channel(LinkState::Closed);
        (Self { state }, observer)
    }

    pub(crate) fn current(&self) -> LinkState {
        *self.state.borrow()
    }

    pub(crate) fn opening(&self) {
        self.state
            .send_if_modified(|state| transition(state, LinkState::Closed, LinkState::Opening));
    }

    /// Target became idle: transport opened or the outstanding command completed.
    pub(crate) fn signal_idle(&self) {
        self.state.send_if_modified(|state| match *state {
            LinkState::Opening | LinkState::InFlight => {
                *state = LinkState::Idle;
                true
            }
            LinkState::Closed | LinkState::Idle => false,
        });
    }

    /// Takes the gate for one command; `false` unless it was `Idle`.
    pub(crate) fn try_acquire(&self) -> bool {
        self.state
            .send_if_modified(|state| transition(state, LinkState::Idle, LinkState::InFlight))
    }

    pub(crate) fn close(&self) {
        self.state.send_replace(LinkState::Closed);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.current() == LinkState::Closed
    }
}

fn transition(state: &mut LinkState, from: LinkState, to: LinkState) -> bool {
    if *state == from {
        *state = to;
        true
    } else {
        false
    }
}
