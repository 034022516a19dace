//! Generic table-driven finite state machine
//!
//! One machine serves both peer roles: transitions are registered as
//! `(from, event) -> (actions, to)` rows and the machine is parameterized
//! over the context and event-payload types, so the same `Fsm` drives the
//! initiator and responder tables with decoded Diameter messages as
//! payloads.
//!
//! `trigger` semantics:
//! - an event with no row for the current state fails with
//!   `NoTransitionFromState` and leaves the state unchanged
//! - actions run in registration order; the first failure aborts the
//!   transition, the state is not updated, and the error is reported as
//!   `ActionFailed` with the action's name

use std::fmt;

use crate::error::{DiameterError, DiameterResult};

/// Peer connection states (RFC 6733 Section 5.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// No connection
    Closed,
    /// Initiator: transport connect outstanding
    WaitConnAck,
    /// Initiator: CER sent, waiting for CEA
    WaitICea,
    /// Both connections up, waiting for the initiated side to resolve
    WaitConnAckElect,
    /// Election pending on two live connections
    WaitReturns,
    /// Responder connection operational
    ROpen,
    /// Initiator connection operational
    IOpen,
    /// DPR sent, waiting for DPA
    Closing,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::Closed => "Closed",
            PeerState::WaitConnAck => "Wait-Conn-Ack",
            PeerState::WaitICea => "Wait-I-CEA",
            PeerState::WaitConnAckElect => "Wait-Conn-Ack/Elect",
            PeerState::WaitReturns => "Wait-Returns",
            PeerState::ROpen => "R-Open",
            PeerState::IOpen => "I-Open",
            PeerState::Closing => "Closing",
        };
        f.write_str(name)
    }
}

/// Peer state machine events (RFC 6733 Section 5.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerEvent {
    /// The application asked for a connection to the peer
    Start,
    /// Responder transport is up and a CER has arrived on it
    RConnCer,
    /// Initiated transport connection established
    IRcvConnAck,
    /// Initiated transport connection failed
    IRcvConnNack,
    /// An application-defined timer expired
    Timeout,
    /// CER received on the initiator connection
    IRcvCer,
    /// CER received on the responder connection
    RRcvCer,
    /// CEA received on the initiator connection
    IRcvCea,
    /// Something other than a CEA arrived while waiting for one (responder)
    RRcvNonCea,
    /// Something other than a CEA arrived while waiting for one (initiator)
    IRcvNonCea,
    /// Initiator connection dropped
    IPeerDisc,
    /// Responder connection dropped
    RPeerDisc,
    /// DPR received on the initiator connection
    IRcvDpr,
    /// DPR received on the responder connection
    RRcvDpr,
    /// DPA received on the initiator connection
    IRcvDpa,
    /// DPA received on the responder connection
    RRcvDpa,
    /// The local node won the election
    WinElection,
    /// The application wants a message sent
    SendMessage,
    /// Application message received on the initiator connection
    IRcvMessage,
    /// Application message received on the responder connection
    RRcvMessage,
    /// DWR received on the initiator connection
    IRcvDwr,
    /// DWR received on the responder connection
    RRcvDwr,
    /// DWA received on the initiator connection
    IRcvDwa,
    /// DWA received on the responder connection
    RRcvDwa,
    /// The application asked for the connection to be torn down
    Stop,
    /// A Diameter protocol error occurred
    DiameterError,
}

impl fmt::Display for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerEvent::Start => "Start",
            PeerEvent::RConnCer => "R-Conn-CER",
            PeerEvent::IRcvConnAck => "I-Rcv-Conn-Ack",
            PeerEvent::IRcvConnNack => "I-Rcv-Conn-Nack",
            PeerEvent::Timeout => "Timeout",
            PeerEvent::IRcvCer => "I-Rcv-CER",
            PeerEvent::RRcvCer => "R-Rcv-CER",
            PeerEvent::IRcvCea => "I-Rcv-CEA",
            PeerEvent::RRcvNonCea => "R-Rcv-Non-CEA",
            PeerEvent::IRcvNonCea => "I-Rcv-Non-CEA",
            PeerEvent::IPeerDisc => "I-Peer-Disc",
            PeerEvent::RPeerDisc => "R-Peer-Disc",
            PeerEvent::IRcvDpr => "I-Rcv-DPR",
            PeerEvent::RRcvDpr => "R-Rcv-DPR",
            PeerEvent::IRcvDpa => "I-Rcv-DPA",
            PeerEvent::RRcvDpa => "R-Rcv-DPA",
            PeerEvent::WinElection => "Win-Election",
            PeerEvent::SendMessage => "Send-Message",
            PeerEvent::IRcvMessage => "I-Rcv-Message",
            PeerEvent::RRcvMessage => "R-Rcv-Message",
            PeerEvent::IRcvDwr => "I-Rcv-DWR",
            PeerEvent::RRcvDwr => "R-Rcv-DWR",
            PeerEvent::IRcvDwa => "I-Rcv-DWA",
            PeerEvent::RRcvDwa => "R-Rcv-DWA",
            PeerEvent::Stop => "Stop",
            PeerEvent::DiameterError => "Diameter-Error",
        };
        f.write_str(name)
    }
}

/// Action function: transforms the event payload against the context
pub type ActionFn<C, T> = fn(&mut C, Option<T>) -> DiameterResult<Option<T>>;

/// A named action, the unit of work attached to a transition
pub struct Action<C, T> {
    /// Stable name used in traces and `ActionFailed` errors
    pub name: &'static str,
    /// The action body
    pub run: ActionFn<C, T>,
}

impl<C, T> Clone for Action<C, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, T> Copy for Action<C, T> {}

impl<C, T> fmt::Debug for Action<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

/// One row of the transition table
pub struct Transition<C, T> {
    pub from: PeerState,
    pub event: PeerEvent,
    pub to: PeerState,
    pub actions: Vec<Action<C, T>>,
}

/// Table-driven state machine over a context `C` and payload `T`
pub struct Fsm<C, T> {
    current: PeerState,
    transitions: Vec<Transition<C, T>>,
}

impl<C, T> Fsm<C, T> {
    /// Create a machine in the given initial state with no transitions
    pub fn new(initial: PeerState) -> Self {
        Self {
            current: initial,
            transitions: Vec::new(),
        }
    }

    /// Register a transition row
    pub fn add_transition(
        &mut self,
        from: PeerState,
        event: PeerEvent,
        to: PeerState,
        actions: Vec<Action<C, T>>,
    ) {
        self.transitions.push(Transition {
            from,
            event,
            to,
            actions,
        });
    }

    /// Current state
    pub fn state(&self) -> PeerState {
        self.current
    }

    /// Force the state, bypassing the table
    pub fn set_state(&mut self, state: PeerState) {
        self.current = state;
    }

    /// Whether a row exists for `event` in the current state
    pub fn can_trigger(&self, event: PeerEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == self.current && t.event == event)
    }

    /// Fire an event: run the matching row's actions in order, then move to
    /// the target state
    ///
    /// The payload is threaded through the actions; the value returned by
    /// the last action is handed back to the caller (typically the reply
    /// message the transition produced).
    pub fn trigger(
        &mut self,
        ctx: &mut C,
        event: PeerEvent,
        mut msg: Option<T>,
    ) -> DiameterResult<Option<T>> {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == self.current && t.event == event)
            .ok_or(DiameterError::NoTransitionFromState {
                state: self.current,
                event,
            })?;

        for action in &transition.actions {
            msg = (action.run)(ctx, msg).map_err(|e| DiameterError::ActionFailed {
                name: action.name,
                source: Box::new(e),
            })?;
        }

        self.current = transition.to;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        calls: Vec<&'static str>,
    }

    fn record_a(ctx: &mut Counter, msg: Option<u32>) -> DiameterResult<Option<u32>> {
        ctx.calls.push("a");
        Ok(msg.map(|v| v + 1))
    }

    fn record_b(ctx: &mut Counter, msg: Option<u32>) -> DiameterResult<Option<u32>> {
        ctx.calls.push("b");
        Ok(msg.map(|v| v * 10))
    }

    fn fail(ctx: &mut Counter, _msg: Option<u32>) -> DiameterResult<Option<u32>> {
        ctx.calls.push("fail");
        Err(DiameterError::ResultCodeMissing)
    }

    fn machine() -> Fsm<Counter, u32> {
        let mut fsm = Fsm::new(PeerState::Closed);
        fsm.add_transition(
            PeerState::Closed,
            PeerEvent::Start,
            PeerState::WaitConnAck,
            vec![
                Action { name: "A", run: record_a },
                Action { name: "B", run: record_b },
            ],
        );
        fsm.add_transition(
            PeerState::WaitConnAck,
            PeerEvent::Timeout,
            PeerState::Closed,
            vec![Action { name: "Fail", run: fail }],
        );
        fsm
    }

    #[test]
    fn test_trigger_runs_actions_in_order() {
        let mut fsm = machine();
        let mut ctx = Counter { calls: Vec::new() };

        let out = fsm.trigger(&mut ctx, PeerEvent::Start, Some(4)).unwrap();
        assert_eq!(out, Some(50)); // (4 + 1) * 10
        assert_eq!(ctx.calls, vec!["a", "b"]);
        assert_eq!(fsm.state(), PeerState::WaitConnAck);
    }

    #[test]
    fn test_unknown_event_leaves_state() {
        let mut fsm = machine();
        let mut ctx = Counter { calls: Vec::new() };

        let err = fsm.trigger(&mut ctx, PeerEvent::Stop, None).unwrap_err();
        match err {
            DiameterError::NoTransitionFromState { state, event } => {
                assert_eq!(state, PeerState::Closed);
                assert_eq!(event, PeerEvent::Stop);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fsm.state(), PeerState::Closed);
        assert!(ctx.calls.is_empty());
    }

    #[test]
    fn test_repeated_event_has_no_transition() {
        let mut fsm = machine();
        let mut ctx = Counter { calls: Vec::new() };

        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();
        assert_eq!(fsm.state(), PeerState::WaitConnAck);

        let err = fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap_err();
        assert!(matches!(err, DiameterError::NoTransitionFromState { .. }));
        assert_eq!(fsm.state(), PeerState::WaitConnAck);
    }

    #[test]
    fn test_failed_action_keeps_state() {
        let mut fsm = machine();
        let mut ctx = Counter { calls: Vec::new() };
        fsm.trigger(&mut ctx, PeerEvent::Start, None).unwrap();

        let err = fsm.trigger(&mut ctx, PeerEvent::Timeout, None).unwrap_err();
        match err {
            DiameterError::ActionFailed { name, .. } => assert_eq!(name, "Fail"),
            other => panic!("unexpected: {other:?}"),
        }
        // State must not advance past a failed action
        assert_eq!(fsm.state(), PeerState::WaitConnAck);
    }

    #[test]
    fn test_can_trigger() {
        let fsm = machine();
        assert!(fsm.can_trigger(PeerEvent::Start));
        assert!(!fsm.can_trigger(PeerEvent::Timeout));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PeerState::WaitConnAckElect.to_string(), "Wait-Conn-Ack/Elect");
        assert_eq!(PeerEvent::IRcvCea.to_string(), "I-Rcv-CEA");
        assert_eq!(PeerEvent::DiameterError.to_string(), "Diameter-Error");
    }
}
