/// Session state machine.
///
/// ```text
///              propose               granted
///   Idle ─────────────> AwaitingApproval ─────> Streaming(Outgoing)
///    │  <───────────────────┘ denied                  │
///    │                                                │ batch complete
///    │ proposal            decide(accepted)           v
///    └──────> AwaitingDecision ─────────> Streaming(Incoming) ──> Idle
///                   └── decide(none) ──> Idle
///
///   any ── channel closed / error ──> Disconnected ── connected ──> Idle
/// ```

use std::fmt;

use thiserror::Error;

/// How the channel was established. Does not change protocol behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dialed out.
    Initiator,
    /// Accepted inbound.
    Responder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }
}

/// Which way an active batch flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Sender: proposal sent, waiting for the decision.
    AwaitingApproval,
    /// Receiver: proposal surfaced, waiting for the operator.
    AwaitingDecision,
    Streaming(Flow),
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingApproval => write!(f, "awaiting-approval"),
            Self::AwaitingDecision => write!(f, "awaiting-decision"),
            Self::Streaming(Flow::Outgoing) => write!(f, "streaming-out"),
            Self::Streaming(Flow::Incoming) => write!(f, "streaming-in"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Propose,
    Granted,
    Denied,
    ProposalReceived,
    Decide { accepted: bool },
    BatchComplete,
    ChannelClosed,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {transition:?} from {from}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub transition: Transition,
}

/// Per-session state with the legal transitions enforced.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    role: Role,
    state: SessionState,
}

impl SessionMachine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Idle,
        }
    }

    /// Starts disconnected; apply `Connected` once the channel is up.
    pub fn detached(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Disconnected,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn apply(&mut self, transition: Transition) -> Result<SessionState, IllegalTransition> {
        use SessionState::*;
        use Transition::*;

        let next = match (self.state, transition) {
            (Idle, Propose) => AwaitingApproval,
            (AwaitingApproval, Granted) => Streaming(Flow::Outgoing),
            (AwaitingApproval, Denied) => Idle,
            (Idle, ProposalReceived) => AwaitingDecision,
            (AwaitingDecision, Decide { accepted: true }) => Streaming(Flow::Incoming),
            (AwaitingDecision, Decide { accepted: false }) => Idle,
            (Streaming(_), BatchComplete) => Idle,
            (_, ChannelClosed) => Disconnected,
            (Disconnected, Connected) => Idle,
            (from, transition) => return Err(IllegalTransition { from, transition }),
        };
        self.state = next;
        Ok(next)
    }
}
