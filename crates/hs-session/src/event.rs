use serde::{Deserialize, Serialize};

use hs_core::{AgentId, SessionId};

use crate::session::{Phase, Role, SessionView};

/// A small cosmetic flourish broadcast to session members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuirkKind {
    /// The seeker pounces on a capture.
    Pounce,
    /// Celebration at the end of a round.
    Cheer,
    /// A deflated shrug when play falls back to waiting.
    Shrug,
    /// Idle stretching while waiting for players.
    Stretch,
    /// A darting glance mid-seek.
    Glance,
    /// Muttered counting during the countdown.
    Mutter,
}

/// Everything the coordinator tells its listeners.
///
/// A closed union: hosts match exhaustively and the compiler flags new
/// variants. Every variant except [`SessionEvent::SessionClosed`] carries
/// an immutable [`SessionView`] snapshot taken at emission time.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session advanced (or was reset) to a new phase.
    PhaseChanged {
        /// Session the phase change happened in.
        session: SessionId,
        /// Snapshot after the change.
        view: SessionView,
        /// Phase before.
        from: Phase,
        /// Phase after.
        to: Phase,
    },
    /// A member was given a role.
    RoleAssigned {
        /// Session the assignment happened in.
        session: SessionId,
        /// Snapshot after the assignment.
        view: SessionView,
        /// The member assigned.
        agent: AgentId,
        /// The role it now holds.
        role: Role,
    },
    /// Terminal event; fired exactly once, after which the session id is
    /// dead.
    SessionClosed {
        /// The closed session.
        session: SessionId,
    },
    /// Membership or profile numbers changed.
    MetricsUpdated {
        /// Session whose numbers changed.
        session: SessionId,
        /// Snapshot after the change.
        view: SessionView,
    },
    /// A hider was caught.
    Captured {
        /// Session the capture happened in.
        session: SessionId,
        /// Snapshot after the capture.
        view: SessionView,
        /// The capturing seeker, when the caller identified one.
        seeker: Option<AgentId>,
        /// The caught hider (now support).
        hider: AgentId,
    },
    /// A positional hint about a hider was recorded.
    HintReported {
        /// Session the hint belongs to.
        session: SessionId,
        /// Snapshot after the report.
        view: SessionView,
        /// The hider the hint points at.
        target: AgentId,
        /// Whether this was a betrayal (high-priority) hint.
        betrayal: bool,
    },
    /// An ambient quirk fired.
    QuirkFired {
        /// Session the quirk fired in.
        session: SessionId,
        /// Snapshot at firing time.
        view: SessionView,
        /// The member performing the flourish.
        source: AgentId,
        /// Which flourish.
        quirk: QuirkKind,
    },
}

impl SessionEvent {
    /// The session this event belongs to.
    pub fn session(&self) -> SessionId {
        match self {
            Self::PhaseChanged { session, .. }
            | Self::RoleAssigned { session, .. }
            | Self::SessionClosed { session }
            | Self::MetricsUpdated { session, .. }
            | Self::Captured { session, .. }
            | Self::HintReported { session, .. }
            | Self::QuirkFired { session, .. } => *session,
        }
    }

    /// The snapshot carried by this event, if any.
    pub fn view(&self) -> Option<&SessionView> {
        match self {
            Self::PhaseChanged { view, .. }
            | Self::RoleAssigned { view, .. }
            | Self::MetricsUpdated { view, .. }
            | Self::Captured { view, .. }
            | Self::HintReported { view, .. }
            | Self::QuirkFired { view, .. } => Some(view),
            Self::SessionClosed { .. } => None,
        }
    }
}

/// A collaborator interested in session events.
///
/// Delivery is synchronous and best-effort: implementations should return
/// quickly, and a panicking listener is isolated without disturbing the
/// others. No ordering is guaranteed across listeners for one event.
pub trait SessionListener: Send + Sync {
    /// Called once per event the listener's participant can see.
    fn on_event(&self, event: &SessionEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_event_has_no_view() {
        let event = SessionEvent::SessionClosed {
            session: SessionId::new(),
        };
        assert!(event.view().is_none());
        assert_eq!(event.session(), event.session());
    }
}
