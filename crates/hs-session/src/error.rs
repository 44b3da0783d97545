use hs_core::{AgentId, SessionId};

/// Result alias for coordinator operations that can hit internal corruption.
pub type SessionResult<T> = Result<T, SessionError>;

/// Internal invariant violations.
///
/// Ordinary validation failures (unknown session, non-member, wrong role)
/// are never errors; callers race routinely and get `None`/`false` back.
/// These variants indicate corrupted coordinator state and are logged at
/// error level wherever they surface.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A mutation was attempted on a session whose closing flag is set.
    #[error("session {0} mutated after closing")]
    MutatedAfterClose(SessionId),

    /// An open session's director is not among its participants.
    #[error("session {0} has no director among its participants")]
    DirectorMissing(SessionId),

    /// The reverse index points an agent at a session that does not
    /// contain it.
    #[error("reverse index maps {agent} to session {session} which does not contain it")]
    IndexCorrupt {
        /// The indexed agent.
        agent: AgentId,
        /// The session the index claims it belongs to.
        session: SessionId,
    },
}
