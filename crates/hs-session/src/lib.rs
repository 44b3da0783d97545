//! Session coordinator for the Hideseek mini-game.
//!
//! Many independently-ticking simulated agents play short rounds of hide
//! and seek in small groups. This crate is the part they all contend on:
//! the [`SessionRegistry`] owns the canonical session table and hands out
//! immutable [`SessionView`] snapshots, the [`SessionStateMachine`] walks
//! each session around its strict phase cycle, the [`HintLedger`] keeps
//! decaying positional hints and betrayal motivation, the [`ListenerHub`]
//! fans events out to per-participant listeners, and the
//! [`MaintenanceSweeper`] runs one housekeeping pass per region per tick.
//!
//! Per-role movement heuristics, content loading, and persistence live in
//! the host; the coordinator only sees agents through the
//! [`hs_core::AgentDirectory`] seam.

/// Coordinator tunables and derived per-session profiles.
pub mod config;
/// Invariant-violation error types.
pub mod error;
/// The session event union and listener trait.
pub mod event;
/// Hide hints and betrayal-motivation memory.
pub mod hints;
/// Per-participant listener registration and fanout.
pub mod listener;
/// The phase state machine and role assignment.
pub mod machine;
/// The canonical session table and its operations.
pub mod registry;
/// Session state, roles, phases, and immutable views.
pub mod session;
/// The per-region maintenance sweep.
pub mod sweep;

/// Re-exports of [`config::CoordinatorConfig`] and [`config::SessionProfile`].
pub use config::{CoordinatorConfig, SessionProfile};
/// Re-exports of [`error::SessionError`] and [`error::SessionResult`].
pub use error::{SessionError, SessionResult};
/// Re-exports of [`event::QuirkKind`], [`event::SessionEvent`], and
/// [`event::SessionListener`].
pub use event::{QuirkKind, SessionEvent, SessionListener};
/// Re-exports of [`hints::BetrayalMemory`], [`hints::HideHint`],
/// [`hints::HintLedger`], and [`hints::TriggerKind`].
pub use hints::{BetrayalMemory, HideHint, HintLedger, TriggerKind};
/// Re-export of [`listener::ListenerHub`].
pub use listener::ListenerHub;
/// Re-export of [`machine::SessionStateMachine`].
pub use machine::SessionStateMachine;
/// Re-export of [`registry::SessionRegistry`].
pub use registry::SessionRegistry;
/// Re-exports of [`session::Phase`], [`session::Role`], and
/// [`session::SessionView`].
pub use session::{Phase, Role, SessionView};
/// Re-exports of [`sweep::MaintenanceSweeper`] and [`sweep::SweepReport`].
pub use sweep::{MaintenanceSweeper, SweepReport};
