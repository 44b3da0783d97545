//! Core types for Hideseek.
//!
//! Everything a consumer of the session coordinator shares with it lives
//! here: agent and session identities, 3-D positions, the per-agent trait
//! summary the coordinator derives its tunables from, and the
//! [`AgentDirectory`] seam through which the coordinator observes the
//! simulated world (liveness, position, region, ownership). The crate has
//! no session semantics of its own.

/// Directory seam: how the coordinator observes agents.
pub mod directory;
/// Position math.
pub mod geom;
/// Identifier newtypes.
pub mod ids;
/// Per-agent behavioral trait summaries.
pub mod traits;

/// Re-exports of [`directory::AgentDirectory`] and [`directory::StaticDirectory`].
pub use directory::{AgentDirectory, StaticDirectory};
/// Re-export of [`geom::Vec3`].
pub use geom::Vec3;
/// Re-exports of [`ids::AgentId`], [`ids::RegionId`], and [`ids::SessionId`].
pub use ids::{AgentId, RegionId, SessionId};
/// Re-export of [`traits::TraitSummary`].
pub use traits::TraitSummary;
