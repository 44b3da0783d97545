use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hs_core::{AgentId, RegionId, SessionId, Vec3};

use crate::error::{SessionError, SessionResult};
use crate::event::{QuirkKind, SessionEvent};
use crate::machine;
use crate::registry::{SessionRegistry, members_of};
use crate::session::{Phase, Role, Session};

/// Counters from one maintenance pass, for host observability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Open sessions visited.
    pub sessions_swept: usize,
    /// Sessions closed during the pass.
    pub sessions_closed: usize,
    /// Dead or missing members removed.
    pub members_pruned: usize,
    /// Spectators promoted into participant slots.
    pub spectators_promoted: usize,
    /// Ambient quirks fired.
    pub quirks_fired: usize,
    /// Stale hints dropped.
    pub hints_pruned: usize,
    /// Betrayal memories dropped.
    pub memories_pruned: usize,
}

/// Why a sweep decided a session must close.
#[derive(Debug)]
enum CloseReason {
    DirectorGone,
    Empty,
    Expired,
    NoAnchor,
}

/// One housekeeping pass per (region, tick) across that region's sessions.
///
/// A last-run marker per region makes repeat invocations for the same tick
/// free; a failure inside one session is logged and isolated so the rest
/// of the region still gets swept.
pub struct MaintenanceSweeper {
    registry: Arc<SessionRegistry>,
    last_run: DashMap<RegionId, u64>,
}

impl std::fmt::Debug for MaintenanceSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceSweeper")
            .field("regions", &self.last_run.len())
            .finish()
    }
}

impl MaintenanceSweeper {
    /// Create a sweeper over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            last_run: DashMap::new(),
        }
    }

    /// Run the maintenance pass for `region` at `tick`.
    ///
    /// At most one pass does work per (region, tick); later calls for the
    /// same or an earlier tick return an empty report.
    pub fn sweep(&self, region: &RegionId, tick: u64) -> SweepReport {
        match self.last_run.entry(region.clone()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() >= tick {
                    return SweepReport::default();
                }
                occupied.insert(tick);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(tick);
            }
        }

        let mut report = SweepReport::default();
        for session_id in self.registry.session_ids_in(region) {
            let Some(arc) = self.registry.session_arc(session_id) else {
                continue;
            };
            report.sessions_swept += 1;
            match self.sweep_session(session_id, &arc, tick, &mut report) {
                Ok(Some(reason)) => {
                    debug!(session = %session_id, ?reason, "sweep closing session");
                    self.registry.close_session(session_id);
                    report.sessions_closed += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(session = %session_id, %err, "sweep failed for session; continuing");
                }
            }
        }
        report
    }

    /// Sweep one session. Returns a close decision; the caller performs
    /// the teardown after the session lock is released.
    fn sweep_session(
        &self,
        session_id: SessionId,
        arc: &Arc<Mutex<Session>>,
        tick: u64,
        report: &mut SweepReport,
    ) -> SessionResult<Option<CloseReason>> {
        let config = self.registry.config().clone();
        let directory = self.registry.directory();

        let (recipients, events) = {
            let mut session = arc.lock();
            if session.closing {
                // Lost a race against teardown; nothing left to sweep.
                return Ok(None);
            }
            let mut events: Vec<SessionEvent> = Vec::new();

            // 1. Prune dead or missing members.
            let dead: Vec<AgentId> = members_of(&session)
                .into_iter()
                .filter(|id| !directory.is_alive(*id))
                .collect();
            for id in &dead {
                session.remove_member(*id);
                session.ledger.clear_agent(*id);
                self.registry.hub().unregister_all(*id);
                self.registry.index_remove(*id, session_id);
                report.members_pruned += 1;
            }
            if dead.contains(&session.director) {
                return Ok(Some(CloseReason::DirectorGone));
            }
            if session.member_count() == 0 {
                return Ok(Some(CloseReason::Empty));
            }

            if !session.participants.contains(&session.director) {
                return Err(SessionError::DirectorMissing(session_id));
            }

            // 2. Expire old sessions.
            if tick >= session.expiry_tick {
                return Ok(Some(CloseReason::Expired));
            }

            // 3. Promote spectators into open participant slots.
            let mut promoted_any = false;
            while session.phase.is_joinable()
                && session.participants.len() < config.max_participants
            {
                let mut waiting: Vec<AgentId> = session.spectators.iter().copied().collect();
                waiting.sort();
                let Some(next) = waiting.first().copied() else {
                    break;
                };
                session.add_participant(next, Role::Support);
                report.spectators_promoted += 1;
                promoted_any = true;
                let view = session.view();
                events.push(SessionEvent::RoleAssigned {
                    session: session_id,
                    view,
                    agent: next,
                    role: Role::Support,
                });
            }

            // 4. Re-anchor when the anchor has gone stale.
            if tick.saturating_sub(session.anchor_tick) > config.anchor_stale_ticks {
                match anchor_candidate(&session, directory) {
                    Some(position) => {
                        session.anchor = position;
                        session.anchor_tick = tick;
                    }
                    None => return Ok(Some(CloseReason::NoAnchor)),
                }
            }

            // 5. A session with at most one participant cannot play.
            if session.participants.len() <= 1 {
                events.extend(machine::force_waiting(&mut session, tick));
            } else if session.phase != Phase::Waiting {
                // 6. Guarantee a living seeker mid-round.
                let seeker_ok = session
                    .seeker
                    .is_some_and(|id| session.participants.contains(&id) && directory.is_alive(id));
                if !seeker_ok {
                    let assignments = self
                        .registry
                        .with_rng(|rng| machine::assign_default_roles(&mut session, rng));
                    let view = session.view();
                    events.extend(machine::role_events(&session, &view, assignments));
                }
            }

            // 7. Ambient quirk, probabilistic and cooldown-gated.
            let cooled = session
                .last_quirk
                .is_none_or(|(_, t)| tick.saturating_sub(t) >= config.quirk_cooldown_ticks);
            if cooled
                && config.quirk_chance > 0.0
                && self
                    .registry
                    .with_rng(|rng| rng.random_bool(config.quirk_chance.clamp(0.0, 1.0)))
            {
                let quirk = ambient_quirk_for(session.phase);
                let source = self.registry.with_rng(|rng| {
                    let mut pool: Vec<AgentId> = session.participants.iter().copied().collect();
                    pool.sort();
                    pool[rng.random_range(0..pool.len())]
                });
                session.last_quirk = Some((quirk, tick));
                report.quirks_fired += 1;
                events.push(SessionEvent::QuirkFired {
                    session: session_id,
                    view: session.view(),
                    source,
                    quirk,
                });
            }

            // 8. Ledger decay and pruning.
            if promoted_any {
                machine::recompute_profile(&mut session, directory, &config);
                events.push(SessionEvent::MetricsUpdated {
                    session: session_id,
                    view: session.view(),
                });
            }
            let (hints, memories) = session.ledger.prune(tick, &config);
            report.hints_pruned += hints;
            report.memories_pruned += memories;

            (members_of(&session), events)
        };

        if !events.is_empty() {
            self.registry.dispatch(&recipients, events);
        }
        Ok(None)
    }
}

/// The phase-flavored ambient flourish.
fn ambient_quirk_for(phase: Phase) -> QuirkKind {
    match phase {
        Phase::Waiting | Phase::Formation => QuirkKind::Stretch,
        Phase::Countdown => QuirkKind::Mutter,
        Phase::Seek => QuirkKind::Glance,
        Phase::Celebrate => QuirkKind::Cheer,
    }
}

/// Best living anchor source: director first, then any living participant,
/// then any living spectator.
fn anchor_candidate(
    session: &Session,
    directory: &dyn hs_core::AgentDirectory,
) -> Option<Vec3> {
    if directory.is_alive(session.director)
        && let Some(pos) = directory.position(session.director)
    {
        return Some(pos);
    }
    let mut participants: Vec<AgentId> = session.participants.iter().copied().collect();
    participants.sort();
    let mut spectators: Vec<AgentId> = session.spectators.iter().copied().collect();
    spectators.sort();
    participants
        .into_iter()
        .chain(spectators)
        .filter(|id| directory.is_alive(*id))
        .find_map(|id| directory.position(id))
}
