use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use hs_core::{AgentDirectory, AgentId, RegionId, SessionId, TraitSummary};

use crate::config::{CoordinatorConfig, SessionProfile};
use crate::event::{QuirkKind, SessionEvent};
use crate::registry::{SessionRegistry, members_of};
use crate::session::{Phase, Role, Session, SessionView};

/// Drives sessions around the strict phase cycle.
///
/// WAITING → FORMATION → COUNTDOWN → SEEK → CELEBRATE → WAITING, no other
/// edge. Hosts call [`SessionStateMachine::try_advance`] once per tick per
/// session (or [`SessionStateMachine::tick_all`] per region); a call that
/// finds no guard satisfied is a cheap no-op.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    registry: Arc<SessionRegistry>,
}

impl SessionStateMachine {
    /// Create a machine operating on `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Advance one session by at most one phase edge.
    ///
    /// Guards, per the cycle:
    /// - WAITING→FORMATION: more than one participant (roles are shuffled
    ///   as part of the edge);
    /// - FORMATION→COUNTDOWN: a seeker exists and the joiner grace period
    ///   has elapsed;
    /// - COUNTDOWN→SEEK: the seeker is still a participant and the
    ///   countdown has elapsed;
    /// - SEEK→CELEBRATE: no hider remains, or the seek timed out;
    /// - CELEBRATE→WAITING: the celebration has elapsed.
    ///
    /// Returns the `(from, to)` edge taken, or `None`.
    pub fn try_advance(&self, session_id: SessionId, tick: u64) -> Option<(Phase, Phase)> {
        let arc = self.registry.session_arc(session_id)?;
        let (edge, recipients, events) = {
            let mut session = arc.lock();
            if session.closing {
                return None;
            }
            let from = session.phase;
            let profile = session.profile;
            let elapsed = session.elapsed_in_phase(tick);
            let ready = match from {
                Phase::Waiting => session.participants.len() > 1,
                Phase::Formation => {
                    session.seeker.is_some() && elapsed >= profile.joiner_grace_ticks
                }
                Phase::Countdown => {
                    session
                        .seeker
                        .is_some_and(|id| session.participants.contains(&id))
                        && elapsed >= profile.countdown_ticks
                }
                Phase::Seek => session.hider_count() == 0 || elapsed >= profile.seek_timeout_ticks,
                Phase::Celebrate => elapsed >= profile.celebrate_ticks,
            };
            if !ready {
                return None;
            }

            let to = from.next();
            let mut assignments = Vec::new();
            let mut quirk: Option<(AgentId, QuirkKind)> = None;

            match to {
                Phase::Formation => {
                    assignments = self
                        .registry
                        .with_rng(|rng| assign_default_roles(&mut session, rng));
                }
                Phase::Countdown | Phase::Seek => {}
                Phase::Celebrate => {
                    session.rounds_completed += 1;
                    session.last_seeker = session.seeker;
                    // Leaving SEEK always clears hints and betrayal memory.
                    session.ledger.clear_all();
                    let source = session.last_seeker.unwrap_or(session.director);
                    quirk = Some((source, QuirkKind::Cheer));
                }
                Phase::Waiting => {
                    let source = session
                        .last_seeker
                        .filter(|id| session.participants.contains(id))
                        .unwrap_or(session.director);
                    quirk = Some((source, QuirkKind::Shrug));
                    assignments = self
                        .registry
                        .with_rng(|rng| assign_default_roles(&mut session, rng));
                }
            }

            session.enter_phase(to, tick);
            if let Some((_, kind)) = quirk {
                session.last_quirk = Some((kind, tick));
            }

            let view = session.view();
            let mut events = vec![SessionEvent::PhaseChanged {
                session: session_id,
                view: view.clone(),
                from,
                to,
            }];
            events.extend(role_events(&session, &view, assignments));
            if let Some((source, kind)) = quirk {
                events.push(SessionEvent::QuirkFired {
                    session: session_id,
                    view: view.clone(),
                    source,
                    quirk: kind,
                });
            }
            ((from, to), members_of(&session), events)
        };

        debug!(session = %session_id, from = %edge.0, to = %edge.1, "phase advanced");
        self.registry.dispatch(&recipients, events);
        Some(edge)
    }

    /// Attempt one phase advancement for every session in a region.
    /// Returns how many edges were taken.
    pub fn tick_all(&self, region: &RegionId, tick: u64) -> usize {
        self.registry
            .session_ids_in(region)
            .into_iter()
            .filter(|id| self.try_advance(*id, tick).is_some())
            .count()
    }
}

/// Uniformly shuffle the non-director participants and deal default roles:
/// first becomes SEEKER, the next up to two HIDER, the rest SUPPORT. The
/// director always stays DIRECTOR; spectators are untouched. Returns the
/// assignments made.
pub(crate) fn assign_default_roles(
    session: &mut Session,
    rng: &mut StdRng,
) -> Vec<(AgentId, Role)> {
    let mut others: Vec<AgentId> = session
        .participants
        .iter()
        .copied()
        .filter(|id| *id != session.director)
        .collect();
    others.sort();
    others.shuffle(rng);

    session.seeker = None;
    session.roles.insert(session.director, Role::Director);
    let mut assignments = vec![(session.director, Role::Director)];
    for (i, id) in others.iter().enumerate() {
        let role = match i {
            0 => {
                session.seeker = Some(*id);
                Role::Seeker
            }
            1 | 2 => Role::Hider,
            _ => Role::Support,
        };
        session.roles.insert(*id, role);
        assignments.push((*id, role));
    }
    assignments
}

/// Reset a session to WAITING outside the normal cycle (membership fell to
/// one participant, or the seeker guarantee failed unrecoverably).
/// Featured roles demote to SUPPORT, the seeker slot clears, and the
/// ledger is wiped when the session was mid-seek. Returns the events to
/// fan out.
pub(crate) fn force_waiting(session: &mut Session, tick: u64) -> Vec<SessionEvent> {
    if session.phase == Phase::Waiting {
        session.seeker = None;
        return Vec::new();
    }
    let from = session.phase;
    if from == Phase::Seek {
        session.ledger.clear_all();
    }
    let source = session
        .last_seeker
        .filter(|id| session.participants.contains(id))
        .unwrap_or(session.director);
    session.seeker = None;
    for role in session.roles.values_mut() {
        if matches!(role, Role::Seeker | Role::Hider) {
            *role = Role::Support;
        }
    }
    session.enter_phase(Phase::Waiting, tick);
    session.last_quirk = Some((QuirkKind::Shrug, tick));

    let view = session.view();
    vec![
        SessionEvent::PhaseChanged {
            session: session.id,
            view: view.clone(),
            from,
            to: Phase::Waiting,
        },
        SessionEvent::QuirkFired {
            session: session.id,
            view,
            source,
            quirk: QuirkKind::Shrug,
        },
    ]
}

/// Recompute the derived profile from the mean of member trait summaries,
/// falling back to the baseline when none are readable.
pub(crate) fn recompute_profile(
    session: &mut Session,
    directory: &dyn AgentDirectory,
    config: &CoordinatorConfig,
) {
    let summaries: Vec<TraitSummary> = session
        .participants
        .iter()
        .chain(session.spectators.iter())
        .filter_map(|id| directory.traits(*id))
        .collect();
    session.profile = TraitSummary::mean(summaries.iter())
        .map(|mean| SessionProfile::derive(&mean, config))
        .unwrap_or_else(|| SessionProfile::baseline(config));
}

/// RoleAssigned events for a batch of assignments, sharing one snapshot.
pub(crate) fn role_events(
    session: &Session,
    view: &SessionView,
    assignments: Vec<(AgentId, Role)>,
) -> Vec<SessionEvent> {
    assignments
        .into_iter()
        .map(|(agent, role)| SessionEvent::RoleAssigned {
            session: session.id,
            view: view.clone(),
            agent,
            role,
        })
        .collect()
}
