use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

use hs_core::{AgentDirectory, AgentId, RegionId, SessionId, TraitSummary, Vec3};

use crate::config::{CoordinatorConfig, SessionProfile};
use crate::event::{QuirkKind, SessionEvent};
use crate::hints::HideHint;
use crate::listener::ListenerHub;
use crate::machine;
use crate::session::{Phase, Role, Session, SessionView};

/// Owns the canonical session table and the participant→session reverse
/// index.
///
/// Every mutation of a given session happens under that session's own
/// mutex; the two top-level maps are the only structures arbitrary callers
/// touch concurrently. Callers only ever receive [`SessionView`]
/// snapshots, so no reader can observe a half-applied update. Validation
/// failures are silent by design: concurrent callers race routinely and a
/// losing call simply gets `None` or `false`.
pub struct SessionRegistry {
    config: CoordinatorConfig,
    directory: Arc<dyn AgentDirectory>,
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    index: DashMap<AgentId, SessionId>,
    hub: ListenerHub,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("indexed_members", &self.index.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create a registry over the given agent directory.
    pub fn new(config: CoordinatorConfig, directory: Arc<dyn AgentDirectory>) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(config.seed));
        Self {
            config,
            directory,
            sessions: DashMap::new(),
            index: DashMap::new(),
            hub: ListenerHub::new(),
            rng,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn directory(&self) -> &dyn AgentDirectory {
        self.directory.as_ref()
    }

    pub(crate) fn session_arc(&self, id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub(crate) fn session_ids_in(&self, region: &RegionId) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().lock().region == *region)
            .map(|entry| *entry.key())
            .collect()
    }

    pub(crate) fn hub(&self) -> &ListenerHub {
        &self.hub
    }

    pub(crate) fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.rng.lock())
    }

    pub(crate) fn index_remove(&self, agent: AgentId, session: SessionId) {
        self.index.remove_if(&agent, |_, indexed| *indexed == session);
    }

    /// Deliver a batch of events to a fixed recipient set, one at a time.
    pub(crate) fn dispatch(&self, recipients: &[AgentId], events: Vec<SessionEvent>) {
        for event in &events {
            self.hub.notify(recipients.iter().copied(), event);
        }
    }

    /// Create a session in `region` run by `director`.
    ///
    /// `proposed` is the full initial member list (the director is added
    /// if absent) and must reach the configured minimum. Members beyond
    /// participant capacity start as spectators; agents already enrolled
    /// elsewhere are skipped. The initial profile is derived from the
    /// aggregate of `traits`. Returns `None` when the director has no
    /// owning actor, is already enrolled, or the proposal is too small.
    pub fn create_session(
        &self,
        region: RegionId,
        director: AgentId,
        proposed: &[AgentId],
        traits: &HashMap<AgentId, TraitSummary>,
        tick: u64,
    ) -> Option<SessionView> {
        let owner = self.directory.owner(director)?;
        let mut members: Vec<AgentId> = vec![director];
        for &agent in proposed {
            if agent != director && !members.contains(&agent) {
                members.push(agent);
            }
        }
        if members.len() < self.config.min_proposed_members {
            return None;
        }
        if self.index.contains_key(&director) {
            return None;
        }

        let id = SessionId::new();
        let anchor = self.directory.position(director).unwrap_or(Vec3::default());
        let mut session = Session::new(
            id,
            region.clone(),
            owner,
            director,
            anchor,
            tick,
            &self.config,
        );

        let mut enrolled = vec![director];
        for &agent in members.iter().skip(1) {
            if self.index.contains_key(&agent) {
                continue;
            }
            if session.participants.len() < self.config.max_participants {
                session.add_participant(agent, Role::Support);
            } else {
                session.add_spectator(agent);
            }
            enrolled.push(agent);
        }

        let summaries: Vec<TraitSummary> =
            enrolled.iter().filter_map(|id| traits.get(id)).copied().collect();
        session.profile = TraitSummary::mean(summaries.iter())
            .map(|mean| SessionProfile::derive(&mean, &self.config))
            .unwrap_or_else(|| SessionProfile::baseline(&self.config));

        let view = session.view();
        let events: Vec<SessionEvent> = enrolled
            .iter()
            .map(|&agent| SessionEvent::RoleAssigned {
                session: id,
                view: view.clone(),
                agent,
                role: session.role_of(agent).unwrap_or(Role::Support),
            })
            .collect();

        for &agent in &enrolled {
            self.index.insert(agent, id);
        }
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        debug!(session = %id, %region, members = enrolled.len(), "session created");

        self.dispatch(&enrolled, events);
        Some(view)
    }

    /// Snapshot of the session an agent currently belongs to.
    pub fn find_session_for(&self, agent: AgentId) -> Option<SessionView> {
        let session = *self.index.get(&agent)?;
        let view = self.find_session(session)?;
        if !view.is_participant(agent) && !view.is_spectator(agent) {
            error!(%agent, %session, "reverse index references a session not containing the agent");
            return None;
        }
        Some(view)
    }

    /// Snapshot of a session by id.
    pub fn find_session(&self, session: SessionId) -> Option<SessionView> {
        let arc = self.session_arc(session)?;
        let guard = arc.lock();
        Some(guard.view())
    }

    /// First open, non-closing, under-capacity session owned by `owner`
    /// in `region`.
    pub fn find_joinable_session(&self, owner: AgentId, region: &RegionId) -> Option<SessionView> {
        for entry in self.sessions.iter() {
            let guard = entry.value().lock();
            if guard.closing || guard.owner != owner || guard.region != *region {
                continue;
            }
            if guard.phase.is_joinable() && guard.participants.len() < self.config.max_participants
            {
                return Some(guard.view());
            }
        }
        None
    }

    /// Join `candidate` to the session behind `target`.
    ///
    /// Re-validates that the session is still open and in the candidate's
    /// region. During joinable phases with capacity to spare the candidate
    /// becomes a SUPPORT participant; otherwise it is routed to spectator
    /// status rather than rejected. The candidate may be flagged a poor
    /// sport based on its trait summary.
    pub fn join_session(&self, candidate: AgentId, target: &SessionView) -> Option<SessionView> {
        if self.index.contains_key(&candidate) {
            return None;
        }
        let arc = self.session_arc(target.id)?;
        let (recipients, events, view) = {
            let mut session = arc.lock();
            if session.closing {
                return None;
            }
            if self.directory.region(candidate).as_ref() != Some(&session.region) {
                return None;
            }

            let role = if session.phase.is_joinable()
                && session.participants.len() < self.config.max_participants
            {
                session.add_participant(candidate, Role::Support);
                Role::Support
            } else {
                session.add_spectator(candidate);
                Role::Spectator
            };

            if let Some(traits) = self.directory.traits(candidate) {
                let chance = (self.config.poor_sport_chance_scale
                    * (1.0 - traits.social_charge))
                    .clamp(0.0, 1.0);
                if chance > 0.0 && self.with_rng(|rng| rng.random_bool(chance)) {
                    session.poor_sports.insert(candidate);
                }
            }

            machine::recompute_profile(&mut session, self.directory.as_ref(), &self.config);
            self.index.insert(candidate, session.id);

            let view = session.view();
            let events = vec![
                SessionEvent::MetricsUpdated {
                    session: session.id,
                    view: view.clone(),
                },
                SessionEvent::RoleAssigned {
                    session: session.id,
                    view: view.clone(),
                    agent: candidate,
                    role,
                },
            ];
            (members_of(&session), events, view)
        };
        self.dispatch(&recipients, events);
        Some(view)
    }

    /// Remove an agent from whatever session it belongs to.
    ///
    /// Purges its hints and betrayal memory, releases its listeners, and
    /// repairs the session around the hole: a departed seeker triggers
    /// role reassignment, one remaining participant forces WAITING, an
    /// empty or director-less session closes.
    pub fn leave_session(&self, agent: AgentId, tick: u64) {
        let Some((_, session_id)) = self.index.remove(&agent) else {
            return;
        };
        let Some(arc) = self.session_arc(session_id) else {
            return;
        };

        let mut close = false;
        let mut batch: Option<(Vec<AgentId>, Vec<SessionEvent>)> = None;
        {
            let mut session = arc.lock();
            if session.closing {
                return;
            }
            if !session.is_member(agent) {
                error!(%agent, session = %session_id, "reverse index references a session not containing the agent");
                return;
            }

            let was_seeker = session.seeker == Some(agent);
            let was_director = session.director == agent;
            session.remove_member(agent);
            session.ledger.clear_agent(agent);
            self.hub.unregister_all(agent);

            if was_director || session.member_count() == 0 {
                close = true;
            } else {
                let mut events = Vec::new();
                if session.participants.len() <= 1 {
                    events.extend(machine::force_waiting(&mut session, tick));
                } else if was_seeker && session.phase != Phase::Waiting {
                    let assignments =
                        self.with_rng(|rng| machine::assign_default_roles(&mut session, rng));
                    let view = session.view();
                    events.extend(machine::role_events(&session, &view, assignments));
                }
                machine::recompute_profile(&mut session, self.directory.as_ref(), &self.config);
                events.push(SessionEvent::MetricsUpdated {
                    session: session.id,
                    view: session.view(),
                });
                batch = Some((members_of(&session), events));
            }
        }

        if close {
            self.close_session(session_id);
        } else if let Some((recipients, events)) = batch {
            self.dispatch(&recipients, events);
        }
    }

    /// Record that `hider` was caught.
    ///
    /// When `seeker` is given it must currently hold SEEKER; the target
    /// must be a participant holding HIDER. On success the target becomes
    /// SUPPORT, its hints and memory are purged, and a pounce quirk fires.
    /// Returns `false` silently on any validation failure — capture races
    /// are routine, not exceptional.
    pub fn capture_hider(
        &self,
        session_id: SessionId,
        seeker: Option<AgentId>,
        hider: AgentId,
        tick: u64,
    ) -> bool {
        let Some(arc) = self.session_arc(session_id) else {
            return false;
        };
        let (recipients, events) = {
            let mut session = arc.lock();
            if session.closing {
                return false;
            }
            if let Some(seeker_id) = seeker
                && session.role_of(seeker_id) != Some(Role::Seeker)
            {
                return false;
            }
            if !session.participants.contains(&hider)
                || session.role_of(hider) != Some(Role::Hider)
            {
                return false;
            }

            session.roles.insert(hider, Role::Support);
            session.ledger.clear_agent(hider);

            let source = seeker.or(session.seeker).unwrap_or(session.director);
            session.last_quirk = Some((QuirkKind::Pounce, tick));

            let view = session.view();
            let events = vec![
                SessionEvent::RoleAssigned {
                    session: session_id,
                    view: view.clone(),
                    agent: hider,
                    role: Role::Support,
                },
                SessionEvent::MetricsUpdated {
                    session: session_id,
                    view: view.clone(),
                },
                SessionEvent::Captured {
                    session: session_id,
                    view: view.clone(),
                    seeker,
                    hider,
                },
                SessionEvent::QuirkFired {
                    session: session_id,
                    view,
                    source,
                    quirk: QuirkKind::Pounce,
                },
            ];
            (members_of(&session), events)
        };
        self.dispatch(&recipients, events);
        true
    }

    /// Close a session and tear it down.
    ///
    /// Idempotent: the removal from the primary table is the gate, so a
    /// second call for the same id is a no-op and `SessionClosed` fires
    /// exactly once, as the final event for that session.
    pub fn close_session(&self, session_id: SessionId) {
        let Some((_, arc)) = self.sessions.remove(&session_id) else {
            return;
        };
        let members = {
            let mut session = arc.lock();
            session.closing = true;
            let members = members_of(&session);
            for member in &members {
                self.index_remove(*member, session_id);
            }
            members
        };
        debug!(session = %session_id, members = members.len(), "session closed");
        self.dispatch(&members, vec![SessionEvent::SessionClosed {
            session: session_id,
        }]);
        for member in &members {
            self.hub.unregister_all(*member);
        }
    }

    /// Offer a soft positional hint about `target`.
    ///
    /// The reporter must be a current member and the target a participant
    /// holding HIDER; everything else is the ledger's acceptance policy.
    /// Returns whether the ledger changed.
    pub fn report_hint(
        &self,
        session_id: SessionId,
        reporter: AgentId,
        target: AgentId,
        position: Vec3,
        tick: u64,
    ) -> bool {
        let Some(arc) = self.session_arc(session_id) else {
            return false;
        };
        let (recipients, events) = {
            let mut session = arc.lock();
            if session.closing || !session.is_member(reporter) {
                return false;
            }
            if !session.participants.contains(&target)
                || session.role_of(target) != Some(Role::Hider)
            {
                return false;
            }
            if !session
                .ledger
                .offer_hint(target, reporter, position, tick, &self.config)
            {
                return false;
            }
            let view = session.view();
            let events = vec![SessionEvent::HintReported {
                session: session_id,
                view,
                target,
                betrayal: false,
            }];
            (members_of(&session), events)
        };
        self.dispatch(&recipients, events);
        true
    }

    /// Record one tick of unbroken sightline from a poor sport on a hider.
    /// Silently ignored for anyone not flagged, not enrolled, or watching
    /// a non-hider.
    pub fn note_sightline(
        &self,
        session_id: SessionId,
        reporter: AgentId,
        target: AgentId,
        tick: u64,
    ) {
        let Some(arc) = self.session_arc(session_id) else {
            return;
        };
        let mut session = arc.lock();
        if session.closing
            || !session.poor_sports.contains(&reporter)
            || session.role_of(target) != Some(Role::Hider)
        {
            return;
        }
        session
            .ledger
            .note_sightline(reporter, target, tick, &self.config);
    }

    /// Attempt to betray a hider's position.
    ///
    /// Actionable only during SEEK, by a poor sport holding SUPPORT or
    /// SPECTATOR, outside its cooldown, with accumulated motivation at or
    /// past the threshold. Success registers a high-priority betrayal
    /// hint, resets that (reporter, target) motivation, and starts the
    /// reporter's cooldown.
    pub fn attempt_betrayal(
        &self,
        session_id: SessionId,
        reporter: AgentId,
        target: AgentId,
        position: Vec3,
        tick: u64,
    ) -> bool {
        let Some(arc) = self.session_arc(session_id) else {
            return false;
        };
        let (recipients, events) = {
            let mut session = arc.lock();
            if session.closing || session.phase != Phase::Seek {
                return false;
            }
            if !session.poor_sports.contains(&reporter) {
                return false;
            }
            if !matches!(
                session.role_of(reporter),
                Some(Role::Support) | Some(Role::Spectator)
            ) {
                return false;
            }
            if !session.participants.contains(&target)
                || session.role_of(target) != Some(Role::Hider)
            {
                return false;
            }
            if session.ledger.in_cooldown(reporter, tick) {
                return false;
            }
            if session.ledger.motivation(reporter, target, tick, &self.config)
                < self.config.motivation_threshold
            {
                return false;
            }

            session
                .ledger
                .place_betrayal_hint(target, reporter, position, tick);
            session.ledger.reset_motivation(reporter, target, tick);
            session.ledger.start_cooldown(reporter, tick, &self.config);

            let view = session.view();
            let events = vec![SessionEvent::HintReported {
                session: session_id,
                view,
                target,
                betrayal: true,
            }];
            (members_of(&session), events)
        };
        self.dispatch(&recipients, events);
        true
    }

    /// The live hint for `target`, if any. Seeker heuristics poll this.
    pub fn hint_for(&self, session_id: SessionId, target: AgentId) -> Option<HideHint> {
        let arc = self.session_arc(session_id)?;
        let session = arc.lock();
        session.ledger.hint_for(target).copied()
    }

    /// Register a listener for one participant. Idempotent.
    pub fn register_listener(
        &self,
        agent: AgentId,
        listener: Arc<dyn crate::event::SessionListener>,
    ) {
        self.hub.register(agent, listener);
    }

    /// Remove one listener for one participant.
    pub fn unregister_listener(
        &self,
        agent: AgentId,
        listener: &Arc<dyn crate::event::SessionListener>,
    ) {
        self.hub.unregister(agent, listener);
    }

    /// Release every listener a departing participant registered.
    pub fn unregister_all_listeners(&self, agent: AgentId) {
        self.hub.unregister_all(agent);
    }
}

/// Current participants plus spectators, the fanout recipient set.
pub(crate) fn members_of(session: &Session) -> Vec<AgentId> {
    session
        .participants
        .iter()
        .chain(session.spectators.iter())
        .copied()
        .collect()
}
