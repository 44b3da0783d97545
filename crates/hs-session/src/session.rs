use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use hs_core::{AgentId, RegionId, SessionId, Vec3};

use crate::config::{CoordinatorConfig, SessionProfile};
use crate::event::QuirkKind;
use crate::hints::HintLedger;

/// The part an agent plays in a session. Assigned only by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Runs the game; always a participant while the session is open.
    Director,
    /// Hunts hiders during SEEK. At most one per session.
    Seeker,
    /// Hides from the seeker. At most two per round.
    Hider,
    /// Plays along without a featured part.
    Support,
    /// Watches from the sidelines; not a participant.
    Spectator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Director => write!(f, "director"),
            Self::Seeker => write!(f, "seeker"),
            Self::Hider => write!(f, "hider"),
            Self::Support => write!(f, "support"),
            Self::Spectator => write!(f, "spectator"),
        }
    }
}

/// Where a session is in its round cycle.
///
/// The graph is a strict cycle:
/// WAITING → FORMATION → COUNTDOWN → SEEK → CELEBRATE → WAITING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Gathering members; no round underway.
    Waiting,
    /// Roles assigned, lingering so stragglers can join.
    Formation,
    /// Hiders scatter while the seeker counts.
    Countdown,
    /// The seeker hunts.
    Seek,
    /// Round over, celebrating before the next.
    Celebrate,
}

impl Phase {
    /// The only phase this one may advance to.
    pub fn next(self) -> Phase {
        match self {
            Self::Waiting => Self::Formation,
            Self::Formation => Self::Countdown,
            Self::Countdown => Self::Seek,
            Self::Seek => Self::Celebrate,
            Self::Celebrate => Self::Waiting,
        }
    }

    /// Whether new participants may join during this phase.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting | Self::Formation | Self::Celebrate)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Formation => write!(f, "formation"),
            Self::Countdown => write!(f, "countdown"),
            Self::Seek => write!(f, "seek"),
            Self::Celebrate => write!(f, "celebrate"),
        }
    }
}

/// Canonical mutable state of one session.
///
/// Lives behind its own mutex inside the registry; nothing outside the
/// coordinator ever holds a reference. Every mutation path hands callers a
/// [`SessionView`] snapshot instead.
#[derive(Debug)]
pub struct Session {
    /// Unique session id.
    pub id: SessionId,
    /// World/region the session is anchored in.
    pub region: RegionId,
    /// The actor that owns the director.
    pub owner: AgentId,
    /// Directing participant. Invariant: a participant while open.
    pub director: AgentId,
    /// Current seeker, when one is assigned.
    pub seeker: Option<AgentId>,
    /// Seeker of the most recently finished round.
    pub last_seeker: Option<AgentId>,
    /// Current phase.
    pub phase: Phase,
    /// Tick at which the current phase was entered.
    pub phase_entered_tick: u64,
    /// Derived numeric tunables.
    pub profile: SessionProfile,
    /// Active players. Disjoint from `spectators`.
    pub participants: HashSet<AgentId>,
    /// Onlookers. Disjoint from `participants`.
    pub spectators: HashSet<AgentId>,
    /// Role per member (participants and spectators).
    pub roles: HashMap<AgentId, Role>,
    /// Members flagged as willing to betray hider positions.
    pub poor_sports: HashSet<AgentId>,
    /// Focal point for area-based behavior.
    pub anchor: Vec3,
    /// Tick the anchor was last refreshed.
    pub anchor_tick: u64,
    /// Completed rounds.
    pub rounds_completed: u32,
    /// Creation tick.
    pub created_tick: u64,
    /// Tick after which the sweeper expires the session.
    pub expiry_tick: u64,
    /// Terminal flag; once set only teardown may touch the session.
    pub closing: bool,
    /// Most recent ambient quirk and when it fired.
    pub last_quirk: Option<(QuirkKind, u64)>,
    /// Positional hints and betrayal memory for this session.
    pub ledger: HintLedger,
}

impl Session {
    /// Create a fresh WAITING session with only its director enrolled.
    pub fn new(
        id: SessionId,
        region: RegionId,
        owner: AgentId,
        director: AgentId,
        anchor: Vec3,
        tick: u64,
        config: &CoordinatorConfig,
    ) -> Self {
        let mut participants = HashSet::new();
        participants.insert(director);
        let mut roles = HashMap::new();
        roles.insert(director, Role::Director);
        Self {
            id,
            region,
            owner,
            director,
            seeker: None,
            last_seeker: None,
            phase: Phase::Waiting,
            phase_entered_tick: tick,
            profile: SessionProfile::baseline(config),
            participants,
            spectators: HashSet::new(),
            roles,
            poor_sports: HashSet::new(),
            anchor,
            anchor_tick: tick,
            rounds_completed: 0,
            created_tick: tick,
            expiry_tick: config.expiry_for(tick),
            closing: false,
            last_quirk: None,
            ledger: HintLedger::default(),
        }
    }

    /// Participants plus spectators.
    pub fn member_count(&self) -> usize {
        self.participants.len() + self.spectators.len()
    }

    /// Whether the agent is enrolled at all.
    pub fn is_member(&self, id: AgentId) -> bool {
        self.participants.contains(&id) || self.spectators.contains(&id)
    }

    /// Current role, if the agent is enrolled.
    pub fn role_of(&self, id: AgentId) -> Option<Role> {
        self.roles.get(&id).copied()
    }

    /// Members currently holding [`Role::Hider`].
    pub fn hiders(&self) -> Vec<AgentId> {
        let mut out: Vec<AgentId> = self
            .roles
            .iter()
            .filter(|(_, r)| **r == Role::Hider)
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }

    /// Number of members currently holding [`Role::Hider`].
    pub fn hider_count(&self) -> usize {
        self.roles.values().filter(|r| **r == Role::Hider).count()
    }

    /// Ticks spent in the current phase.
    pub fn elapsed_in_phase(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.phase_entered_tick)
    }

    /// Enroll an agent as a participant with the given role, removing any
    /// spectator standing first so the sets stay disjoint.
    pub fn add_participant(&mut self, id: AgentId, role: Role) {
        self.spectators.remove(&id);
        self.participants.insert(id);
        self.roles.insert(id, role);
    }

    /// Enroll an agent as a spectator, removing any participant standing
    /// first so the sets stay disjoint.
    pub fn add_spectator(&mut self, id: AgentId) {
        self.participants.remove(&id);
        self.spectators.insert(id);
        self.roles.insert(id, Role::Spectator);
    }

    /// Remove an agent from every membership structure. Returns whether it
    /// was enrolled.
    pub fn remove_member(&mut self, id: AgentId) -> bool {
        let was = self.participants.remove(&id) | self.spectators.remove(&id);
        self.roles.remove(&id);
        self.poor_sports.remove(&id);
        if self.seeker == Some(id) {
            self.seeker = None;
        }
        was
    }

    /// Enter `phase` at `tick`.
    pub fn enter_phase(&mut self, phase: Phase, tick: u64) {
        self.phase = phase;
        self.phase_entered_tick = tick;
    }

    /// Build an immutable snapshot of the current state.
    pub fn view(&self) -> SessionView {
        let mut participants: Vec<AgentId> = self.participants.iter().copied().collect();
        participants.sort();
        let mut spectators: Vec<AgentId> = self.spectators.iter().copied().collect();
        spectators.sort();
        let mut poor_sports: Vec<AgentId> = self.poor_sports.iter().copied().collect();
        poor_sports.sort();
        SessionView {
            id: self.id,
            region: self.region.clone(),
            owner: self.owner,
            director: self.director,
            seeker: self.seeker,
            phase: self.phase,
            profile: self.profile,
            participants,
            spectators,
            roles: self.roles.clone(),
            poor_sports,
            anchor: self.anchor,
            anchor_tick: self.anchor_tick,
            rounds_completed: self.rounds_completed,
            created_tick: self.created_tick,
            expiry_tick: self.expiry_tick,
            closing: self.closing,
        }
    }
}

/// Immutable snapshot of a session.
///
/// Defensively copied on construction and never mutated afterwards; safe to
/// hand to any number of concurrent readers. Member vectors are sorted so
/// equal states produce equal views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    /// Session id.
    pub id: SessionId,
    /// World/region key.
    pub region: RegionId,
    /// Owning actor of the director.
    pub owner: AgentId,
    /// Directing participant.
    pub director: AgentId,
    /// Current seeker, if assigned.
    pub seeker: Option<AgentId>,
    /// Phase at snapshot time.
    pub phase: Phase,
    /// Derived tunables at snapshot time.
    pub profile: SessionProfile,
    /// Sorted participant ids.
    pub participants: Vec<AgentId>,
    /// Sorted spectator ids.
    pub spectators: Vec<AgentId>,
    /// Role per member.
    pub roles: HashMap<AgentId, Role>,
    /// Sorted ids of members flagged poor sports.
    pub poor_sports: Vec<AgentId>,
    /// Focal anchor position.
    pub anchor: Vec3,
    /// Tick the anchor was last refreshed.
    pub anchor_tick: u64,
    /// Completed rounds.
    pub rounds_completed: u32,
    /// Creation tick.
    pub created_tick: u64,
    /// Expiry tick.
    pub expiry_tick: u64,
    /// Whether teardown had begun at snapshot time.
    pub closing: bool,
}

impl SessionView {
    /// Participants plus spectators.
    pub fn member_count(&self) -> usize {
        self.participants.len() + self.spectators.len()
    }

    /// Whether the agent was a participant at snapshot time.
    pub fn is_participant(&self, id: AgentId) -> bool {
        self.participants.binary_search(&id).is_ok()
    }

    /// Whether the agent was a spectator at snapshot time.
    pub fn is_spectator(&self, id: AgentId) -> bool {
        self.spectators.binary_search(&id).is_ok()
    }

    /// Role the agent held at snapshot time.
    pub fn role_of(&self, id: AgentId) -> Option<Role> {
        self.roles.get(&id).copied()
    }

    /// Number of members holding [`Role::Hider`] at snapshot time.
    pub fn hider_count(&self) -> usize {
        self.roles.values().filter(|r| **r == Role::Hider).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Session {
        Session::new(
            SessionId::new(),
            RegionId::new("overworld"),
            AgentId::new(),
            AgentId::new(),
            Vec3::default(),
            100,
            &CoordinatorConfig::default(),
        )
    }

    #[test]
    fn phase_cycle_is_closed() {
        let mut phase = Phase::Waiting;
        for _ in 0..5 {
            phase = phase.next();
        }
        assert_eq!(phase, Phase::Waiting);
    }

    #[test]
    fn joinable_phases() {
        assert!(Phase::Waiting.is_joinable());
        assert!(Phase::Formation.is_joinable());
        assert!(Phase::Celebrate.is_joinable());
        assert!(!Phase::Countdown.is_joinable());
        assert!(!Phase::Seek.is_joinable());
    }

    #[test]
    fn new_session_enrolls_director() {
        let s = fresh();
        assert!(s.participants.contains(&s.director));
        assert_eq!(s.role_of(s.director), Some(Role::Director));
        assert_eq!(s.phase, Phase::Waiting);
        assert!(s.expiry_tick >= s.created_tick + 2_400);
    }

    #[test]
    fn membership_sets_stay_disjoint() {
        let mut s = fresh();
        let id = AgentId::new();
        s.add_spectator(id);
        assert!(s.spectators.contains(&id));
        s.add_participant(id, Role::Support);
        assert!(!s.spectators.contains(&id));
        assert!(s.participants.contains(&id));
        s.add_spectator(id);
        assert!(!s.participants.contains(&id));
    }

    #[test]
    fn remove_member_clears_seeker() {
        let mut s = fresh();
        let id = AgentId::new();
        s.add_participant(id, Role::Seeker);
        s.seeker = Some(id);
        assert!(s.remove_member(id));
        assert!(s.seeker.is_none());
        assert!(s.role_of(id).is_none());
        assert!(!s.remove_member(id));
    }

    #[test]
    fn view_is_detached_from_session() {
        let mut s = fresh();
        let view = s.view();
        s.add_participant(AgentId::new(), Role::Support);
        s.enter_phase(Phase::Formation, 200);
        assert_eq!(view.phase, Phase::Waiting);
        assert_eq!(view.participants.len(), 1);
    }

    #[test]
    fn view_membership_queries() {
        let mut s = fresh();
        let p = AgentId::new();
        let w = AgentId::new();
        s.add_participant(p, Role::Support);
        s.add_spectator(w);
        let view = s.view();
        assert!(view.is_participant(p));
        assert!(!view.is_spectator(p));
        assert!(view.is_spectator(w));
        assert_eq!(view.member_count(), 3);
    }
}
