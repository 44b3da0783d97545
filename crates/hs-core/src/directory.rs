use dashmap::DashMap;

use crate::geom::Vec3;
use crate::ids::{AgentId, RegionId};
use crate::traits::TraitSummary;

/// How the session coordinator observes the simulated world.
///
/// Implementations are expected to be cheap and callable from any thread;
/// the coordinator queries liveness and positions on every maintenance
/// sweep. Agents the directory does not know about are treated as dead.
pub trait AgentDirectory: Send + Sync {
    /// Whether the agent currently exists and is alive.
    fn is_alive(&self, id: AgentId) -> bool;

    /// Current world position, if the agent exists.
    fn position(&self, id: AgentId) -> Option<Vec3>;

    /// Region the agent currently occupies, if it exists.
    fn region(&self, id: AgentId) -> Option<RegionId>;

    /// The actor that owns this agent, if any. Sessions require an owner.
    fn owner(&self, id: AgentId) -> Option<AgentId>;

    /// Behavioral trait summary, if the agent exists.
    fn traits(&self, id: AgentId) -> Option<TraitSummary>;
}

/// One directory record for a [`StaticDirectory`].
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Whether the agent is alive.
    pub alive: bool,
    /// Current world position.
    pub position: Vec3,
    /// Region the agent occupies.
    pub region: RegionId,
    /// Owning actor, if any.
    pub owner: Option<AgentId>,
    /// Behavioral traits.
    pub traits: TraitSummary,
}

/// Table-backed [`AgentDirectory`] for tests and embedding hosts that keep
/// their own agent state elsewhere. Safe for concurrent mutation.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: DashMap<AgentId, AgentRecord>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent record.
    pub fn upsert(&self, id: AgentId, record: AgentRecord) {
        self.records.insert(id, record);
    }

    /// Register a living agent with default traits and an owner.
    pub fn add_agent(&self, id: AgentId, region: RegionId, position: Vec3, owner: AgentId) {
        self.upsert(
            id,
            AgentRecord {
                alive: true,
                position,
                region,
                owner: Some(owner),
                traits: TraitSummary::default(),
            },
        );
    }

    /// Mark an agent dead, keeping its record.
    pub fn kill(&self, id: AgentId) {
        if let Some(mut rec) = self.records.get_mut(&id) {
            rec.alive = false;
        }
    }

    /// Remove an agent record entirely.
    pub fn remove(&self, id: AgentId) {
        self.records.remove(&id);
    }

    /// Move an agent to a new position.
    pub fn set_position(&self, id: AgentId, position: Vec3) {
        if let Some(mut rec) = self.records.get_mut(&id) {
            rec.position = position;
        }
    }

    /// Replace an agent's trait summary.
    pub fn set_traits(&self, id: AgentId, traits: TraitSummary) {
        if let Some(mut rec) = self.records.get_mut(&id) {
            rec.traits = traits;
        }
    }
}

impl AgentDirectory for StaticDirectory {
    fn is_alive(&self, id: AgentId) -> bool {
        self.records.get(&id).is_some_and(|r| r.alive)
    }

    fn position(&self, id: AgentId) -> Option<Vec3> {
        self.records.get(&id).map(|r| r.position)
    }

    fn region(&self, id: AgentId) -> Option<RegionId> {
        self.records.get(&id).map(|r| r.region.clone())
    }

    fn owner(&self, id: AgentId) -> Option<AgentId> {
        self.records.get(&id).and_then(|r| r.owner)
    }

    fn traits(&self, id: AgentId) -> Option<TraitSummary> {
        self.records.get(&id).map(|r| r.traits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_is_dead() {
        let dir = StaticDirectory::new();
        assert!(!dir.is_alive(AgentId::new()));
        assert!(dir.position(AgentId::new()).is_none());
    }

    #[test]
    fn add_kill_remove_lifecycle() {
        let dir = StaticDirectory::new();
        let id = AgentId::new();
        let owner = AgentId::new();
        dir.add_agent(id, RegionId::new("overworld"), Vec3::default(), owner);
        assert!(dir.is_alive(id));
        assert_eq!(dir.owner(id), Some(owner));

        dir.kill(id);
        assert!(!dir.is_alive(id));
        assert!(dir.position(id).is_some());

        dir.remove(id);
        assert!(dir.position(id).is_none());
    }

    #[test]
    fn set_position_updates_record() {
        let dir = StaticDirectory::new();
        let id = AgentId::new();
        dir.add_agent(
            id,
            RegionId::new("overworld"),
            Vec3::default(),
            AgentId::new(),
        );
        dir.set_position(id, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(dir.position(id), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
