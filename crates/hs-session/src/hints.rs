use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

use hs_core::{AgentId, Vec3};

use crate::config::CoordinatorConfig;

/// A positional hint about one hidden target.
///
/// At most one live hint exists per target; newer reports replace older
/// ones subject to the betrayal tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HideHint {
    /// Reported (possibly smoothed) position.
    pub position: Vec3,
    /// Who reported it. `None` for system-placed hints.
    pub reporter: Option<AgentId>,
    /// Tick the report was recorded.
    pub tick: u64,
    /// Whether this is a high-priority betrayal hint.
    pub betrayal: bool,
}

/// What last touched a betrayal memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Motivation accrued from an unbroken sightline.
    Sightline,
    /// Motivation was reset after a successful betrayal.
    Reset,
}

/// Decaying betrayal motivation for one (reporter, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetrayalMemory {
    /// Motivation as of `updated_tick`; read it through
    /// [`HintLedger::motivation`] to get the decayed value.
    pub motivation: f64,
    /// Tick the stored motivation was last recomputed.
    pub updated_tick: u64,
    /// Last tick the reporter had the target in sight.
    pub last_seen_tick: u64,
    /// First tick of the current unbroken sightline streak.
    pub streak_start: u64,
    /// What last touched this memory.
    pub last_trigger: TriggerKind,
}

/// Per-session store of hide hints and betrayal-motivation memory.
///
/// Pure data plus decay math. Session semantics (membership, roles, phase,
/// cooldown policy decisions) are validated by the registry before any of
/// these methods are called.
#[derive(Debug, Default)]
pub struct HintLedger {
    hints: HashMap<AgentId, HideHint>,
    memory: HashMap<(AgentId, AgentId), BetrayalMemory>,
    reporter_last: HashMap<AgentId, (Vec3, u64)>,
    cooldown_until: HashMap<AgentId, u64>,
}

/// Half-life decay of a stored motivation value, with the additional
/// halving applied to memories older than the staleness window.
fn decayed(motivation: f64, updated_tick: u64, tick: u64, config: &CoordinatorConfig) -> f64 {
    let age = tick.saturating_sub(updated_tick);
    let half_life = config.motivation_half_life_ticks.max(1) as f64;
    let mut m = motivation * 0.5f64.powf(age as f64 / half_life);
    if age > config.motivation_stale_ticks {
        m *= 0.5;
    }
    m
}

impl HintLedger {
    /// Offer a soft hint about `target`.
    ///
    /// Rejected unless the reporter has no recent accepted hint within the
    /// minimum re-report interval, or moved at least the minimum
    /// displacement since its last. Accepted positions very close in time
    /// to the reporter's previous hint are smoothed toward it with a
    /// floored interpolation weight to damp per-tick jitter. A non-betrayal
    /// hint never replaces a newer-or-equal betrayal hint, and a
    /// same-reporter same-tick near-duplicate coalesces into the stored
    /// update. Returns whether the ledger changed.
    pub fn offer_hint(
        &mut self,
        target: AgentId,
        reporter: AgentId,
        position: Vec3,
        tick: u64,
        config: &CoordinatorConfig,
    ) -> bool {
        let accepted = match self.reporter_last.get(&reporter) {
            None => true,
            Some((last_pos, last_tick)) => {
                tick.saturating_sub(*last_tick) >= config.hint_min_interval_ticks
                    || position.distance(last_pos) >= config.hint_min_displacement
            }
        };
        if !accepted {
            return false;
        }

        let smoothed = match self.reporter_last.get(&reporter) {
            Some((last_pos, last_tick))
                if tick.saturating_sub(*last_tick) <= config.hint_smooth_window_ticks =>
            {
                let window = config.hint_smooth_window_ticks.max(1) as f64;
                let w = (tick.saturating_sub(*last_tick) as f64 / window)
                    .clamp(config.hint_smooth_floor, 1.0);
                last_pos.lerp(&position, w)
            }
            _ => position,
        };

        if let Some(existing) = self.hints.get(&target) {
            if existing.betrayal && existing.tick >= tick {
                return false;
            }
            if existing.reporter == Some(reporter)
                && existing.tick == tick
                && existing.position.distance(&smoothed) <= config.hint_duplicate_epsilon
            {
                return false;
            }
        }

        self.hints.insert(
            target,
            HideHint {
                position: smoothed,
                reporter: Some(reporter),
                tick,
                betrayal: false,
            },
        );
        // Raw position, so displacement checks compare real movement.
        self.reporter_last.insert(reporter, (position, tick));
        true
    }

    /// Store a high-priority betrayal hint unconditionally.
    pub fn place_betrayal_hint(
        &mut self,
        target: AgentId,
        reporter: AgentId,
        position: Vec3,
        tick: u64,
    ) {
        self.hints.insert(
            target,
            HideHint {
                position,
                reporter: Some(reporter),
                tick,
                betrayal: true,
            },
        );
        self.reporter_last.insert(reporter, (position, tick));
    }

    /// The live hint for `target`, if any.
    pub fn hint_for(&self, target: AgentId) -> Option<&HideHint> {
        self.hints.get(&target)
    }

    /// Number of live hints.
    pub fn hint_count(&self) -> usize {
        self.hints.len()
    }

    /// Record one tick of unbroken sightline from `reporter` on `target`.
    ///
    /// A gap of more than one tick restarts the streak; motivation only
    /// accrues once the streak has lasted the configured window, and at
    /// most once per tick. Stored motivation is decayed before accrual.
    pub fn note_sightline(
        &mut self,
        reporter: AgentId,
        target: AgentId,
        tick: u64,
        config: &CoordinatorConfig,
    ) {
        match self.memory.entry((reporter, target)) {
            Entry::Vacant(vacant) => {
                let mut fresh = BetrayalMemory {
                    motivation: 0.0,
                    updated_tick: tick,
                    last_seen_tick: tick,
                    streak_start: tick,
                    last_trigger: TriggerKind::Sightline,
                };
                if config.sightline_window_ticks == 0 {
                    fresh.motivation = config.motivation_gain;
                }
                vacant.insert(fresh);
            }
            Entry::Occupied(mut occupied) => {
                let m = occupied.get_mut();
                // At most one accrual per tick.
                if tick <= m.last_seen_tick {
                    return;
                }
                if tick > m.last_seen_tick + 1 {
                    m.streak_start = tick;
                }
                m.motivation = decayed(m.motivation, m.updated_tick, tick, config);
                if tick.saturating_sub(m.streak_start) >= config.sightline_window_ticks {
                    m.motivation += config.motivation_gain;
                }
                m.updated_tick = tick;
                m.last_seen_tick = tick;
                m.last_trigger = TriggerKind::Sightline;
            }
        }
    }

    /// Decayed motivation of `reporter` toward betraying `target`.
    pub fn motivation(
        &self,
        reporter: AgentId,
        target: AgentId,
        tick: u64,
        config: &CoordinatorConfig,
    ) -> f64 {
        self.memory
            .get(&(reporter, target))
            .map(|m| decayed(m.motivation, m.updated_tick, tick, config))
            .unwrap_or(0.0)
    }

    /// Zero out one (reporter, target) motivation after a betrayal.
    pub fn reset_motivation(&mut self, reporter: AgentId, target: AgentId, tick: u64) {
        if let Some(m) = self.memory.get_mut(&(reporter, target)) {
            m.motivation = 0.0;
            m.updated_tick = tick;
            m.streak_start = tick;
            m.last_trigger = TriggerKind::Reset;
        }
    }

    /// Whether the reporter is still inside its betrayal cooldown.
    pub fn in_cooldown(&self, reporter: AgentId, tick: u64) -> bool {
        self.cooldown_until
            .get(&reporter)
            .is_some_and(|until| tick < *until)
    }

    /// Start the reporter's betrayal cooldown at `tick`.
    pub fn start_cooldown(&mut self, reporter: AgentId, tick: u64, config: &CoordinatorConfig) {
        self.cooldown_until
            .insert(reporter, tick + config.betrayal_cooldown_ticks);
    }

    /// Purge everything a departing member contributed or is targeted by.
    pub fn clear_agent(&mut self, id: AgentId) {
        self.hints
            .retain(|target, hint| *target != id && hint.reporter != Some(id));
        self.memory
            .retain(|(reporter, target), _| *reporter != id && *target != id);
        self.reporter_last.remove(&id);
        self.cooldown_until.remove(&id);
    }

    /// Drop all hints and betrayal memory. Reporter cooldowns survive so a
    /// betrayer cannot immediately re-betray in the next round.
    pub fn clear_all(&mut self) {
        self.hints.clear();
        self.memory.clear();
        self.reporter_last.clear();
    }

    /// Drop hints older than the staleness window and memories decayed
    /// below the negligible floor or aged past twice the staleness window.
    /// Returns (hints pruned, memories pruned).
    pub fn prune(&mut self, tick: u64, config: &CoordinatorConfig) -> (usize, usize) {
        let hints_before = self.hints.len();
        self.hints
            .retain(|_, hint| tick.saturating_sub(hint.tick) <= config.hint_stale_ticks);

        let memory_before = self.memory.len();
        self.memory.retain(|_, m| {
            let age = tick.saturating_sub(m.updated_tick);
            age <= config.motivation_stale_ticks * 2
                && decayed(m.motivation, m.updated_tick, tick, config) >= config.motivation_floor
        });

        self.cooldown_until.retain(|_, until| tick < *until);
        self.reporter_last
            .retain(|_, (_, t)| tick.saturating_sub(*t) <= config.hint_stale_ticks);

        (
            hints_before - self.hints.len(),
            memory_before - self.memory.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig::default()
    }

    #[test]
    fn first_hint_is_accepted_verbatim() {
        let mut ledger = HintLedger::default();
        let (target, reporter) = (AgentId::new(), AgentId::new());
        let pos = Vec3::new(10.0, 64.0, -3.0);
        assert!(ledger.offer_hint(target, reporter, pos, 100, &config()));
        let hint = ledger.hint_for(target).unwrap();
        assert_eq!(hint.position, pos);
        assert!(!hint.betrayal);
        assert_eq!(hint.reporter, Some(reporter));
    }

    #[test]
    fn rapid_rereport_without_movement_is_rejected() {
        let mut ledger = HintLedger::default();
        let (target, reporter) = (AgentId::new(), AgentId::new());
        let pos = Vec3::new(10.0, 64.0, -3.0);
        assert!(ledger.offer_hint(target, reporter, pos, 100, &config()));
        // Within interval, barely moved: coalesces to the stored update.
        let nudged = Vec3::new(10.2, 64.0, -3.0);
        assert!(!ledger.offer_hint(target, reporter, nudged, 105, &config()));
        assert_eq!(ledger.hint_count(), 1);
        assert_eq!(ledger.hint_for(target).unwrap().tick, 100);
    }

    #[test]
    fn large_displacement_overrides_interval_and_smooths() {
        let cfg = config();
        let mut ledger = HintLedger::default();
        let (target, reporter) = (AgentId::new(), AgentId::new());
        let first = Vec3::new(0.0, 0.0, 0.0);
        let second = Vec3::new(10.0, 0.0, 0.0);
        assert!(ledger.offer_hint(target, reporter, first, 100, &cfg));
        // 4 ticks later, inside the smooth window: weight 4/10 = 0.4.
        assert!(ledger.offer_hint(target, reporter, second, 104, &cfg));
        let hint = ledger.hint_for(target).unwrap();
        assert!((hint.position.x - 4.0).abs() < 1e-9);
    }

    #[test]
    fn smoothing_weight_never_drops_below_floor() {
        let cfg = config();
        let mut ledger = HintLedger::default();
        let (target, reporter) = (AgentId::new(), AgentId::new());
        assert!(ledger.offer_hint(target, reporter, Vec3::default(), 100, &cfg));
        // 1 tick later: raw weight 0.1 would be floored to 0.35.
        assert!(ledger.offer_hint(target, reporter, Vec3::new(10.0, 0.0, 0.0), 101, &cfg));
        let hint = ledger.hint_for(target).unwrap();
        assert!((hint.position.x - 3.5).abs() < 1e-9);
    }

    #[test]
    fn soft_hint_never_overwrites_newer_betrayal() {
        let cfg = config();
        let mut ledger = HintLedger::default();
        let (target, snitch, reporter) = (AgentId::new(), AgentId::new(), AgentId::new());
        ledger.place_betrayal_hint(target, snitch, Vec3::new(1.0, 2.0, 3.0), 200);
        assert!(!ledger.offer_hint(target, reporter, Vec3::new(9.0, 9.0, 9.0), 150, &cfg));
        assert!(!ledger.offer_hint(target, reporter, Vec3::new(9.0, 9.0, 9.0), 200, &cfg));
        assert!(ledger.hint_for(target).unwrap().betrayal);
        // A strictly newer soft hint may replace it.
        assert!(ledger.offer_hint(target, reporter, Vec3::new(9.0, 9.0, 9.0), 300, &cfg));
        assert!(!ledger.hint_for(target).unwrap().betrayal);
    }

    #[test]
    fn motivation_accrues_only_past_the_window() {
        let mut cfg = config();
        cfg.sightline_window_ticks = 5;
        cfg.motivation_gain = 0.1;
        let mut ledger = HintLedger::default();
        let (reporter, target) = (AgentId::new(), AgentId::new());
        for tick in 0..5 {
            ledger.note_sightline(reporter, target, tick, &cfg);
        }
        assert!(ledger.motivation(reporter, target, 4, &cfg) < 1e-9);
        ledger.note_sightline(reporter, target, 5, &cfg);
        assert!(ledger.motivation(reporter, target, 5, &cfg) > 0.09);
    }

    #[test]
    fn sightline_gap_restarts_streak() {
        let mut cfg = config();
        cfg.sightline_window_ticks = 3;
        cfg.motivation_gain = 0.1;
        let mut ledger = HintLedger::default();
        let (reporter, target) = (AgentId::new(), AgentId::new());
        for tick in 0..4 {
            ledger.note_sightline(reporter, target, tick, &cfg);
        }
        let before = ledger.motivation(reporter, target, 3, &cfg);
        assert!(before > 0.0);
        // Break the sightline, then look again: streak must rebuild.
        ledger.note_sightline(reporter, target, 10, &cfg);
        ledger.note_sightline(reporter, target, 11, &cfg);
        let after = ledger.motivation(reporter, target, 11, &cfg);
        assert!(after <= before, "no accrual while rebuilding the streak");
    }

    #[test]
    fn motivation_halves_per_half_life() {
        let mut cfg = config();
        cfg.sightline_window_ticks = 0;
        cfg.motivation_gain = 0.8;
        cfg.motivation_half_life_ticks = 100;
        let mut ledger = HintLedger::default();
        let (reporter, target) = (AgentId::new(), AgentId::new());
        ledger.note_sightline(reporter, target, 0, &cfg);
        let fresh = ledger.motivation(reporter, target, 0, &cfg);
        assert!((fresh - 0.8).abs() < 1e-9);
        let one_half_life = ledger.motivation(reporter, target, 100, &cfg);
        assert!((one_half_life - 0.4).abs() < 1e-9);
    }

    #[test]
    fn stale_motivation_is_additionally_halved() {
        let mut cfg = config();
        cfg.sightline_window_ticks = 0;
        cfg.motivation_gain = 1.0;
        cfg.motivation_half_life_ticks = 1_000_000;
        cfg.motivation_stale_ticks = 50;
        let mut ledger = HintLedger::default();
        let (reporter, target) = (AgentId::new(), AgentId::new());
        ledger.note_sightline(reporter, target, 0, &cfg);
        let young = ledger.motivation(reporter, target, 50, &cfg);
        let stale = ledger.motivation(reporter, target, 51, &cfg);
        assert!(stale < young * 0.51);
    }

    #[test]
    fn cooldown_blocks_until_expiry() {
        let cfg = config();
        let mut ledger = HintLedger::default();
        let reporter = AgentId::new();
        assert!(!ledger.in_cooldown(reporter, 0));
        ledger.start_cooldown(reporter, 100, &cfg);
        assert!(ledger.in_cooldown(reporter, 100));
        assert!(ledger.in_cooldown(reporter, 100 + cfg.betrayal_cooldown_ticks - 1));
        assert!(!ledger.in_cooldown(reporter, 100 + cfg.betrayal_cooldown_ticks));
    }

    #[test]
    fn clear_agent_purges_both_sides() {
        let cfg = config();
        let mut ledger = HintLedger::default();
        let (a, b, c) = (AgentId::new(), AgentId::new(), AgentId::new());
        assert!(ledger.offer_hint(b, a, Vec3::default(), 0, &cfg));
        assert!(ledger.offer_hint(a, c, Vec3::default(), 0, &cfg));
        ledger.note_sightline(a, b, 0, &cfg);
        ledger.note_sightline(c, a, 0, &cfg);
        ledger.clear_agent(a);
        assert_eq!(ledger.hint_count(), 0);
        assert!(ledger.motivation(a, b, 0, &cfg) < 1e-12);
        assert!(ledger.motivation(c, a, 0, &cfg) < 1e-12);
    }

    #[test]
    fn prune_drops_stale_hints_and_negligible_memory() {
        let mut cfg = config();
        cfg.hint_stale_ticks = 100;
        cfg.sightline_window_ticks = 0;
        cfg.motivation_gain = 0.5;
        cfg.motivation_half_life_ticks = 10;
        let mut ledger = HintLedger::default();
        let (target, reporter) = (AgentId::new(), AgentId::new());
        assert!(ledger.offer_hint(target, reporter, Vec3::default(), 0, &cfg));
        ledger.note_sightline(reporter, target, 0, &cfg);

        let (hints, memories) = ledger.prune(50, &cfg);
        assert_eq!((hints, memories), (0, 0));

        // Far past staleness: the hint drops, and the memory has decayed
        // to nothing.
        let (hints, memories) = ledger.prune(500, &cfg);
        assert_eq!(hints, 1);
        assert_eq!(memories, 1);
        assert!(ledger.hint_for(target).is_none());
    }
}
