use serde::{Deserialize, Serialize};

use hs_core::TraitSummary;

/// All coordinator tunables with play-tested defaults.
///
/// Every field is public; hosts either accept the defaults, chain the
/// `with_*` builders, or use struct-update syntax for the long tail.
/// Timing fields that feed [`SessionProfile`] derivation are expressed in
/// whole seconds and converted at `ticks_per_second`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// RNG seed for deterministic role shuffles and probability rolls.
    pub seed: u64,
    /// Simulation ticks per second. All tick-denominated fields assume it.
    pub ticks_per_second: u64,
    /// Maximum participants per session; overflow joins as spectators.
    pub max_participants: usize,
    /// Minimum proposed members (director included) to create a session.
    pub min_proposed_members: usize,
    /// Session lifetime in ticks from creation to expiry.
    pub session_duration_ticks: u64,
    /// Floor on session lifetime. Expiry is never earlier than
    /// creation + this.
    pub min_session_duration_ticks: u64,

    /// Joiner grace period bounds in seconds (low momentum waits longer).
    pub joiner_grace_secs: (u64, u64),
    /// Countdown length bounds in seconds.
    pub countdown_secs: (u64, u64),
    /// Seek phase timeout bounds in seconds (high stamina seeks longer).
    pub seek_timeout_secs: (u64, u64),
    /// Celebration length bounds in seconds.
    pub celebrate_secs: (u64, u64),

    /// Hints older than this many ticks are pruned.
    pub hint_stale_ticks: u64,
    /// Minimum ticks between accepted re-reports from the same reporter.
    pub hint_min_interval_ticks: u64,
    /// Minimum displacement (world units) that overrides the re-report
    /// interval.
    pub hint_min_displacement: f64,
    /// Reports within this many ticks of the reporter's last accepted hint
    /// are smoothed toward it.
    pub hint_smooth_window_ticks: u64,
    /// Smallest interpolation weight applied while smoothing.
    pub hint_smooth_floor: f64,
    /// Same-reporter, same-tick reports closer than this coalesce.
    pub hint_duplicate_epsilon: f64,

    /// Consecutive sightline ticks required before motivation accrues.
    pub sightline_window_ticks: u64,
    /// Motivation gained per sightline tick once the window is met.
    pub motivation_gain: f64,
    /// Motivation required for a betrayal to succeed.
    pub motivation_threshold: f64,
    /// Half-life of motivation decay, in ticks.
    pub motivation_half_life_ticks: u64,
    /// Memories older than this are additionally halved; older than twice
    /// this they are pruned outright.
    pub motivation_stale_ticks: u64,
    /// Motivation below this floor is treated as gone.
    pub motivation_floor: f64,
    /// Ticks a reporter is blocked from betraying again after success.
    pub betrayal_cooldown_ticks: u64,

    /// Anchor positions older than this are refreshed by the sweeper.
    pub anchor_stale_ticks: u64,
    /// Minimum ticks between ambient quirks in one session.
    pub quirk_cooldown_ticks: u64,
    /// Per-sweep chance of firing an ambient quirk.
    pub quirk_chance: f64,
    /// Poor-sport flag chance is this scale times (1 - social charge).
    pub poor_sport_chance_scale: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks_per_second: 20,
            max_participants: 10,
            min_proposed_members: 2,
            session_duration_ticks: 24_000,
            min_session_duration_ticks: 2_400,
            joiner_grace_secs: (5, 30),
            countdown_secs: (3, 15),
            seek_timeout_secs: (60, 300),
            celebrate_secs: (5, 20),
            hint_stale_ticks: 600,
            hint_min_interval_ticks: 40,
            hint_min_displacement: 1.5,
            hint_smooth_window_ticks: 10,
            hint_smooth_floor: 0.35,
            hint_duplicate_epsilon: 0.01,
            sightline_window_ticks: 40,
            motivation_gain: 0.05,
            motivation_threshold: 1.0,
            motivation_half_life_ticks: 400,
            motivation_stale_ticks: 600,
            motivation_floor: 0.01,
            betrayal_cooldown_ticks: 1_200,
            anchor_stale_ticks: 200,
            quirk_cooldown_ticks: 100,
            quirk_chance: 0.04,
            poor_sport_chance_scale: 0.35,
        }
    }
}

impl CoordinatorConfig {
    /// Set the RNG seed for deterministic shuffles and rolls.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the tick rate used when converting profile seconds to ticks.
    pub fn with_ticks_per_second(mut self, tps: u64) -> Self {
        self.ticks_per_second = tps;
        self
    }

    /// Set the participant capacity per session.
    pub fn with_max_participants(mut self, max: usize) -> Self {
        self.max_participants = max;
        self
    }

    /// Set the session lifetime in ticks.
    pub fn with_session_duration_ticks(mut self, ticks: u64) -> Self {
        self.session_duration_ticks = ticks;
        self
    }

    /// Set the per-sweep ambient quirk chance.
    pub fn with_quirk_chance(mut self, chance: f64) -> Self {
        self.quirk_chance = chance;
        self
    }

    /// Set the poor-sport flag probability scale.
    pub fn with_poor_sport_chance_scale(mut self, scale: f64) -> Self {
        self.poor_sport_chance_scale = scale;
        self
    }

    /// Expiry tick for a session created at `tick`.
    pub fn expiry_for(&self, tick: u64) -> u64 {
        tick + self
            .session_duration_ticks
            .max(self.min_session_duration_ticks)
    }
}

/// Per-session numeric tunables derived from member traits.
///
/// Recomputed from the arithmetic mean of member trait summaries whenever
/// membership changes; a session with no readable traits runs on
/// [`SessionProfile::baseline`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Ticks to linger in FORMATION so stragglers can join.
    pub joiner_grace_ticks: u64,
    /// Ticks of COUNTDOWN before the seek begins.
    pub countdown_ticks: u64,
    /// Ticks before an unfinished SEEK phase times out.
    pub seek_timeout_ticks: u64,
    /// Ticks spent in CELEBRATE between rounds.
    pub celebrate_ticks: u64,
    /// How far from the anchor members roam, in world units.
    pub roam_radius: f64,
}

impl SessionProfile {
    /// Derive a profile from a mean trait summary.
    ///
    /// Timing values are computed in whole seconds, clamped to the config
    /// bounds, then converted at the configured tick rate. Energetic
    /// groups wait less; social groups celebrate longer; high-stamina
    /// groups get longer seeks.
    pub fn derive(mean: &TraitSummary, config: &CoordinatorConfig) -> Self {
        let tps = config.ticks_per_second;
        Self {
            joiner_grace_ticks: span_secs(config.joiner_grace_secs, 1.0 - mean.momentum) * tps,
            countdown_ticks: span_secs(config.countdown_secs, 1.0 - mean.momentum) * tps,
            seek_timeout_ticks: span_secs(config.seek_timeout_secs, mean.stamina) * tps,
            celebrate_ticks: span_secs(config.celebrate_secs, mean.social_charge) * tps,
            roam_radius: 16.0 + 32.0 * mean.momentum,
        }
    }

    /// The profile a session falls back to when no traits are readable.
    pub fn baseline(config: &CoordinatorConfig) -> Self {
        Self::derive(&TraitSummary::default(), config)
    }
}

/// Whole-second interpolation across an inclusive `(lo, hi)` bound pair.
fn span_secs((lo, hi): (u64, u64), t: f64) -> u64 {
    let secs = lo as f64 + (hi.saturating_sub(lo)) as f64 * t.clamp(0.0, 1.0);
    (secs.round() as u64).clamp(lo, hi)
}
