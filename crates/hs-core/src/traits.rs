use serde::{Deserialize, Serialize};

/// Behavioral trait summary for one agent. Each value is 0.0..=1.0.
///
/// The coordinator never inspects raw agent behavior; it derives session
/// tunables from the arithmetic mean of member summaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitSummary {
    /// How energetically the agent moves. High momentum shortens waits.
    pub momentum: f64,
    /// How much the agent seeks out others. High charge lengthens play.
    pub social_charge: f64,
    /// How long the agent keeps going before tiring.
    pub stamina: f64,
}

impl Default for TraitSummary {
    fn default() -> Self {
        Self {
            momentum: 0.5,
            social_charge: 0.5,
            stamina: 0.5,
        }
    }
}

impl TraitSummary {
    /// Create a summary, clamping each component to 0.0..=1.0.
    pub fn new(momentum: f64, social_charge: f64, stamina: f64) -> Self {
        Self {
            momentum: momentum.clamp(0.0, 1.0),
            social_charge: social_charge.clamp(0.0, 1.0),
            stamina: stamina.clamp(0.0, 1.0),
        }
    }

    /// Component-wise arithmetic mean. Returns `None` for an empty input.
    pub fn mean<'a, I>(summaries: I) -> Option<TraitSummary>
    where
        I: IntoIterator<Item = &'a TraitSummary>,
    {
        let mut momentum = 0.0;
        let mut social = 0.0;
        let mut stamina = 0.0;
        let mut count = 0usize;
        for s in summaries {
            momentum += s.momentum;
            social += s.social_charge;
            stamina += s.stamina;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(TraitSummary {
            momentum: momentum / n,
            social_charge: social / n,
            stamina: stamina / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_components() {
        let t = TraitSummary::new(1.5, -0.2, 0.3);
        assert!((t.momentum - 1.0).abs() < f64::EPSILON);
        assert!(t.social_charge.abs() < f64::EPSILON);
        assert!((t.stamina - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert!(TraitSummary::mean([].iter()).is_none());
    }

    #[test]
    fn mean_averages_componentwise() {
        let a = TraitSummary::new(0.0, 0.4, 1.0);
        let b = TraitSummary::new(1.0, 0.6, 0.0);
        let mean = TraitSummary::mean([a, b].iter()).unwrap();
        assert!((mean.momentum - 0.5).abs() < f64::EPSILON);
        assert!((mean.social_charge - 0.5).abs() < f64::EPSILON);
        assert!((mean.stamina - 0.5).abs() < f64::EPSILON);
    }
}
