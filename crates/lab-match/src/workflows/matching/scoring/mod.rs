mod config;
mod equity;

pub use config::{ScoreWeights, ZonePriorities};
pub use equity::EquityCounters;

use std::cmp::Ordering;

use super::candidates::Candidate;

/// Whether the candidate is being ranked for its own choice or for any open lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    Standard,
    Fallback,
}

/// Stateless scorer that applies the weight rubric to a candidate.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoreWeights,
    zones: ZonePriorities,
}

impl Scorer {
    pub fn new(weights: ScoreWeights, zones: ZonePriorities) -> Self {
        Self { weights, zones }
    }

    /// Terms are summed in a fixed order so floating point results are reproducible.
    pub fn score(&self, candidate: &Candidate, counters: &EquityCounters, mode: ScoreMode) -> f64 {
        let weights = &self.weights;
        let mut score = 0.0;

        score += weights.territorial_equity_base_weight * self.zones.priority_for(&candidate.zone);

        score -= f64::from(counters.lab_demand(&candidate.lab))
            * weights.lab_popularity_penalty_weight;

        score -= f64::from(counters.zone_institute(&candidate.zone_institute_key()))
            * weights.zone_variety_penalty_weight;

        let institute_count = f64::from(counters.institute(&candidate.institute));
        score += (weights.institute_equity_base_weight
            - institute_count * weights.institute_equity_multiplier)
            .max(0.0);

        let email_count = counters.email(&candidate.email);
        score += (weights.email_equity_multiplier - f64::from(email_count)).max(0.0) * 100.0;
        if email_count >= 1 {
            score -= weights.email_max_assignments_penalty * f64::from(email_count);
        }

        if mode == ScoreMode::Fallback {
            score *= weights.fallback_multiplier;
        }

        score
    }

    /// Score every candidate and return them best first. Ties keep input order.
    pub fn rank<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Candidate>,
        counters: &EquityCounters,
        mode: ScoreMode,
    ) -> Vec<(&'a Candidate, f64)> {
        let mut ranked: Vec<(&Candidate, f64)> = candidates
            .into_iter()
            .map(|candidate| (candidate, self.score(candidate, counters, mode)))
            .collect();
        ranked.sort_by(|left, right| descending(left.1, right.1));
        ranked
    }
}

/// Signed zeros compare equal so a zero multiplier leaves the input order alone.
fn descending(left: f64, right: f64) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}
