use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rubric weights for the fairness score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub territorial_equity_base_weight: f64,
    pub institute_equity_base_weight: f64,
    pub institute_equity_multiplier: f64,
    pub email_equity_multiplier: f64,
    pub email_max_assignments_penalty: f64,
    pub lab_popularity_penalty_weight: f64,
    pub zone_variety_penalty_weight: f64,
    /// Applied to the whole score in fallback mode.
    pub fallback_multiplier: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            territorial_equity_base_weight: 1000.0,
            institute_equity_base_weight: 1500.0,
            institute_equity_multiplier: 10.0,
            email_equity_multiplier: 1.0,
            email_max_assignments_penalty: 10000.0,
            lab_popularity_penalty_weight: 500.0,
            zone_variety_penalty_weight: 5000.0,
            fallback_multiplier: 1.0,
        }
    }
}

/// Territorial priority per zone code. Unknown zones score 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZonePriorities(pub BTreeMap<String, f64>);

impl ZonePriorities {
    pub fn priority_for(&self, zone: &str) -> f64 {
        self.0.get(zone).copied().unwrap_or(0.0)
    }
}

impl Default for ZonePriorities {
    fn default() -> Self {
        let entries = [
            ("0", 4.0),
            ("2", 4.0),
            ("6", 4.0),
            ("7", 3.0),
            ("8", 3.0),
            ("3", 2.0),
            ("4", 2.0),
            ("5", 2.0),
            ("1", 1.0),
        ];
        Self(
            entries
                .into_iter()
                .map(|(zone, priority)| (zone.to_string(), priority))
                .collect(),
        )
    }
}
