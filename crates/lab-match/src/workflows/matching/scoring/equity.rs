use std::collections::BTreeMap;

use serde::Serialize;

use super::super::candidates::Candidate;

/// Running counters that make repeated winners progressively less attractive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EquityCounters {
    pub lab_demand: BTreeMap<String, u32>,
    pub zone_assignments: BTreeMap<String, u32>,
    pub institute_assignments: BTreeMap<String, u32>,
    pub email_assignments: BTreeMap<String, u32>,
    pub zone_institute_assignments: BTreeMap<String, u32>,
}

impl EquityCounters {
    /// Seed lab demand with one unit per candidate row.
    pub fn with_demand(candidates: &[Candidate]) -> Self {
        let mut counters = Self::default();
        for candidate in candidates {
            *counters
                .lab_demand
                .entry(candidate.lab.clone())
                .or_insert(0) += 1;
        }
        counters
    }

    pub fn record_assignment(&mut self, candidate: &Candidate) {
        bump(&mut self.zone_assignments, &candidate.zone);
        bump(&mut self.institute_assignments, &candidate.institute);
        bump(&mut self.email_assignments, &candidate.email);
        bump(
            &mut self.zone_institute_assignments,
            &candidate.zone_institute_key(),
        );
    }

    pub fn lab_demand(&self, lab: &str) -> u32 {
        self.lab_demand.get(lab).copied().unwrap_or(0)
    }

    pub fn institute(&self, institute: &str) -> u32 {
        self.institute_assignments
            .get(institute)
            .copied()
            .unwrap_or(0)
    }

    pub fn email(&self, email: &str) -> u32 {
        self.email_assignments.get(email).copied().unwrap_or(0)
    }

    pub fn zone_institute(&self, key: &str) -> u32 {
        self.zone_institute_assignments
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

fn bump(counter: &mut BTreeMap<String, u32>, key: &str) {
    *counter.entry(key.to_string()).or_insert(0) += 1;
}
