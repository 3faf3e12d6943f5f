use serde::Serialize;

use super::allocator::PhaseCounts;
use super::catalog::AudienceSplit;
use super::config::DestinationKind;
use super::domain::{Anomaly, AssignmentRecord};

/// Everything one run produced, persisted or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub destination: DestinationKind,
    pub records: Vec<AssignmentRecord>,
    pub phase_counts: PhaseCounts,
    pub anomalies: Vec<Anomaly>,
    pub labs: AudienceSplit,
    pub requests_total: usize,
    pub requests_eligible: usize,
    pub candidate_rows: usize,
    pub seats_left: u32,
}

/// Compact view of a report returned by the HTTP layer and printed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub destination: DestinationKind,
    pub assigned: usize,
    pub cleared: usize,
    pub phase_counts: PhaseCounts,
    pub labs_accepted: usize,
    pub labs_rejected: usize,
    pub requests_total: usize,
    pub requests_eligible: usize,
    pub seats_left: u32,
    pub anomalies: Vec<String>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            destination: self.destination,
            assigned: self.phase_counts.assigned(),
            cleared: self.phase_counts.no_availability,
            phase_counts: self.phase_counts,
            labs_accepted: self.labs.accepted,
            labs_rejected: self.labs.rejected,
            requests_total: self.requests_total,
            requests_eligible: self.requests_eligible,
            seats_left: self.seats_left,
            anomalies: self.anomalies.iter().map(ToString::to_string).collect(),
        }
    }
}
