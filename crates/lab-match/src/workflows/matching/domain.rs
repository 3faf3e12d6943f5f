use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::dates::SlotDate;
use super::normalizer::fold_state;

/// Identifier wrapper for class requests (the upstream row key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for lab definitions in the catalog node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabId(pub String);

/// A lab as published upstream, before booked slots are subtracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabDefinition {
    pub title: String,
    pub audience: String,
    pub available_dates: Vec<String>,
    pub duration: Option<String>,
    pub venue: Option<String>,
    pub topic_area: Option<String>,
}

/// A class asking for a lab visit. Lab choices are ordered by preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub lab_choices: Vec<String>,
    pub email: String,
    pub institute_code: String,
    pub zone_code: Option<String>,
    pub class_level: String,
    pub section: String,
    pub contact_phone: String,
}

/// One historical proposal for a request, as tracked in the assignments node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub request_id: Option<RequestId>,
    pub lab_name: String,
    pub lab_date: String,
    pub acceptance_state: String,
    pub rejection_counter: u32,
    pub recorded_at: Option<NaiveDateTime>,
}

/// Normalized answer a school gave to a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceState {
    Yes,
    Pending,
    No,
    Other(String),
}

impl AcceptanceState {
    /// Italian and English spellings are both in circulation; accents are ignored.
    pub fn normalize(raw: &str) -> Self {
        let folded = fold_state(raw);
        match folded.as_str() {
            "SI" | "YES" => return Self::Yes,
            "NO" => return Self::No,
            _ => {}
        }

        let pending = (folded.contains("PROPOSTA") && folded.contains("ELABORARE"))
            || (folded.contains("PROPOSAL") && folded.contains("PENDING"));
        if pending {
            Self::Pending
        } else {
            Self::Other(folded)
        }
    }
}

/// Per-request outcome of the history scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub rejected_counter: u32,
    pub assigned_dates: BTreeSet<SlotDate>,
    pub is_fully_assigned: bool,
}

/// Allocation state of a request during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Unassigned,
    Assigned,
    ExcludedSentinel,
}

/// The rule that produced an assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Repair { rejections: u32 },
    LowDemand,
    HighDemand,
    Fallback,
    NoAvailability { rejections: u32 },
}

impl Phase {
    pub fn label(self) -> String {
        match self {
            Phase::Repair { rejections } if rejections >= 3 => {
                "third rejection — revisit later".to_string()
            }
            Phase::Repair { rejections } => format!("Priority-Rejection (Phase {rejections})"),
            Phase::LowDemand => "Low Demand".to_string(),
            Phase::HighDemand => "High Demand".to_string(),
            Phase::Fallback => "Fallback".to_string(),
            Phase::NoAvailability { rejections } => {
                format!("No Availability (Phase {})", rejections.min(2))
            }
        }
    }
}

/// Output row of a run: either a proposal or a sentinel clearing a stale one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub request_id: RequestId,
    pub requested_lab: String,
    pub assigned_lab: String,
    pub assigned_date: String,
    pub equity_score: f64,
    pub phase_label: String,
    pub assigned: bool,
    pub duration: String,
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<RequestContact>,
}

/// Requester details copied onto a proposal so the export can be read on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContact {
    pub priority: u32,
    pub email: String,
    pub institute_code: String,
    pub zone_code: String,
    pub class_level: String,
    pub section: String,
    pub contact_phone: String,
}

impl AssignmentRecord {
    pub fn is_sentinel(&self) -> bool {
        !self.assigned && self.assigned_lab.is_empty() && self.assigned_date.is_empty()
    }

    pub(crate) fn sentinel(request_id: RequestId, rejections: u32) -> Self {
        Self {
            request_id,
            requested_lab: String::new(),
            assigned_lab: String::new(),
            assigned_date: String::new(),
            equity_score: 0.0,
            phase_label: Phase::NoAvailability { rejections }.label(),
            assigned: false,
            duration: String::new(),
            venue: String::new(),
            contact: None,
        }
    }
}

/// Something odd in the snapshot that was skipped rather than treated as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    MalformedLabDate { lab: String, raw: String },
    MalformedHistoryDate { record_id: String, raw: String },
    DuplicateLabTitle { title: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MalformedLabDate { lab, raw } => {
                write!(f, "lab '{lab}' lists an unreadable date '{raw}'")
            }
            Anomaly::MalformedHistoryDate { record_id, raw } => {
                write!(f, "history record {record_id} has an unreadable date '{raw}'")
            }
            Anomaly::DuplicateLabTitle { title } => {
                write!(f, "lab title '{title}' is defined more than once")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptance_state_normalization() {
        assert_eq!(AcceptanceState::normalize("Sì"), AcceptanceState::Yes);
        assert_eq!(AcceptanceState::normalize(" si"), AcceptanceState::Yes);
        assert_eq!(AcceptanceState::normalize("yes"), AcceptanceState::Yes);
        assert_eq!(AcceptanceState::normalize("No"), AcceptanceState::No);
        assert_eq!(
            AcceptanceState::normalize("proposta da elaborare"),
            AcceptanceState::Pending
        );
        assert_eq!(
            AcceptanceState::normalize("Proposal pending"),
            AcceptanceState::Pending
        );
        assert_eq!(
            AcceptanceState::normalize("forse"),
            AcceptanceState::Other("FORSE".to_string())
        );
        assert_eq!(
            AcceptanceState::normalize("nope"),
            AcceptanceState::Other("NOPE".to_string())
        );
    }

    #[test]
    fn phase_labels() {
        assert_eq!(
            Phase::Repair { rejections: 1 }.label(),
            "Priority-Rejection (Phase 1)"
        );
        assert_eq!(
            Phase::Repair { rejections: 4 }.label(),
            "third rejection — revisit later"
        );
        assert_eq!(
            Phase::NoAvailability { rejections: 1 }.label(),
            "No Availability (Phase 1)"
        );
        assert_eq!(
            Phase::NoAvailability { rejections: 5 }.label(),
            "No Availability (Phase 2)"
        );
    }

    #[test]
    fn sentinel_records_are_blank() {
        let record = AssignmentRecord::sentinel(RequestId("r-1".to_string()), 3);
        assert!(record.is_sentinel());
        assert_eq!(record.phase_label, "No Availability (Phase 2)");
    }
}
