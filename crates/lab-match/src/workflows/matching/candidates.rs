use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use super::catalog::SlotCatalog;
use super::domain::{Request, RequestContact, RequestId};
use super::history::HistoryIndex;
use super::normalizer::normalize_lab_name;

/// Zone key used when a request carries no zone code.
pub const UNKNOWN_ZONE: &str = "NA";

/// One (request, chosen lab) pair competing for a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub request_id: RequestId,
    pub lab: String,
    /// 1-based rank of this lab in the request's choices.
    pub priority: u32,
    pub email: String,
    pub institute: String,
    pub zone: String,
    pub class_level: String,
    pub section: String,
    pub contact_phone: String,
    pub rejected_counter: u32,
}

impl Candidate {
    pub fn zone_institute_key(&self) -> String {
        format!("{}|{}", self.institute, self.zone)
    }

    pub(crate) fn contact(&self) -> RequestContact {
        RequestContact {
            priority: self.priority,
            email: self.email.clone(),
            institute_code: self.institute.clone(),
            zone_code: self.zone.clone(),
            class_level: self.class_level.clone(),
            section: self.section.clone(),
            contact_phone: self.contact_phone.clone(),
        }
    }
}

/// Expand eligible requests into candidate rows for the labs still open in `catalog`.
pub fn prepare_candidates(
    eligible: &[&Request],
    catalog: &SlotCatalog,
    index: &HistoryIndex,
) -> Vec<Candidate> {
    let mut seen_requests: BTreeSet<&RequestId> = BTreeSet::new();
    let mut candidates = Vec::new();
    let mut without_choice = 0usize;

    for request in eligible {
        if !seen_requests.insert(&request.id) {
            continue;
        }

        let zone = request
            .zone_code
            .as_deref()
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
            .unwrap_or(UNKNOWN_ZONE)
            .to_string();
        let rejected_counter = index.rejected_counter(&request.id);
        let mut seen_labs: BTreeSet<String> = BTreeSet::new();
        let mut matched = false;

        for (position, raw_choice) in request.lab_choices.iter().enumerate() {
            let lab = normalize_lab_name(raw_choice);
            if lab.is_empty() || !catalog.contains(&lab) || !seen_labs.insert(lab.clone()) {
                continue;
            }
            matched = true;
            candidates.push(Candidate {
                request_id: request.id.clone(),
                lab,
                priority: position as u32 + 1,
                email: request.email.trim().to_string(),
                institute: request.institute_code.trim().to_string(),
                zone: zone.clone(),
                class_level: request.class_level.clone(),
                section: request.section.clone(),
                contact_phone: request.contact_phone.clone(),
                rejected_counter,
            });
        }

        if !matched {
            without_choice += 1;
        }
    }

    info!(
        requests = seen_requests.len(),
        candidate_rows = candidates.len(),
        without_open_choice = without_choice,
        "candidates prepared"
    );

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::matching::domain::{LabDefinition, LabId};
    use crate::workflows::matching::history::BookedSlots;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn catalog(names: &[&str]) -> SlotCatalog {
        let definitions: BTreeMap<LabId, LabDefinition> = names
            .iter()
            .map(|name| {
                (
                    LabId(name.to_string()),
                    LabDefinition {
                        title: name.to_string(),
                        audience: "Scuola Primaria".to_string(),
                        available_dates: vec!["10/03/2026 09:00".to_string()],
                        duration: None,
                        venue: None,
                        topic_area: None,
                    },
                )
            })
            .collect();
        let now = NaiveDate::from_ymd_opt(2026, 1, 10)
            .and_then(|date| date.and_hms_opt(8, 0, 0))
            .expect("valid now");
        SlotCatalog::build(&definitions, &BookedSlots::new(), now).0
    }

    fn request(id: &str, choices: &[&str], zone: Option<&str>) -> Request {
        Request {
            id: RequestId(id.to_string()),
            lab_choices: choices.iter().map(|c| c.to_string()).collect(),
            email: " teacher@school.example ".to_string(),
            institute_code: "TOIC800".to_string(),
            zone_code: zone.map(str::to_string),
            class_level: "3".to_string(),
            section: "A".to_string(),
            contact_phone: String::new(),
        }
    }

    #[test]
    fn choices_keep_their_original_rank() {
        let catalog = catalog(&["Art", "Music"]);
        let first = request("r1", &["Closed lab", " Music ", "Art", "Music"], Some("2"));
        let rows = prepare_candidates(&[&first], &catalog, &HistoryIndex::default());

        let summary: Vec<(String, u32)> = rows
            .iter()
            .map(|row| (row.lab.clone(), row.priority))
            .collect();
        assert_eq!(
            summary,
            vec![("Music".to_string(), 2), ("Art".to_string(), 3)]
        );
        assert_eq!(rows[0].email, "teacher@school.example");
        assert_eq!(rows[0].zone_institute_key(), "TOIC800|2");
    }

    #[test]
    fn repeated_requests_contribute_once_and_missing_zone_is_na() {
        let catalog = catalog(&["Art"]);
        let only = request("r1", &["Art"], None);
        let rows = prepare_candidates(&[&only, &only], &catalog, &HistoryIndex::default());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zone, UNKNOWN_ZONE);
    }
}
