use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::dates::SlotDate;
use super::domain::{Anomaly, LabDefinition, LabId};
use super::history::BookedSlots;
use super::normalizer::{lab_base_name, normalize_audience, normalize_lab_name};

const DEFAULT_VENUE: &str = "Venue not specified";
const DEFAULT_TOPIC: &str = "Not defined";

/// Remaining capacity of one lab for the current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabSlotSet {
    pub name: String,
    pub audience: String,
    pub total_available: u32,
    pub available: BTreeMap<SlotDate, u32>,
    pub duration: Option<String>,
    pub venue: String,
    pub topic_area: String,
}

impl LabSlotSet {
    pub fn has_capacity(&self) -> bool {
        self.total_available > 0
    }

    /// Take one seat on the earliest date not in `excluded`.
    pub fn take_earliest(&mut self, excluded: &BTreeSet<SlotDate>) -> Option<SlotDate> {
        if !self.has_capacity() {
            return None;
        }

        let date = self
            .available
            .iter()
            .find(|(date, remaining)| **remaining > 0 && !excluded.contains(date))
            .map(|(date, _)| *date)?;

        if let Some(remaining) = self.available.get_mut(&date) {
            *remaining -= 1;
            if *remaining == 0 {
                self.available.remove(&date);
            }
        }
        self.total_available -= 1;
        Some(date)
    }

    fn serves(&self, target: &str) -> bool {
        let audience = normalize_audience(&self.audience);
        if audience.is_empty() || target.is_empty() {
            return false;
        }
        audience == target || audience.contains(target) || target.contains(&audience)
    }
}

/// Labs with open seats, in catalog order. Owned by a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlotCatalog {
    labs: Vec<LabSlotSet>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

/// Outcome of restricting a catalog to one destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AudienceSplit {
    pub accepted: usize,
    pub rejected: usize,
}

impl SlotCatalog {
    /// Subtract booked seats and past dates from every lab definition.
    pub fn build(
        definitions: &BTreeMap<LabId, LabDefinition>,
        booked: &BookedSlots,
        now: NaiveDateTime,
    ) -> (Self, Vec<Anomaly>) {
        let mut catalog = SlotCatalog::default();
        let mut anomalies = Vec::new();

        for definition in definitions.values() {
            if definition.available_dates.is_empty() {
                continue;
            }
            let name = normalize_lab_name(&definition.title);
            if name.is_empty() {
                continue;
            }

            let mut booked_here = booked_counts_for(&name, booked);
            let mut available: BTreeMap<SlotDate, u32> = BTreeMap::new();
            let mut total_available = 0u32;

            for raw in &definition.available_dates {
                let Some(date) = SlotDate::parse(raw) else {
                    warn!(lab = %name, raw = %raw, "skipping unreadable lab date");
                    anomalies.push(Anomaly::MalformedLabDate {
                        lab: name.clone(),
                        raw: raw.clone(),
                    });
                    continue;
                };
                if date.is_before(now) {
                    continue;
                }

                match booked_here.get_mut(&date) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => {
                        *available.entry(date).or_insert(0) += 1;
                        total_available += 1;
                    }
                }
            }

            if total_available == 0 {
                debug!(lab = %name, "lab has no open seats");
                continue;
            }

            let slot_set = LabSlotSet {
                name: name.clone(),
                audience: definition.audience.clone(),
                total_available,
                available,
                duration: definition.duration.clone(),
                venue: definition
                    .venue
                    .clone()
                    .filter(|venue| !venue.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_VENUE.to_string()),
                topic_area: definition
                    .topic_area
                    .clone()
                    .filter(|topic| !topic.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            };

            if catalog.insert(slot_set) {
                anomalies.push(Anomaly::DuplicateLabTitle { title: name });
            }
        }

        info!(
            labs = catalog.len(),
            seats = catalog.total_available(),
            "slot catalog built"
        );

        (catalog, anomalies)
    }

    /// Returns true when an earlier lab with the same name was replaced.
    fn insert(&mut self, slot_set: LabSlotSet) -> bool {
        match self.positions.get(&slot_set.name) {
            Some(&position) => {
                self.labs[position] = slot_set;
                true
            }
            None => {
                self.positions.insert(slot_set.name.clone(), self.labs.len());
                self.labs.push(slot_set);
                false
            }
        }
    }

    /// Keep only labs whose audience tag matches the destination label.
    pub fn into_audience(self, destination_label: &str) -> (Self, AudienceSplit) {
        let target = normalize_audience(destination_label);
        let mut restricted = SlotCatalog::default();
        let mut split = AudienceSplit::default();

        for lab in self.labs {
            if lab.serves(&target) {
                split.accepted += 1;
                restricted.insert(lab);
            } else {
                if split.rejected < 5 {
                    debug!(lab = %lab.name, audience = %lab.audience, "lab skipped for destination");
                }
                split.rejected += 1;
            }
        }

        info!(
            destination = %destination_label,
            accepted = split.accepted,
            rejected = split.rejected,
            "labs filtered by audience"
        );

        (restricted, split)
    }

    pub fn get(&self, name: &str) -> Option<&LabSlotSet> {
        self.positions.get(name).map(|&position| &self.labs[position])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LabSlotSet> {
        match self.positions.get(name) {
            Some(&position) => self.labs.get_mut(position),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabSlotSet> {
        self.labs.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.labs.iter().map(|lab| lab.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.labs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labs.is_empty()
    }

    pub fn total_available(&self) -> u32 {
        self.labs.iter().map(|lab| lab.total_available).sum()
    }
}

/// Merge the booked counts of every edition whose base name matches `lab`.
fn booked_counts_for(lab: &str, booked: &BookedSlots) -> BTreeMap<SlotDate, u32> {
    let mut counts = BTreeMap::new();
    for (booked_name, slots) in booked {
        if lab_base_name(booked_name) != lab {
            continue;
        }
        for (date, count) in slots {
            *counts.entry(*date).or_insert(0) += count;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid now")
    }

    fn slot(raw: &str) -> SlotDate {
        SlotDate::parse(raw).expect("valid slot")
    }

    fn definition(title: &str, audience: &str, dates: &[&str]) -> LabDefinition {
        LabDefinition {
            title: title.to_string(),
            audience: audience.to_string(),
            available_dates: dates.iter().map(|d| d.to_string()).collect(),
            duration: Some("90".to_string()),
            venue: None,
            topic_area: Some("Science".to_string()),
        }
    }

    fn definitions(entries: Vec<LabDefinition>) -> BTreeMap<LabId, LabDefinition> {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, def)| (LabId(format!("lab-{i}")), def))
            .collect()
    }

    #[test]
    fn past_dates_and_booked_seats_are_removed() {
        let defs = definitions(vec![definition(
            "Biology",
            "Scuola Primaria",
            &[
                "20/02/2026 09:00",
                "10/03/2026 09:00",
                "10/03/2026 09:00",
                "17/03/2026 09:00",
                "not a date",
            ],
        )]);
        let mut booked = BookedSlots::new();
        booked
            .entry("Biology (2)".to_string())
            .or_default()
            .insert(slot("10/03/2026 09:00"), 1);
        booked
            .entry("Biology".to_string())
            .or_default()
            .insert(slot("17/03/2026 09:00"), 1);

        let (catalog, anomalies) = SlotCatalog::build(&defs, &booked, now());
        let lab = catalog.get("Biology").expect("biology still open");

        assert_eq!(lab.total_available, 1);
        assert_eq!(lab.available.get(&slot("10/03/2026 09:00")), Some(&1));
        assert!(!lab.available.contains_key(&slot("17/03/2026 09:00")));
        assert_eq!(lab.venue, DEFAULT_VENUE);
        assert_eq!(anomalies.len(), 1);
    }

    #[test]
    fn fully_booked_labs_are_not_emitted() {
        let defs = definitions(vec![definition("Art", "Scuola Primaria", &["10/03/2026 09:00"])]);
        let mut booked = BookedSlots::new();
        booked
            .entry("Art".to_string())
            .or_default()
            .insert(slot("10/03/2026 09:00"), 2);

        let (catalog, _) = SlotCatalog::build(&defs, &booked, now());
        assert!(catalog.is_empty());
    }

    #[test]
    fn audience_restriction_matches_substrings_both_ways() {
        let defs = definitions(vec![
            definition("Art", "Scuola Primaria", &["10/03/2026 09:00"]),
            definition("Robotics", "scuola secondaria di I grado", &["10/03/2026 09:00"]),
            definition("Music", "Primaria", &["10/03/2026 09:00"]),
            definition("Untagged", "", &["10/03/2026 09:00"]),
        ]);
        let (catalog, _) = SlotCatalog::build(&defs, &BookedSlots::new(), now());

        let (primary, split) = catalog.clone().into_audience("Scuola  primaria");
        assert_eq!(primary.names(), vec!["Art", "Music"]);
        assert_eq!(split, AudienceSplit { accepted: 2, rejected: 2 });

        let (secondary, _) = catalog.into_audience("Scuola Secondaria di I grado");
        assert_eq!(secondary.names(), vec!["Robotics"]);
    }

    #[test]
    fn take_earliest_respects_exclusions_and_never_underflows() {
        let defs = definitions(vec![definition(
            "Art",
            "Scuola Primaria",
            &["17/03/2026 09:00", "10/03/2026 09:00"],
        )]);
        let (mut catalog, _) = SlotCatalog::build(&defs, &BookedSlots::new(), now());
        let lab = catalog.get_mut("Art").expect("art open");

        let excluded: BTreeSet<SlotDate> = [slot("10/03/2026 09:00")].into_iter().collect();
        assert_eq!(lab.take_earliest(&excluded), Some(slot("17/03/2026 09:00")));
        assert_eq!(lab.take_earliest(&excluded), None);
        assert_eq!(lab.take_earliest(&BTreeSet::new()), Some(slot("10/03/2026 09:00")));
        assert_eq!(lab.take_earliest(&BTreeSet::new()), None);
        assert_eq!(lab.total_available, 0);
        assert!(lab.available.is_empty());
    }

    #[test]
    fn duplicate_titles_replace_in_place() {
        let defs = definitions(vec![
            definition("Art", "Scuola Primaria", &["10/03/2026 09:00"]),
            definition("Music", "Scuola Primaria", &["10/03/2026 09:00"]),
            definition(" Art ", "Scuola Primaria", &["11/03/2026 09:00", "12/03/2026 09:00"]),
        ]);
        let (catalog, anomalies) = SlotCatalog::build(&defs, &BookedSlots::new(), now());

        assert_eq!(catalog.names(), vec!["Art", "Music"]);
        assert_eq!(catalog.get("Art").map(|lab| lab.total_available), Some(2));
        assert_eq!(
            anomalies,
            vec![Anomaly::DuplicateLabTitle {
                title: "Art".to_string()
            }]
        );
    }
}
