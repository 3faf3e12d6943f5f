use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::dates::SlotDate;
use super::domain::{AcceptanceState, Anomaly, HistoryRecord, Request, RequestId, RequestStats};
use super::normalizer::lab_base_name;

/// Lab base name → slot → number of seats already promised.
pub type BookedSlots = BTreeMap<String, BTreeMap<SlotDate, u32>>;

/// Everything the run needs to know about prior proposals.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    pub booked_slots: BookedSlots,
    pub rejected_slots: BTreeMap<RequestId, BTreeMap<String, BTreeSet<SlotDate>>>,
    pub stats: BTreeMap<RequestId, RequestStats>,
    pub anomalies: Vec<Anomaly>,
}

struct ParsedRecord<'a> {
    record_id: &'a str,
    record: &'a HistoryRecord,
    state: AcceptanceState,
    lab: String,
    date: Option<SlotDate>,
}

impl HistoryIndex {
    /// Scan historical proposals grouped by request.
    ///
    /// Records pointing at requests missing from `requests` are dropped. A YES answer
    /// books its slot and short-circuits the group; otherwise the record with the
    /// highest rejection counter is the active one and books its slot when still
    /// pending. Every NO answer in the group lands on the request's blacklist.
    pub fn build(
        history: &BTreeMap<String, HistoryRecord>,
        requests: &BTreeMap<RequestId, Request>,
    ) -> Self {
        let mut index = HistoryIndex::default();
        let mut groups: BTreeMap<RequestId, Vec<ParsedRecord<'_>>> = BTreeMap::new();
        let mut dropped = 0usize;

        for (record_id, record) in history {
            let Some(request_id) = record.request_id.as_ref().filter(|id| !id.0.is_empty())
            else {
                dropped += 1;
                continue;
            };
            if !requests.contains_key(request_id) {
                dropped += 1;
                continue;
            }

            let date = SlotDate::parse(&record.lab_date);
            if date.is_none() && !record.lab_date.trim().is_empty() {
                index.anomalies.push(Anomaly::MalformedHistoryDate {
                    record_id: record_id.clone(),
                    raw: record.lab_date.clone(),
                });
            }

            groups
                .entry(request_id.clone())
                .or_default()
                .push(ParsedRecord {
                    record_id,
                    record,
                    state: AcceptanceState::normalize(&record.acceptance_state),
                    lab: lab_base_name(&record.lab_name),
                    date,
                });
        }

        if dropped > 0 {
            debug!(dropped, "history records without a known request were ignored");
        }

        for (request_id, records) in &groups {
            index.absorb_group(request_id, records);
        }

        info!(
            requests_with_history = index.stats.len(),
            booked_labs = index.booked_slots.len(),
            blacklisted_requests = index.rejected_slots.len(),
            "history preprocessed"
        );

        index
    }

    fn absorb_group(&mut self, request_id: &RequestId, records: &[ParsedRecord<'_>]) {
        if let Some(accepted) = records
            .iter()
            .find(|parsed| parsed.state == AcceptanceState::Yes)
        {
            let mut stats = RequestStats {
                rejected_counter: 0,
                assigned_dates: BTreeSet::new(),
                is_fully_assigned: true,
            };
            if let Some(date) = self.book(&accepted.lab, accepted.date) {
                stats.assigned_dates.insert(date);
            }
            self.stats.insert(request_id.clone(), stats);
            return;
        }

        let Some(active) = records.iter().max_by(|a, b| active_order(a, b)) else {
            return;
        };

        let mut stats = RequestStats {
            rejected_counter: active.record.rejection_counter,
            assigned_dates: BTreeSet::new(),
            is_fully_assigned: false,
        };

        if active.state == AcceptanceState::Pending {
            if let Some(date) = self.book(&active.lab, active.date) {
                stats.is_fully_assigned = true;
                stats.assigned_dates.insert(date);
            }
        }

        for parsed in records {
            if parsed.state != AcceptanceState::No || parsed.lab.is_empty() {
                continue;
            }
            if let Some(date) = parsed.date {
                self.rejected_slots
                    .entry(request_id.clone())
                    .or_default()
                    .entry(parsed.lab.clone())
                    .or_default()
                    .insert(date);
            }
        }

        self.stats.insert(request_id.clone(), stats);
    }

    fn book(&mut self, lab: &str, date: Option<SlotDate>) -> Option<SlotDate> {
        let date = date?;
        if lab.is_empty() {
            return None;
        }
        *self
            .booked_slots
            .entry(lab.to_string())
            .or_default()
            .entry(date)
            .or_insert(0) += 1;
        Some(date)
    }

    pub fn stats_for(&self, request_id: &RequestId) -> RequestStats {
        self.stats.get(request_id).cloned().unwrap_or_default()
    }

    pub fn rejected_counter(&self, request_id: &RequestId) -> u32 {
        self.stats
            .get(request_id)
            .map(|stats| stats.rejected_counter)
            .unwrap_or(0)
    }

    pub fn is_fully_assigned(&self, request_id: &RequestId) -> bool {
        self.stats
            .get(request_id)
            .map(|stats| stats.is_fully_assigned)
            .unwrap_or(false)
    }

    /// Dates this request may not receive for `lab`: declined ones plus ones it already holds.
    pub fn excluded_dates(&self, request_id: &RequestId, lab: &str) -> BTreeSet<SlotDate> {
        let mut excluded = self
            .rejected_slots
            .get(request_id)
            .and_then(|by_lab| by_lab.get(&lab_base_name(lab)))
            .cloned()
            .unwrap_or_default();
        if let Some(stats) = self.stats.get(request_id) {
            excluded.extend(stats.assigned_dates.iter().copied());
        }
        excluded
    }
}

/// Highest rejection counter wins; ties go to the most recent record, then the smallest record id.
fn active_order(a: &ParsedRecord<'_>, b: &ParsedRecord<'_>) -> Ordering {
    a.record
        .rejection_counter
        .cmp(&b.record.rejection_counter)
        .then_with(|| a.record.recorded_at.cmp(&b.record.recorded_at))
        .then_with(|| b.record_id.cmp(a.record_id))
}
