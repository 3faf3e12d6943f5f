use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Request, RequestId};
use super::history::HistoryIndex;

/// How many declined proposals a request may accumulate before it stops competing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionPolicy {
    pub limit: u32,
    /// 1-based calendar months during which the limit is waived.
    pub reassignment_months: BTreeSet<u32>,
}

impl RejectionPolicy {
    pub const DEFAULT_LIMIT: u32 = 3;

    pub fn in_reassignment_window(&self, month: u32) -> bool {
        self.reassignment_months.contains(&month)
    }

    /// `None` means unbounded.
    pub fn effective_limit(&self, month: u32) -> Option<u32> {
        if self.in_reassignment_window(month) {
            None
        } else {
            Some(self.limit)
        }
    }
}

impl Default for RejectionPolicy {
    /// February through July is reassignment season.
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            reassignment_months: (2..=7).collect(),
        }
    }
}

/// Requests that may compete in this run, plus why the others were held back.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome<'a> {
    pub eligible: Vec<&'a Request>,
    pub already_assigned: usize,
    pub over_rejection_limit: usize,
}

pub fn filter_requests<'a>(
    requests: &'a BTreeMap<RequestId, Request>,
    index: &HistoryIndex,
    policy: &RejectionPolicy,
    month: u32,
) -> FilterOutcome<'a> {
    let limit = policy.effective_limit(month);
    let mut outcome = FilterOutcome::default();

    for (id, request) in requests {
        let stats = index.stats.get(id);
        if stats.map(|stats| stats.is_fully_assigned).unwrap_or(false) {
            outcome.already_assigned += 1;
            continue;
        }

        let rejected = stats.map(|stats| stats.rejected_counter).unwrap_or(0);
        if limit.is_some_and(|limit| rejected >= limit) {
            outcome.over_rejection_limit += 1;
            continue;
        }

        outcome.eligible.push(request);
    }

    info!(
        eligible = outcome.eligible.len(),
        already_assigned = outcome.already_assigned,
        over_rejection_limit = outcome.over_rejection_limit,
        reassignment_window = limit.is_none(),
        "requests filtered"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::matching::domain::RequestStats;

    fn request(id: &str) -> Request {
        Request {
            id: RequestId(id.to_string()),
            lab_choices: vec!["Art".to_string()],
            email: String::new(),
            institute_code: String::new(),
            zone_code: None,
            class_level: String::new(),
            section: String::new(),
            contact_phone: String::new(),
        }
    }

    fn fixture() -> (BTreeMap<RequestId, Request>, HistoryIndex) {
        let mut requests = BTreeMap::new();
        let mut index = HistoryIndex::default();
        for (id, rejected, assigned) in [
            ("fresh", None, false),
            ("two", Some(2), false),
            ("three", Some(3), false),
            ("booked", Some(1), true),
        ] {
            requests.insert(RequestId(id.to_string()), request(id));
            if let Some(rejected_counter) = rejected {
                index.stats.insert(
                    RequestId(id.to_string()),
                    RequestStats {
                        rejected_counter,
                        assigned_dates: BTreeSet::new(),
                        is_fully_assigned: assigned,
                    },
                );
            }
        }
        (requests, index)
    }

    fn eligible_ids(outcome: &FilterOutcome<'_>) -> Vec<String> {
        outcome
            .eligible
            .iter()
            .map(|request| request.id.0.clone())
            .collect()
    }

    #[test]
    fn third_rejection_excludes_outside_the_window() {
        let (requests, index) = fixture();
        let outcome = filter_requests(&requests, &index, &RejectionPolicy::default(), 10);

        assert_eq!(eligible_ids(&outcome), vec!["fresh", "two"]);
        assert_eq!(outcome.already_assigned, 1);
        assert_eq!(outcome.over_rejection_limit, 1);
    }

    #[test]
    fn reassignment_window_waives_the_limit() {
        let (requests, index) = fixture();
        let outcome = filter_requests(&requests, &index, &RejectionPolicy::default(), 3);

        assert_eq!(eligible_ids(&outcome), vec!["fresh", "three", "two"]);
        assert_eq!(outcome.already_assigned, 1);
        assert_eq!(outcome.over_rejection_limit, 0);
    }

    #[test]
    fn default_window_is_february_to_july() {
        let policy = RejectionPolicy::default();
        assert!(!policy.in_reassignment_window(1));
        assert!(policy.in_reassignment_window(2));
        assert!(policy.in_reassignment_window(7));
        assert!(!policy.in_reassignment_window(8));
        assert_eq!(policy.effective_limit(9), Some(3));
    }
}
