use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::candidates::Candidate;
use super::catalog::SlotCatalog;
use super::dates::SlotDate;
use super::domain::{AssignmentRecord, Phase, Request, RequestId, RequestStatus};
use super::history::HistoryIndex;
use super::scoring::{EquityCounters, ScoreMode, Scorer};

/// How many records each phase produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub repair: usize,
    pub low_demand: usize,
    pub high_demand: usize,
    pub fallback: usize,
    pub no_availability: usize,
}

impl PhaseCounts {
    fn bump(&mut self, phase: Phase) {
        match phase {
            Phase::Repair { .. } => self.repair += 1,
            Phase::LowDemand => self.low_demand += 1,
            Phase::HighDemand => self.high_demand += 1,
            Phase::Fallback => self.fallback += 1,
            Phase::NoAvailability { .. } => self.no_availability += 1,
        }
    }

    pub fn assigned(&self) -> usize {
        self.repair + self.low_demand + self.high_demand + self.fallback
    }
}

/// Final state of one run.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub records: Vec<AssignmentRecord>,
    pub statuses: BTreeMap<RequestId, RequestStatus>,
    pub phase_counts: PhaseCounts,
    pub counters: EquityCounters,
    /// Seats left over after every phase.
    pub remaining: SlotCatalog,
}

/// Phased assignment over a run-owned catalog.
///
/// Phases run in a fixed order: repair for previously declined requests, low-demand
/// labs scored once, high-demand labs rescored after every seat, then a fallback pass
/// over the whole catalog. A cleanup pass finally emits sentinels for declined requests
/// that ended the run without a seat.
pub struct Allocator<'a> {
    scorer: &'a Scorer,
    index: &'a HistoryIndex,
    low_demand_threshold: usize,
}

struct RunState {
    catalog: SlotCatalog,
    statuses: BTreeMap<RequestId, RequestStatus>,
    counters: EquityCounters,
    records: Vec<AssignmentRecord>,
    phase_counts: PhaseCounts,
}

impl RunState {
    fn is_assigned(&self, request_id: &RequestId) -> bool {
        matches!(self.statuses.get(request_id), Some(RequestStatus::Assigned))
    }

    /// Take the earliest unexcluded seat of `lab` for `candidate`.
    fn try_assign(
        &mut self,
        candidate: &Candidate,
        lab: &str,
        excluded: &BTreeSet<SlotDate>,
        phase: Phase,
        score: f64,
    ) -> bool {
        let Some(slot_set) = self.catalog.get_mut(lab) else {
            return false;
        };
        let Some(date) = slot_set.take_earliest(excluded) else {
            return false;
        };
        let duration = slot_set.duration.clone().unwrap_or_default();
        let venue = slot_set.venue.clone();

        debug!(
            request = %candidate.request_id,
            lab = %lab,
            date = %date,
            score,
            phase = %phase.label(),
            "seat assigned"
        );

        self.records.push(AssignmentRecord {
            request_id: candidate.request_id.clone(),
            requested_lab: candidate.lab.clone(),
            assigned_lab: lab.to_string(),
            assigned_date: date.canonical(),
            equity_score: score,
            phase_label: phase.label(),
            assigned: true,
            duration,
            venue,
            contact: Some(candidate.contact()),
        });
        self.statuses
            .insert(candidate.request_id.clone(), RequestStatus::Assigned);
        self.counters.record_assignment(candidate);
        self.phase_counts.bump(phase);
        true
    }
}

impl<'a> Allocator<'a> {
    pub fn new(scorer: &'a Scorer, index: &'a HistoryIndex, low_demand_threshold: usize) -> Self {
        Self {
            scorer,
            index,
            low_demand_threshold,
        }
    }

    /// `requests` is the full request set of the destination, filtered or not, so
    /// cleanup sentinels also reach requests held back by the filter.
    pub fn allocate(
        &self,
        catalog: SlotCatalog,
        candidates: &[Candidate],
        requests: &BTreeMap<RequestId, Request>,
    ) -> Allocation {
        let mut run = RunState {
            catalog,
            statuses: candidates
                .iter()
                .map(|candidate| (candidate.request_id.clone(), RequestStatus::Unassigned))
                .collect(),
            counters: EquityCounters::with_demand(candidates),
            records: Vec::new(),
            phase_counts: PhaseCounts::default(),
        };

        self.repair(&mut run, candidates);
        let (low_demand, high_demand) = self.bucket_labs(&run, candidates);
        self.low_demand(&mut run, candidates, &low_demand);
        self.high_demand(&mut run, candidates, &high_demand);
        self.fallback(&mut run, candidates);
        self.cleanup(&mut run, requests);

        info!(
            repair = run.phase_counts.repair,
            low_demand = run.phase_counts.low_demand,
            high_demand = run.phase_counts.high_demand,
            fallback = run.phase_counts.fallback,
            no_availability = run.phase_counts.no_availability,
            seats_left = run.catalog.total_available(),
            "allocation finished"
        );

        Allocation {
            records: run.records,
            statuses: run.statuses,
            phase_counts: run.phase_counts,
            counters: run.counters,
            remaining: run.catalog,
        }
    }

    fn repair(&self, run: &mut RunState, candidates: &[Candidate]) {
        let mut rows: Vec<&Candidate> = candidates
            .iter()
            .filter(|row| row.rejected_counter > 0)
            .collect();
        rows.sort_by(|a, b| {
            b.rejected_counter
                .cmp(&a.rejected_counter)
                .then(a.priority.cmp(&b.priority))
        });
        info!(rows = rows.len(), "repair phase");

        for row in rows {
            if run.is_assigned(&row.request_id) {
                continue;
            }
            let excluded = self.index.excluded_dates(&row.request_id, &row.lab);
            let phase = Phase::Repair {
                rejections: row.rejected_counter,
            };
            run.try_assign(row, &row.lab, &excluded, phase, 0.0);
        }
    }

    /// Split labs with open seats by how many unassigned rows still want them.
    fn bucket_labs(&self, run: &RunState, candidates: &[Candidate]) -> (BTreeSet<String>, Vec<String>) {
        let mut residual_demand: BTreeMap<&str, usize> = BTreeMap::new();
        for row in candidates {
            if !run.is_assigned(&row.request_id) {
                *residual_demand.entry(row.lab.as_str()).or_insert(0) += 1;
            }
        }

        let mut low_demand = BTreeSet::new();
        let mut high_demand = Vec::new();
        for lab in run.catalog.iter().filter(|lab| lab.has_capacity()) {
            let demand = residual_demand.get(lab.name.as_str()).copied().unwrap_or(0);
            if demand <= self.low_demand_threshold {
                low_demand.insert(lab.name.clone());
            } else {
                high_demand.push(lab.name.clone());
            }
        }

        info!(
            low_demand_labs = low_demand.len(),
            high_demand_labs = high_demand.len(),
            "labs bucketed by residual demand"
        );
        (low_demand, high_demand)
    }

    fn low_demand(&self, run: &mut RunState, candidates: &[Candidate], labs: &BTreeSet<String>) {
        let ranked = self.scorer.rank(
            candidates
                .iter()
                .filter(|row| labs.contains(&row.lab) && !run.is_assigned(&row.request_id)),
            &run.counters,
            ScoreMode::Standard,
        );

        for (row, score) in ranked {
            if run.is_assigned(&row.request_id) {
                continue;
            }
            let excluded = self.index.excluded_dates(&row.request_id, &row.lab);
            run.try_assign(row, &row.lab, &excluded, Phase::LowDemand, score);
        }
    }

    fn high_demand(&self, run: &mut RunState, candidates: &[Candidate], labs: &[String]) {
        for lab in labs {
            debug!(lab = %lab, "competing for high-demand lab");
            loop {
                let open = run
                    .catalog
                    .get(lab)
                    .map(|slot_set| slot_set.has_capacity())
                    .unwrap_or(false);
                if !open {
                    break;
                }

                let ranked = self.scorer.rank(
                    candidates
                        .iter()
                        .filter(|row| &row.lab == lab && !run.is_assigned(&row.request_id)),
                    &run.counters,
                    ScoreMode::Standard,
                );
                if ranked.is_empty() {
                    break;
                }

                let mut placed = false;
                for (row, score) in ranked {
                    let excluded = self.index.excluded_dates(&row.request_id, lab);
                    if run.try_assign(row, lab, &excluded, Phase::HighDemand, score) {
                        placed = true;
                        break;
                    }
                    debug!(request = %row.request_id, lab = %lab, "no unexcluded date left");
                }
                if !placed {
                    break;
                }
            }
        }
    }

    /// One row per unassigned request, its first surviving choice, against every lab.
    fn fallback(&self, run: &mut RunState, candidates: &[Candidate]) {
        let mut seen: BTreeSet<&RequestId> = BTreeSet::new();
        let mut leftovers: Vec<&Candidate> = Vec::new();
        for row in candidates {
            if !run.is_assigned(&row.request_id) && seen.insert(&row.request_id) {
                leftovers.push(row);
            }
        }
        let ranked = self
            .scorer
            .rank(leftovers, &run.counters, ScoreMode::Fallback);
        info!(requests = ranked.len(), "fallback phase");

        let lab_names = run.catalog.names();
        for (row, score) in ranked {
            if run.is_assigned(&row.request_id) {
                continue;
            }
            for lab in &lab_names {
                let excluded = self.index.excluded_dates(&row.request_id, lab);
                if run.try_assign(row, lab, &excluded, Phase::Fallback, score) {
                    break;
                }
            }
        }
    }

    fn cleanup(&self, run: &mut RunState, requests: &BTreeMap<RequestId, Request>) {
        for request_id in requests.keys() {
            let Some(stats) = self.index.stats.get(request_id) else {
                continue;
            };
            if stats.rejected_counter == 0 || run.is_assigned(request_id) {
                continue;
            }

            let sentinel = AssignmentRecord::sentinel(request_id.clone(), stats.rejected_counter);
            debug!(request = %request_id, label = %sentinel.phase_label, "clearing stale proposal");
            run.records.push(sentinel);
            run.statuses
                .insert(request_id.clone(), RequestStatus::ExcludedSentinel);
            run.phase_counts.bump(Phase::NoAvailability {
                rejections: stats.rejected_counter,
            });
        }
    }
}
