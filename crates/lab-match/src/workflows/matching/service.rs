use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Utc};
use tracing::{info, warn};

use super::allocator::Allocator;
use super::candidates::prepare_candidates;
use super::catalog::SlotCatalog;
use super::config::RunConfig;
use super::filter::filter_requests;
use super::history::HistoryIndex;
use super::report::RunReport;
use super::repository::{RepositoryError, RunMeta, RunReader, RunWriter, SnapshotSource, StoredRun};
use super::scoring::Scorer;

/// Service composing the snapshot source, the allocator, and the run writer.
pub struct MatchingService<S, W> {
    source: Arc<S>,
    writer: Arc<W>,
}

impl<S, W> MatchingService<S, W>
where
    S: SnapshotSource + 'static,
    W: RunWriter + 'static,
{
    pub fn new(source: Arc<S>, writer: Arc<W>) -> Self {
        Self { source, writer }
    }

    /// Execute one destination run against a fresh snapshot and persist it.
    ///
    /// Nothing is written when the snapshot cannot be read. An empty run is still
    /// persisted so downstream readers see that it happened.
    pub fn run(&self, config: &RunConfig, now: DateTime<Local>) -> Result<RunReport, MatchingError> {
        let destination = &config.destination;
        info!(destination = %destination.kind, "matching run started");

        let labs = self
            .source
            .fetch_lab_catalog()
            .map_err(MatchingError::Snapshot)?;
        let requests = self
            .source
            .fetch_requests(&destination.requests_node)
            .map_err(MatchingError::Snapshot)?;
        let history = self
            .source
            .fetch_history(&destination.history_node)
            .map_err(MatchingError::Snapshot)?;
        info!(
            labs = labs.len(),
            requests = requests.len(),
            history = history.len(),
            "snapshot loaded"
        );

        let index = HistoryIndex::build(&history, &requests);
        let filtered = filter_requests(&requests, &index, &config.rejection_policy, now.month());

        let clock = now.naive_local();
        let (catalog, catalog_anomalies) = SlotCatalog::build(&labs, &index.booked_slots, clock);
        let (catalog, split) = catalog.into_audience(&destination.audience_label);
        if catalog.is_empty() {
            warn!(destination = %destination.kind, "no lab with open seats for this destination");
        }
        if filtered.eligible.is_empty() {
            warn!(destination = %destination.kind, "no eligible request for this destination");
        }

        let candidates = prepare_candidates(&filtered.eligible, &catalog, &index);
        let scorer = Scorer::new(config.weights.clone(), config.zone_priorities.clone());
        let allocation = Allocator::new(&scorer, &index, config.low_demand_threshold)
            .allocate(catalog, &candidates, &requests);

        let mut anomalies = index.anomalies.clone();
        anomalies.extend(catalog_anomalies);

        let run_id = now.timestamp_millis();
        let stored = StoredRun {
            run_id,
            meta: RunMeta {
                created_at: now.with_timezone(&Utc),
                count: allocation.records.len(),
                destination: Some(destination.kind),
            },
            records: allocation.records,
        };
        self.writer
            .persist_run(&destination.results_node, &stored)
            .map_err(MatchingError::Persist)?;

        info!(
            destination = %destination.kind,
            run_id,
            records = stored.records.len(),
            "matching run persisted"
        );

        Ok(RunReport {
            run_id,
            destination: destination.kind,
            records: stored.records,
            phase_counts: allocation.phase_counts,
            anomalies,
            labs: split,
            requests_total: requests.len(),
            requests_eligible: filtered.eligible.len(),
            candidate_rows: candidates.len(),
            seats_left: allocation.remaining.total_available(),
        })
    }

    pub fn run_now(&self, config: &RunConfig) -> Result<RunReport, MatchingError> {
        self.run(config, Local::now())
    }

    /// Run each destination in turn, each on its own catalog. Stops at the first failure.
    pub fn run_all(
        &self,
        configs: &[RunConfig],
        now: DateTime<Local>,
    ) -> Result<Vec<RunReport>, MatchingError> {
        configs.iter().map(|config| self.run(config, now)).collect()
    }
}

impl<S, W> MatchingService<S, W>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    pub fn latest(&self, results_node: &str) -> Result<Option<StoredRun>, MatchingError> {
        self.writer
            .latest_run(results_node)
            .map_err(MatchingError::Snapshot)
    }
}

/// Error raised by the matching service.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("unable to read snapshot: {0}")]
    Snapshot(#[source] RepositoryError),
    #[error("unable to persist run: {0}")]
    Persist(#[source] RepositoryError),
}
