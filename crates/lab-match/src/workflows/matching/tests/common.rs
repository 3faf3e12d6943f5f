use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::Value;

use crate::store::InMemoryStore;
use crate::workflows::matching::{
    filter_requests, prepare_candidates, Allocation, Allocator, AssignmentRecord, DestinationKind,
    HistoryIndex, HistoryRecord, LabDefinition, LabId, RepositoryError, Request, RequestId,
    RunConfig, RunWriter, Scorer, SlotCatalog, SnapshotSource, StoredRun,
};

pub(super) const PRIMARY: &str = "Scuola Primaria";
pub(super) const SECONDARY: &str = "Scuola Secondaria di I grado";

pub(super) fn local(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("unambiguous local time")
}

pub(super) fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
    local(year, month, day, 12).naive_local()
}

/// October: outside the reassignment window.
pub(super) fn autumn() -> DateTime<Local> {
    local(2026, 10, 5, 9)
}

/// March: inside the reassignment window.
pub(super) fn spring() -> DateTime<Local> {
    local(2026, 3, 2, 9)
}

pub(super) fn primary_config() -> RunConfig {
    RunConfig::for_destination(DestinationKind::Primary)
}

pub(super) fn request(id: &str, choices: &[&str], zone: &str, institute: &str) -> Request {
    Request {
        id: RequestId(id.to_string()),
        lab_choices: choices.iter().map(|choice| choice.to_string()).collect(),
        email: format!("{id}@school.example"),
        institute_code: institute.to_string(),
        zone_code: Some(zone.to_string()),
        class_level: "4".to_string(),
        section: "A".to_string(),
        contact_phone: "+39 011 000000".to_string(),
    }
}

pub(super) fn history(
    request_id: &str,
    lab: &str,
    date: &str,
    state: &str,
    rejection_counter: u32,
    recorded_at: Option<NaiveDateTime>,
) -> HistoryRecord {
    HistoryRecord {
        request_id: Some(RequestId(request_id.to_string())),
        lab_name: lab.to_string(),
        lab_date: date.to_string(),
        acceptance_state: state.to_string(),
        rejection_counter,
        recorded_at,
    }
}

/// Upstream nodes of one destination, assembled in memory.
#[derive(Debug, Clone, Default)]
pub(super) struct Snapshot {
    pub(super) labs: BTreeMap<LabId, LabDefinition>,
    pub(super) requests: BTreeMap<RequestId, Request>,
    pub(super) history: BTreeMap<String, HistoryRecord>,
}

impl Snapshot {
    pub(super) fn lab(self, title: &str, dates: &[&str]) -> Self {
        self.lab_for(title, PRIMARY, dates)
    }

    pub(super) fn lab_for(mut self, title: &str, audience: &str, dates: &[&str]) -> Self {
        let id = LabId(format!("lab-{:02}", self.labs.len()));
        self.labs.insert(
            id,
            LabDefinition {
                title: title.to_string(),
                audience: audience.to_string(),
                available_dates: dates.iter().map(|date| date.to_string()).collect(),
                duration: Some("90".to_string()),
                venue: Some("Campus Luigi Einaudi".to_string()),
                topic_area: Some("STEM".to_string()),
            },
        );
        self
    }

    pub(super) fn request(mut self, request: Request) -> Self {
        self.requests.insert(request.id.clone(), request);
        self
    }

    pub(super) fn record(mut self, record: HistoryRecord) -> Self {
        let id = format!("h-{:03}", self.history.len());
        self.history.insert(id, record);
        self
    }

    /// Run the whole pipeline without a store.
    pub(super) fn allocate(&self, config: &RunConfig, now: DateTime<Local>) -> Allocation {
        use chrono::Datelike;

        let index = HistoryIndex::build(&self.history, &self.requests);
        let filtered = filter_requests(
            &self.requests,
            &index,
            &config.rejection_policy,
            now.month(),
        );
        let (catalog, _) = SlotCatalog::build(&self.labs, &index.booked_slots, now.naive_local());
        let (catalog, _) = catalog.into_audience(&config.destination.audience_label);
        let candidates = prepare_candidates(&filtered.eligible, &catalog, &index);
        let scorer = Scorer::new(config.weights.clone(), config.zone_priorities.clone());
        Allocator::new(&scorer, &index, config.low_demand_threshold).allocate(
            catalog,
            &candidates,
            &self.requests,
        )
    }

    /// Load the snapshot into a store under the nodes of `kind`.
    pub(super) fn load_into(&self, store: &InMemoryStore, kind: DestinationKind) {
        let destination = kind.destination();
        for (id, lab) in &self.labs {
            store
                .insert_lab(id.clone(), lab.clone())
                .expect("insert lab");
        }
        for request in self.requests.values() {
            store
                .insert_request(&destination.requests_node, request.clone())
                .expect("insert request");
        }
        for (id, record) in &self.history {
            store
                .insert_history(&destination.history_node, id.clone(), record.clone())
                .expect("insert history");
        }
    }

    pub(super) fn into_store(self, kind: DestinationKind) -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        self.load_into(&store, kind);
        Arc::new(store)
    }
}

pub(super) fn record_for<'a>(allocation: &'a Allocation, id: &str) -> Option<&'a AssignmentRecord> {
    allocation
        .records
        .iter()
        .find(|record| record.request_id.0 == id)
}

pub(super) struct UnavailableSource;

impl SnapshotSource for UnavailableSource {
    fn fetch_lab_catalog(&self) -> Result<BTreeMap<LabId, LabDefinition>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_requests(&self, _node: &str) -> Result<BTreeMap<RequestId, Request>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_history(
        &self,
        _node: &str,
    ) -> Result<BTreeMap<String, HistoryRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct CountingWriter {
    calls: AtomicUsize,
}

impl CountingWriter {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RunWriter for CountingWriter {
    fn persist_run(&self, _results_node: &str, _run: &StoredRun) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
