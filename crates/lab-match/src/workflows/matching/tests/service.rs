use std::sync::Arc;

use super::common::*;
use crate::store::InMemoryStore;
use crate::workflows::matching::{
    DestinationKind, MatchingError, MatchingService, RepositoryError, RunConfig, RunReader,
};

#[test]
fn run_persists_records_under_the_clock_millis() {
    let store = Snapshot::default()
        .lab("Art", &["12/11/2026 09:00"])
        .request(request("r-1", &["Art"], "2", "TOIC801"))
        .into_store(DestinationKind::Primary);
    let service = MatchingService::new(store.clone(), store.clone());
    let now = autumn();

    let report = service.run(&primary_config(), now).expect("run succeeds");

    assert_eq!(report.run_id, now.timestamp_millis());
    assert_eq!(report.phase_counts.low_demand, 1);
    assert_eq!(report.requests_eligible, 1);
    assert_eq!(report.labs.accepted, 1);

    let stored = store
        .latest_run("risultati_assegnazione_primarie")
        .expect("read runs")
        .expect("run stored");
    assert_eq!(stored.run_id, report.run_id);
    assert_eq!(stored.meta.count, 1);
    assert_eq!(stored.meta.destination, Some(DestinationKind::Primary));
    assert_eq!(stored.records, report.records);

    let contact = stored.records[0].contact.as_ref().expect("contact copied");
    assert_eq!(contact.priority, 1);
    assert_eq!(contact.email, "r-1@school.example");
}

#[test]
fn snapshot_failure_writes_nothing() {
    let writer = Arc::new(CountingWriter::default());
    let service = MatchingService::new(Arc::new(UnavailableSource), writer.clone());

    let result = service.run(&primary_config(), autumn());

    assert!(matches!(
        result,
        Err(MatchingError::Snapshot(RepositoryError::Unavailable(_)))
    ));
    assert_eq!(writer.calls(), 0);
}

#[test]
fn empty_snapshot_is_a_successful_empty_run() {
    let store = Arc::new(InMemoryStore::new());
    let service = MatchingService::new(store.clone(), store.clone());

    let report = service.run(&primary_config(), autumn()).expect("empty run");

    assert!(report.is_empty());
    assert_eq!(report.summary().assigned, 0);
    let runs = store.runs("risultati_assegnazione_primarie").expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].meta.count, 0);
}

#[test]
fn repeated_run_id_is_a_persist_conflict() {
    let store = Arc::new(InMemoryStore::new());
    let service = MatchingService::new(store.clone(), store.clone());
    let now = autumn();

    service.run(&primary_config(), now).expect("first run");
    let second = service.run(&primary_config(), now);

    assert!(matches!(
        second,
        Err(MatchingError::Persist(RepositoryError::Conflict { .. }))
    ));
    assert_eq!(
        store.runs("risultati_assegnazione_primarie").expect("runs").len(),
        1
    );
}

#[test]
fn destinations_run_on_independent_catalogs() {
    let shared = Snapshot::default().lab_for(
        "Astronomy",
        "Scuola Primaria e Scuola Secondaria di I grado",
        &["12/11/2026 09:00"],
    );
    let store = Arc::new(InMemoryStore::new());
    shared
        .clone()
        .request(request("p-1", &["Astronomy"], "2", "TOEE01"))
        .load_into(&store, DestinationKind::Primary);
    shared
        .request(request("s-1", &["Astronomy"], "2", "TOMM01"))
        .load_into(&store, DestinationKind::Secondary);
    let service = MatchingService::new(store.clone(), store.clone());
    let configs = [
        primary_config(),
        RunConfig::for_destination(DestinationKind::Secondary),
    ];

    let reports = service.run_all(&configs, autumn()).expect("both runs");

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].destination, DestinationKind::Primary);
    assert_eq!(reports[0].records[0].request_id.0, "p-1");
    assert_eq!(reports[1].destination, DestinationKind::Secondary);
    assert_eq!(reports[1].records[0].request_id.0, "s-1");
    assert_eq!(
        reports[0].records[0].assigned_date,
        reports[1].records[0].assigned_date
    );
}

#[test]
fn latest_reads_the_newest_run() {
    let store = Snapshot::default()
        .lab("Art", &["12/11/2026 09:00", "19/11/2026 09:00"])
        .request(request("r-1", &["Art"], "2", "TOIC801"))
        .into_store(DestinationKind::Primary);
    let service = MatchingService::new(store.clone(), store.clone());

    let first = service.run(&primary_config(), autumn()).expect("first");
    let second = service
        .run(&primary_config(), local(2026, 10, 6, 9))
        .expect("second");

    let latest = service
        .latest("risultati_assegnazione_primarie")
        .expect("read")
        .expect("stored");
    assert!(second.run_id > first.run_id);
    assert_eq!(latest.run_id, second.run_id);
    assert!(service
        .latest("risultati_assegnazione_secondarie")
        .expect("read")
        .is_none());
}
