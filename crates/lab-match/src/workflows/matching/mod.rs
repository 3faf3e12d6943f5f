//! Allocation of class lab requests to open lab seats.
//!
//! A run flows through the history index, the request filter, the slot catalog, the
//! candidate preparer and the phased allocator before the records are handed to a
//! [`RunWriter`]. Every structure is built fresh for the run and dropped afterwards.

pub mod allocator;
pub mod candidates;
pub mod catalog;
pub mod config;
pub mod dates;
pub mod domain;
pub mod filter;
pub mod history;
pub(crate) mod normalizer;
pub mod report;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use allocator::{Allocation, Allocator, PhaseCounts};
pub use candidates::{prepare_candidates, Candidate};
pub use catalog::{AudienceSplit, LabSlotSet, SlotCatalog};
pub use config::{Destination, DestinationKind, RunConfig, UnknownDestination, LABS_NODE};
pub use dates::SlotDate;
pub use domain::{
    AcceptanceState, Anomaly, AssignmentRecord, HistoryRecord, LabDefinition, LabId, Phase,
    Request, RequestContact, RequestId, RequestStats, RequestStatus,
};
pub use filter::{filter_requests, FilterOutcome, RejectionPolicy};
pub use history::{BookedSlots, HistoryIndex};
pub use report::{RunReport, RunSummary};
pub use repository::{RepositoryError, RunMeta, RunReader, RunWriter, SnapshotSource, StoredRun};
pub use router::{matching_router, MatchingApi};
pub use scoring::{EquityCounters, ScoreMode, ScoreWeights, Scorer, ZonePriorities};
pub use service::{MatchingError, MatchingService};
