//! Turn the latest stored run into row updates for the enrolment sheet.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::workflows::matching::{RequestId, StoredRun};

/// State written for every fresh proposal.
pub const PENDING_PROPOSAL: &str = "proposta da elaborare";

/// Column values for one enrolment row, keyed by request id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalUpdate {
    pub request_id: RequestId,
    /// Empty when the run cleared the row rather than proposing a date.
    pub proposal_state: String,
    pub lab_name: String,
    pub date_text: String,
    pub advice: String,
    pub venue: String,
    pub duration: String,
}

#[derive(Serialize)]
struct SheetRow<'a> {
    #[serde(rename = "firebase_id")]
    request_id: &'a str,
    #[serde(rename = "Proposta accettata")]
    proposal_state: &'a str,
    #[serde(rename = "Nome laboratorio proposto/accettato")]
    lab_name: &'a str,
    #[serde(rename = "Data e ora proposta/accettata")]
    date_text: &'a str,
    #[serde(rename = "consiglio AI")]
    advice: &'a str,
    #[serde(rename = "Sede incontro")]
    venue: &'a str,
    #[serde(rename = "Durata incontro")]
    duration: &'a str,
}

pub fn proposals_from_run(run: &StoredRun) -> Vec<ProposalUpdate> {
    run.records
        .iter()
        .filter(|record| !record.request_id.0.trim().is_empty())
        .map(|record| {
            let date_text = record
                .assigned_date
                .strip_prefix('\'')
                .unwrap_or(&record.assigned_date)
                .to_string();
            let lab_name = if record.assigned_lab.is_empty() {
                record.requested_lab.clone()
            } else {
                record.assigned_lab.clone()
            };
            let proposal_state = if date_text.is_empty() {
                String::new()
            } else {
                PENDING_PROPOSAL.to_string()
            };

            ProposalUpdate {
                request_id: RequestId(record.request_id.0.trim().to_string()),
                proposal_state,
                lab_name,
                date_text,
                advice: record.phase_label.clone(),
                venue: record.venue.clone(),
                duration: record.duration.clone(),
            }
        })
        .collect()
}

pub fn write_csv<W: Write>(writer: W, updates: &[ProposalUpdate]) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for update in updates {
        csv_writer.serialize(SheetRow {
            request_id: &update.request_id.0,
            proposal_state: &update.proposal_state,
            lab_name: &update.lab_name,
            date_text: &update.date_text,
            advice: &update.advice,
            venue: &update.venue,
            duration: &update.duration,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_csv(path: impl AsRef<Path>, updates: &[ProposalUpdate]) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_csv(file, updates)?;
    info!(path = %path.display(), rows = updates.len(), "proposal export written");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode proposal rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write proposal export: {0}")]
    Io(#[from] std::io::Error),
}
