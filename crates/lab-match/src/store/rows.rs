//! Wire shapes of the upstream nodes. Field names follow the upstream database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::workflows::matching::{
    AssignmentRecord, DestinationKind, HistoryRecord, LabDefinition, Request, RequestContact,
    RequestId, RunMeta, SlotDate, StoredRun,
};

pub(crate) const META_KEY: &str = "_meta";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LabRow {
    #[serde(default, deserialize_with = "loose_text")]
    titolo: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    destinatari: Option<String>,
    #[serde(default, deserialize_with = "date_list")]
    date_disponibili: Vec<String>,
    #[serde(default, deserialize_with = "loose_text")]
    durata_incontro: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    punto_incontro: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    area_tematica: Option<String>,
}

impl LabRow {
    pub(crate) fn into_definition(self) -> LabDefinition {
        LabDefinition {
            title: self.titolo.unwrap_or_default(),
            audience: self.destinatari.unwrap_or_default(),
            available_dates: self.date_disponibili,
            duration: self.durata_incontro,
            venue: self.punto_incontro,
            topic_area: self.area_tematica,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RequestRow {
    #[serde(default, deserialize_with = "loose_text")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lab_choices")]
    laboratori_richiesti: Vec<String>,
    #[serde(default, deserialize_with = "loose_text")]
    email: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    istituto_codice_mecc: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    istituto_circoscrizione: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    classe_livello: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    classe_sezione: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    insegnante_cellulare: Option<String>,
}

impl RequestRow {
    /// The row's own `id` wins over the node key when present.
    pub(crate) fn into_request(self, key: &str) -> Request {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| key.to_string());
        Request {
            id: RequestId(id),
            lab_choices: self.laboratori_richiesti,
            email: self.email.unwrap_or_default(),
            institute_code: self.istituto_codice_mecc.unwrap_or_default(),
            zone_code: self.istituto_circoscrizione,
            class_level: self.classe_livello.unwrap_or_default(),
            section: self.classe_sezione.unwrap_or_default(),
            contact_phone: self.insegnante_cellulare.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryRow {
    #[serde(default, deserialize_with = "loose_text")]
    id_firebase: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    firebase_id: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    nome_lab: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    data_lab: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    proposta_accettata: Option<String>,
    #[serde(default, deserialize_with = "loose_counter")]
    contatore_no: u32,
    #[serde(default, deserialize_with = "loose_text")]
    aggiornato_il: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    updated_at: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    timestamp: Option<String>,
}

impl HistoryRow {
    pub(crate) fn into_record(self) -> HistoryRecord {
        let request_id = first_filled([self.id_firebase, self.firebase_id]);
        let updated = first_filled([self.aggiornato_il, self.updated_at, self.timestamp]);
        HistoryRecord {
            request_id: request_id.map(|id| RequestId(id.trim().to_string())),
            lab_name: self.nome_lab.unwrap_or_default(),
            lab_date: self.data_lab.unwrap_or_default(),
            acceptance_state: self.proposta_accettata.unwrap_or_default(),
            rejection_counter: self.contatore_no,
            recorded_at: updated
                .as_deref()
                .and_then(SlotDate::parse)
                .map(|date| date.at()),
        }
    }
}

/// One persisted assignment, keyed by request id inside its run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResultRow {
    id: String,
    #[serde(rename = "labRichiesto", default, deserialize_with = "loose_string")]
    requested_lab: String,
    #[serde(rename = "labAssegnato", default, deserialize_with = "loose_string")]
    assigned_lab: String,
    #[serde(rename = "dataAssegnata", default, deserialize_with = "loose_string")]
    assigned_date: String,
    #[serde(rename = "punteggioEquita", default)]
    equity_score: f64,
    #[serde(rename = "faseAssegnazione", default, deserialize_with = "loose_string")]
    phase_label: String,
    #[serde(rename = "assegnato", default)]
    assigned: bool,
    #[serde(rename = "durata_incontro", default, deserialize_with = "loose_string")]
    duration: String,
    #[serde(rename = "sede", default, deserialize_with = "loose_string")]
    venue: String,
    #[serde(rename = "Priorita", default, skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(rename = "istituto", default, skip_serializing_if = "Option::is_none")]
    institute_code: Option<String>,
    #[serde(rename = "circoscrizione", default, skip_serializing_if = "Option::is_none")]
    zone_code: Option<String>,
    #[serde(rename = "classe", default, skip_serializing_if = "Option::is_none")]
    class_level: Option<String>,
    #[serde(rename = "sezione", default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    #[serde(
        rename = "insegnante_cellulare",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    contact_phone: Option<String>,
}

impl From<&AssignmentRecord> for ResultRow {
    fn from(record: &AssignmentRecord) -> Self {
        let contact = record.contact.as_ref();
        Self {
            id: record.request_id.0.clone(),
            requested_lab: record.requested_lab.clone(),
            assigned_lab: record.assigned_lab.clone(),
            assigned_date: record.assigned_date.clone(),
            equity_score: record.equity_score,
            phase_label: record.phase_label.clone(),
            assigned: record.assigned,
            duration: record.duration.clone(),
            venue: record.venue.clone(),
            priority: contact.map(|contact| contact.priority),
            email: contact.map(|contact| contact.email.clone()),
            institute_code: contact.map(|contact| contact.institute_code.clone()),
            zone_code: contact.map(|contact| contact.zone_code.clone()),
            class_level: contact.map(|contact| contact.class_level.clone()),
            section: contact.map(|contact| contact.section.clone()),
            contact_phone: contact.map(|contact| contact.contact_phone.clone()),
        }
    }
}

impl From<ResultRow> for AssignmentRecord {
    fn from(row: ResultRow) -> Self {
        let contact = row.priority.map(|priority| RequestContact {
            priority,
            email: row.email.unwrap_or_default(),
            institute_code: row.institute_code.unwrap_or_default(),
            zone_code: row.zone_code.unwrap_or_default(),
            class_level: row.class_level.unwrap_or_default(),
            section: row.section.unwrap_or_default(),
            contact_phone: row.contact_phone.unwrap_or_default(),
        });
        AssignmentRecord {
            request_id: RequestId(row.id),
            requested_lab: row.requested_lab,
            assigned_lab: row.assigned_lab,
            assigned_date: row.assigned_date,
            equity_score: row.equity_score,
            phase_label: row.phase_label,
            assigned: row.assigned,
            duration: row.duration,
            venue: row.venue,
            contact,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaRow {
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<DestinationKind>,
}

/// Lay a run out as `{ "_meta": ..., "<request id>": row, ... }`.
pub(crate) fn run_to_node(run: &StoredRun) -> Result<Value, serde_json::Error> {
    let mut node = Map::new();
    let meta = MetaRow {
        created_at: run.meta.created_at,
        count: run.meta.count,
        destination: run.meta.destination,
    };
    node.insert(META_KEY.to_string(), serde_json::to_value(meta)?);
    for record in &run.records {
        node.insert(
            record.request_id.0.clone(),
            serde_json::to_value(ResultRow::from(record))?,
        );
    }
    Ok(Value::Object(node))
}

/// Records come back ordered by request id.
pub(crate) fn run_from_node(run_id: i64, node: &Value) -> Result<StoredRun, String> {
    let Value::Object(entries) = node else {
        return Err(format!("run {run_id} is not an object"));
    };

    let mut records = Vec::new();
    let mut meta = None;
    for (key, value) in entries {
        if key == META_KEY {
            let row: MetaRow = serde_json::from_value(value.clone())
                .map_err(|err| format!("run {run_id} has unreadable metadata ({err})"))?;
            meta = Some(row);
            continue;
        }
        let row: ResultRow = serde_json::from_value(value.clone())
            .map_err(|err| format!("run {run_id} record {key} is unreadable ({err})"))?;
        records.push(AssignmentRecord::from(row));
    }

    let meta = match meta {
        Some(row) => RunMeta {
            created_at: row.created_at,
            count: row.count,
            destination: row.destination,
        },
        None => RunMeta {
            created_at: DateTime::<Utc>::from_timestamp_millis(run_id).unwrap_or_default(),
            count: records.len(),
            destination: None,
        },
    };

    Ok(StoredRun {
        run_id,
        meta,
        records,
    })
}

/// Iterate the rows of a node stored either as an object or as a sparse array.
pub(crate) fn node_entries(node: Option<&Value>) -> Vec<(String, &Value)> {
    match node {
        Some(Value::Object(entries)) => entries
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Vec::new(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Rows written by different tools spell some keys differently; the first non-blank wins.
fn first_filled<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_text))
}

fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.unwrap_or_default())
}

/// Numbers or numeric strings; anything else counts as zero.
fn loose_counter<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        Some(Value::String(text)) => leading_digits(&text),
        _ => 0,
    })
}

fn leading_digits(text: &str) -> u32 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Plain strings or `{ "datetime": ... }` objects, as a list or a keyed node.
fn date_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn entry(value: &Value) -> Option<String> {
        match value {
            Value::Object(fields) => fields.get("datetime").and_then(value_text),
            other => value_text(other),
        }
    }

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(entry).collect(),
        Some(Value::Object(fields)) if fields.contains_key("datetime") => {
            entry(&Value::Object(fields)).into_iter().collect()
        }
        Some(Value::Object(fields)) => fields.values().filter_map(entry).collect(),
        Some(other) => entry(&other).into_iter().collect(),
        None => Vec::new(),
    })
}

/// An ordered list or a comma separated string.
fn lab_choices<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(Value::Object(fields)) => fields.values().filter_map(value_text).collect(),
        Some(Value::String(text)) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    })
}
