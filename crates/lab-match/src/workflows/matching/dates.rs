use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const CANONICAL_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

const DATE_TIME_FORMATS: [&str; 6] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];

/// A lab session start time, normalized so that equal instants compare equal
/// regardless of how the upstream sheet spelled them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotDate(NaiveDateTime);

impl SlotDate {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Parse any of the supported spellings. Returns `None` for malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_date_time(raw).map(Self)
    }

    pub fn at(&self) -> NaiveDateTime {
        self.0
    }

    pub fn is_before(&self, now: NaiveDateTime) -> bool {
        self.0 < now
    }

    /// Canonical `dd/mm/yyyy HH:MM:SS` spelling used in history keys and run output.
    pub fn canonical(&self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }
}

impl fmt::Display for SlotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl Serialize for SlotDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for SlotDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SlotDate::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized slot date '{raw}'")))
    }
}

fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim().trim_start_matches('\'').trim();
    if trimmed.is_empty() {
        return None;
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&collapsed, format) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&collapsed) {
        return Some(dt.naive_local());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&collapsed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
