use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::filter::RejectionPolicy;
use super::scoring::{ScoreWeights, ZonePriorities};

/// Node holding the lab catalog, shared by every destination.
pub const LABS_NODE: &str = "laboratori";

/// Residual requesters at or below which a lab counts as low demand.
pub const DEFAULT_LOW_DEMAND_THRESHOLD: usize = 3;

/// School level a run allocates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Primary,
    Secondary,
}

impl DestinationKind {
    pub const ALL: [DestinationKind; 2] = [DestinationKind::Primary, DestinationKind::Secondary];

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Primary => "primary",
            DestinationKind::Secondary => "secondary",
        }
    }

    pub fn destination(self) -> Destination {
        match self {
            DestinationKind::Primary => Destination {
                kind: self,
                audience_label: "Scuola Primaria".to_string(),
                requests_node: "richiesteprimarie".to_string(),
                history_node: "assegnazioni_primarie".to_string(),
                results_node: "risultati_assegnazione_primarie".to_string(),
            },
            DestinationKind::Secondary => Destination {
                kind: self,
                audience_label: "Scuola Secondaria di I grado".to_string(),
                requests_node: "richiestesecondarie".to_string(),
                history_node: "assegnazioni_secondarie".to_string(),
                results_node: "risultati_assegnazione_secondarie".to_string(),
            },
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDestination(pub String);

impl fmt::Display for UnknownDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown destination '{}'", self.0)
    }
}

impl std::error::Error for UnknownDestination {}

impl FromStr for DestinationKind {
    type Err = UnknownDestination;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" | "primarie" | "primaria" => Ok(DestinationKind::Primary),
            "secondary" | "secondarie" | "secondaria" => Ok(DestinationKind::Secondary),
            _ => Err(UnknownDestination(value.to_string())),
        }
    }
}

/// Audience label and storage nodes of one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub kind: DestinationKind,
    pub audience_label: String,
    pub requests_node: String,
    pub history_node: String,
    pub results_node: String,
}

/// Everything a run needs beyond the snapshot itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub destination: Destination,
    pub weights: ScoreWeights,
    pub zone_priorities: ZonePriorities,
    pub rejection_policy: RejectionPolicy,
    pub low_demand_threshold: usize,
}

impl RunConfig {
    pub fn for_destination(kind: DestinationKind) -> Self {
        Self {
            destination: kind.destination(),
            weights: ScoreWeights::default(),
            zone_priorities: ZonePriorities::default(),
            rejection_policy: RejectionPolicy::default(),
            low_demand_threshold: DEFAULT_LOW_DEMAND_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_parsing_accepts_both_languages() {
        assert_eq!("Primary".parse(), Ok(DestinationKind::Primary));
        assert_eq!("primarie".parse(), Ok(DestinationKind::Primary));
        assert_eq!(" secondarie ".parse(), Ok(DestinationKind::Secondary));
        assert_eq!(
            "tertiary".parse::<DestinationKind>(),
            Err(UnknownDestination("tertiary".to_string()))
        );
    }

    #[test]
    fn presets_point_at_their_own_nodes() {
        let primary = RunConfig::for_destination(DestinationKind::Primary);
        assert_eq!(primary.destination.audience_label, "Scuola Primaria");
        assert_eq!(primary.destination.history_node, "assegnazioni_primarie");
        assert_eq!(primary.low_demand_threshold, 3);

        let secondary = DestinationKind::Secondary.destination();
        assert_eq!(secondary.requests_node, "richiestesecondarie");
        assert_eq!(secondary.results_node, "risultati_assegnazione_secondarie");
    }
}
