use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;

use crate::workflows::matching::{
    DestinationKind, RejectionPolicy, RunConfig, ScoreWeights, ZonePriorities,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub matching: MatchingSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let store_path = env::var("APP_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/store.json"));
        let weights_path = env::var("MATCH_WEIGHTS_PATH").ok().map(PathBuf::from);

        let rejection_limit = match env::var("MATCH_REJECTION_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRejectionLimit)?,
            Err(_) => RejectionPolicy::DEFAULT_LIMIT,
        };

        let reassignment_months = match env::var("MATCH_REASSIGNMENT_MONTHS") {
            Ok(raw) => parse_months(&raw)?,
            Err(_) => RejectionPolicy::default().reassignment_months,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            matching: MatchingSettings {
                store_path,
                weights_path,
                rejection_limit,
                reassignment_months,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the snapshot lives and how runs are tuned.
#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub store_path: PathBuf,
    pub weights_path: Option<PathBuf>,
    pub rejection_limit: u32,
    pub reassignment_months: BTreeSet<u32>,
}

/// Optional override file for the scoring rubric.
#[derive(Debug, Default, Deserialize)]
struct WeightsFile {
    #[serde(default)]
    weights: Option<ScoreWeights>,
    #[serde(default)]
    zone_priorities: Option<ZonePriorities>,
}

impl MatchingSettings {
    pub fn rejection_policy(&self) -> RejectionPolicy {
        RejectionPolicy {
            limit: self.rejection_limit,
            reassignment_months: self.reassignment_months.clone(),
        }
    }

    /// Build the run configuration for one destination, applying the weights file if configured.
    pub fn run_config(&self, kind: DestinationKind) -> Result<RunConfig, ConfigError> {
        let mut config = RunConfig::for_destination(kind);
        config.rejection_policy = self.rejection_policy();

        if let Some(path) = &self.weights_path {
            let raw = std::fs::read_to_string(path).map_err(|source| {
                ConfigError::WeightsUnreadable {
                    path: path.clone(),
                    source,
                }
            })?;
            let file: WeightsFile =
                serde_json::from_str(&raw).map_err(|source| ConfigError::WeightsInvalid {
                    path: path.clone(),
                    source,
                })?;
            if let Some(weights) = file.weights {
                config.weights = weights;
            }
            if let Some(zones) = file.zone_priorities {
                config.zone_priorities = zones;
            }
        }

        Ok(config)
    }
}

fn parse_months(raw: &str) -> Result<BTreeSet<u32>, ConfigError> {
    let mut months = BTreeSet::new();
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let month = trimmed
            .parse::<u32>()
            .ok()
            .filter(|month| (1..=12).contains(month))
            .ok_or_else(|| ConfigError::InvalidMonths(raw.to_string()))?;
        months.insert(month);
    }
    Ok(months)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidRejectionLimit,
    InvalidMonths(String),
    WeightsUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    WeightsInvalid {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRejectionLimit => {
                write!(f, "MATCH_REJECTION_LIMIT must be a non-negative integer")
            }
            ConfigError::InvalidMonths(raw) => write!(
                f,
                "MATCH_REASSIGNMENT_MONTHS must list months between 1 and 12, got '{raw}'"
            ),
            ConfigError::WeightsUnreadable { path, .. } => {
                write!(f, "unable to read weights file {}", path.display())
            }
            ConfigError::WeightsInvalid { path, .. } => {
                write!(f, "weights file {} is not valid JSON", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidRejectionLimit
            | ConfigError::InvalidMonths(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::WeightsUnreadable { source, .. } => Some(source),
            ConfigError::WeightsInvalid { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_STORE_PATH");
        env::remove_var("MATCH_WEIGHTS_PATH");
        env::remove_var("MATCH_REJECTION_LIMIT");
        env::remove_var("MATCH_REASSIGNMENT_MONTHS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.matching.store_path, PathBuf::from("data/store.json"));
        assert_eq!(config.matching.rejection_limit, 3);
        assert_eq!(
            config.matching.reassignment_months,
            [2, 3, 4, 5, 6, 7].into_iter().collect()
        );
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_months() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MATCH_REASSIGNMENT_MONTHS", "2,13");
        let error = AppConfig::load().expect_err("month 13 rejected");
        assert!(matches!(error, ConfigError::InvalidMonths(_)));
        reset_env();
    }

    #[test]
    fn weights_file_overrides_defaults() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"zone_priorities": {{"9": 7}}, "weights": {{
                "territorial_equity_base_weight": 10.0,
                "institute_equity_base_weight": 15.0,
                "institute_equity_multiplier": 1.0,
                "email_equity_multiplier": 1.0,
                "email_max_assignments_penalty": 100.0,
                "lab_popularity_penalty_weight": 5.0,
                "zone_variety_penalty_weight": 50.0,
                "fallback_multiplier": 0.5
            }}}}"#
        )
        .expect("write weights");
        env::set_var("MATCH_WEIGHTS_PATH", file.path());

        let config = AppConfig::load().expect("config loads");
        let run = config
            .matching
            .run_config(DestinationKind::Primary)
            .expect("weights file parses");
        assert_eq!(run.weights.territorial_equity_base_weight, 10.0);
        assert_eq!(run.weights.fallback_multiplier, 0.5);
        assert_eq!(run.zone_priorities.priority_for("9"), 7.0);
        assert_eq!(run.zone_priorities.priority_for("2"), 0.0);
        reset_env();
    }
}
