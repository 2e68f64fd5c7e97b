use serde::Deserialize;
use std::env;
use std::time::Duration;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// What a session does when a single year page cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearFailurePolicy {
    /// End the consumer sequence with `YearFetchFailed` and dispatch nothing more.
    #[default]
    Abort,
    /// Log the failed year and keep fetching the others.
    Skip,
}

impl std::str::FromStr for YearFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("Unknown year failure policy: {s}")),
        }
    }
}

/// How the sink resolves two entries for the same calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The entry that arrived last wins.
    #[default]
    ArrivalOrder,
    /// The entry with the later measurement timestamp wins; on a tie the stored entry stays.
    NewestMeasurement,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arrival" | "arrival_order" => Ok(Self::ArrivalOrder),
            "newest" | "newest_measurement" => Ok(Self::NewestMeasurement),
            _ => Err(format!("Unknown merge policy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub garmin: GarminConfig,
    pub sync: SyncConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GarminConfig {
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

/// Tuning for a single sync session.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub max_concurrent_fetches: usize,
    pub batch_window_ms: u64,
    pub year_failure_policy: YearFailurePolicy,
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub busy_timeout_ms: u64,
}

impl SyncConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            batch_window_ms: 100,
            year_failure_policy: YearFailurePolicy::Abort,
            merge_policy: MergePolicy::ArrivalOrder,
        }
    }
}

impl Default for GarminConfig {
    fn default() -> Self {
        Self {
            base_url: "https://connect.garmin.com".to_string(),
            session_cookie: None,
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let sync_defaults = SyncConfig::default();

        Self {
            garmin: GarminConfig {
                base_url: env::var("GARMIN_BASE_URL")
                    .unwrap_or_else(|_| "https://connect.garmin.com".to_string()),
                session_cookie: env::var("GARMIN_SESSION_COOKIE").ok(),
                auth_token: env::var("GARMIN_AUTH_TOKEN").ok(),
                timeout_secs: parse_env_or("GARMIN_TIMEOUT", 30),
            },
            sync: SyncConfig {
                max_concurrent_fetches: parse_env_or(
                    "SYNC_MAX_CONCURRENT_FETCHES",
                    sync_defaults.max_concurrent_fetches,
                )
                .max(1),
                batch_window_ms: parse_env_or("SYNC_BATCH_WINDOW_MS", sync_defaults.batch_window_ms),
                year_failure_policy: parse_env_or(
                    "SYNC_YEAR_FAILURE_POLICY",
                    sync_defaults.year_failure_policy,
                ),
                merge_policy: parse_env_or("SYNC_MERGE_POLICY", sync_defaults.merge_policy),
            },
            store: StoreConfig {
                url: env::var("STORE_URL").unwrap_or_else(|_| "file:weightsync.db".to_string()),
                auth_token: env::var("STORE_AUTH_TOKEN").ok(),
                busy_timeout_ms: parse_env_or("STORE_BUSY_TIMEOUT_MS", 5000),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
