// Shared helpers for the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use weightsync::config::SyncConfig;
use weightsync::discovery::IdentityDiscovery;
use weightsync::error::{Result, SyncError};
use weightsync::models::{ProfileCandidate, RawWeightEntry, UserIdentity, UserProfile};
use weightsync::remote::WeightSource;
use weightsync::store::{KeyValueStore, MemoryStore};
use weightsync::sync::SyncEngine;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn runner() -> UserIdentity {
    UserIdentity::new("runner42", "123456")
}

/// Weight source with canned pages per year.
pub struct ScriptedSource {
    pub birth_date: NaiveDate,
    pages: HashMap<i32, Vec<RawWeightEntry>>,
    failing_years: HashSet<i32>,
    delay: Duration,
    pub profile_calls: AtomicUsize,
    pub range_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub requested_years: Mutex<Vec<i32>>,
}

impl ScriptedSource {
    pub fn new(birth_date: NaiveDate) -> Self {
        Self {
            birth_date,
            pages: HashMap::new(),
            failing_years: HashSet::new(),
            delay: Duration::from_millis(5),
            profile_calls: AtomicUsize::new(0),
            range_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requested_years: Mutex::new(Vec::new()),
        }
    }

    /// One entry on June 15th of every year in `years`.
    pub fn with_one_entry_per_year(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        for year in years {
            let entry = RawWeightEntry::new(
                format!("{year}-06-15"),
                70_000 + i64::from(year % 100),
                epoch_millis(date(year, 6, 15)),
            );
            self.pages.entry(year).or_default().push(entry);
        }
        self
    }

    pub fn with_page(mut self, year: i32, entries: Vec<RawWeightEntry>) -> Self {
        self.pages.insert(year, entries);
        self
    }

    pub fn failing(mut self, year: i32) -> Self {
        self.failing_years.insert(year);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl WeightSource for ScriptedSource {
    async fn fetch_profile(&self, user: &UserIdentity) -> Result<UserProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserProfile {
            display_name: user.display_name.clone(),
            birth_date: self.birth_date,
        })
    }

    async fn fetch_weight_range(
        &self,
        _user: &UserIdentity,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<RawWeightEntry>> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_years.lock().unwrap().push(start.year());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_years.contains(&start.year()) {
            return Err(SyncError::RemoteStatus {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        Ok(self.pages.get(&start.year()).cloned().unwrap_or_default())
    }
}

pub fn epoch_millis(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis()
}

/// Discovery returning a fixed list of raw candidate objects.
pub struct FixedDiscovery(pub Vec<Value>);

#[async_trait]
impl IdentityDiscovery for FixedDiscovery {
    async fn candidates(&self) -> Result<Vec<ProfileCandidate>> {
        Ok(self
            .0
            .iter()
            .cloned()
            .filter_map(ProfileCandidate::from_value)
            .collect())
    }
}

/// Store whose writes always fail; reads see nothing.
#[derive(Default)]
pub struct FailingStore {
    pub write_attempts: AtomicUsize,
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, key: &str, _value: Value) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::StoreWriteFailed(format!("{key}: read-only")))
    }
}

pub fn fast_config() -> SyncConfig {
    SyncConfig {
        batch_window_ms: 10,
        ..Default::default()
    }
}

pub fn engine_with(
    source: Arc<ScriptedSource>,
    store: Arc<dyn KeyValueStore>,
    config: SyncConfig,
) -> SyncEngine {
    SyncEngine::new(source, Arc::new(FixedDiscovery(Vec::new())), store, config)
}

pub fn memory_engine(source: Arc<ScriptedSource>) -> (SyncEngine, MemoryStore) {
    let store = MemoryStore::new();
    let engine = engine_with(source, Arc::new(store.clone()), fast_config());
    (engine, store)
}
