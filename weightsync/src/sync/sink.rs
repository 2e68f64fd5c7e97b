//! Background merge and persistence of fetched entries.
//!
//! Entries are sent over an unbounded channel, so the producer never waits
//! on the store. The sink coalesces arrivals into time windows, folds each
//! window into the running merge and rewrites the user's snapshot after
//! every fold. Store failures are logged and counted; they never reach the
//! consumer of the record stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{MergePolicy, SyncConfig};
use crate::error::SyncError;
use crate::models::{RawWeightEntry, UserIdentity};
use crate::store::{KeyValueStore, SnapshotRepository};

use super::merge::MergeAccumulator;

/// Outcome of one sink run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Windows folded and written (or attempted).
    pub batches: usize,
    pub entries_received: usize,
    /// Snapshot size at the last successful write.
    pub entries_persisted: usize,
    pub write_failures: usize,
    /// Entries found in the cached snapshot at start.
    pub loaded_entries: usize,
}

/// Observes the completion of a sink.
#[derive(Clone)]
pub struct PersistenceHandle {
    rx: watch::Receiver<Option<SinkReport>>,
}

impl PersistenceHandle {
    /// The report, if the sink has already finished.
    pub fn report(&self) -> Option<SinkReport> {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the sink to finish.
    ///
    /// Returns `None` if the sink was never started or its task went away
    /// without reporting.
    pub async fn finished(&self) -> Option<SinkReport> {
        let mut rx = self.rx.clone();
        let report = match rx.wait_for(|report| report.is_some()).await {
            Ok(report) => (*report).clone(),
            Err(_) => None,
        };
        report
    }
}

/// Paired report sender and handle, for callers that spawn the sink later.
pub fn persistence_channel() -> (watch::Sender<Option<SinkReport>>, PersistenceHandle) {
    let (tx, rx) = watch::channel(None);
    (tx, PersistenceHandle { rx })
}

/// Sending side of a running sink. Dropping every clone ends the sink.
#[derive(Clone)]
pub struct SinkSender {
    tx: mpsc::UnboundedSender<RawWeightEntry>,
}

impl SinkSender {
    /// Queue an entry (never blocks). Returns `false` if the sink is gone.
    pub fn send(&self, entry: RawWeightEntry) -> bool {
        self.tx.send(entry).is_ok()
    }
}

pub struct MergeAndPersistSink {
    store: Arc<dyn KeyValueStore>,
    user: Arc<UserIdentity>,
    window: Duration,
    policy: MergePolicy,
}

impl MergeAndPersistSink {
    pub fn new(store: Arc<dyn KeyValueStore>, user: Arc<UserIdentity>, config: &SyncConfig) -> Self {
        Self {
            store,
            user,
            window: config.batch_window(),
            policy: config.merge_policy,
        }
    }

    /// Spawn on `tracker` and return the sender with a fresh completion handle.
    pub fn start(self, tracker: &TaskTracker) -> (SinkSender, PersistenceHandle) {
        let (report_tx, handle) = persistence_channel();
        let sender = self.spawn(tracker, report_tx);
        (sender, handle)
    }

    /// Spawn on `tracker`, publishing the final report through `report_tx`.
    pub fn spawn(
        self,
        tracker: &TaskTracker,
        report_tx: watch::Sender<Option<SinkReport>>,
    ) -> SinkSender {
        let (tx, rx) = mpsc::unbounded_channel();

        tracker.spawn(async move {
            let report = self.run(rx).await;
            report_tx.send_replace(Some(report));
        });

        SinkSender { tx }
    }

    /// Run until every sender is dropped and the last window is flushed.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<RawWeightEntry>) -> SinkReport {
        let mut report = SinkReport::default();
        let mut merged = MergeAccumulator::new(self.policy);

        match SnapshotRepository::load(self.store.as_ref(), &self.user).await {
            Ok(Some(snapshot)) => {
                report.loaded_entries = snapshot.entries.len();
                merged.fold(snapshot.entries);
            }
            Ok(None) => {}
            Err(e) => {
                let e = match e {
                    SyncError::StoreReadFailed(_) => e,
                    other => SyncError::StoreReadFailed(other.to_string()),
                };
                warn!(user_id = %self.user.user_id, error = %e, "Starting from an empty snapshot");
            }
        }

        debug!(
            user_id = %self.user.user_id,
            loaded = report.loaded_entries,
            window_ms = self.window.as_millis() as u64,
            "Persistence sink started"
        );

        loop {
            // Idle until the next arrival opens a window.
            let Some(first) = rx.recv().await else {
                break;
            };

            let mut batch = vec![first];
            let mut input_closed = false;
            let window = tokio::time::sleep(self.window);
            tokio::pin!(window);

            loop {
                tokio::select! {
                    _ = &mut window => break,
                    next = rx.recv() => match next {
                        Some(entry) => batch.push(entry),
                        None => {
                            input_closed = true;
                            break;
                        }
                    },
                }
            }

            self.flush(&mut merged, batch, &mut report).await;

            if input_closed {
                break;
            }
        }

        info!(
            user_id = %self.user.user_id,
            batches = report.batches,
            received = report.entries_received,
            persisted = report.entries_persisted,
            write_failures = report.write_failures,
            "Persistence sink finished"
        );

        report
    }

    async fn flush(
        &self,
        merged: &mut MergeAccumulator,
        batch: Vec<RawWeightEntry>,
        report: &mut SinkReport,
    ) {
        let batch_size = batch.len();
        let changed = merged.fold(batch);
        report.batches += 1;
        report.entries_received += batch_size;

        match SnapshotRepository::save(self.store.as_ref(), &self.user, merged.entries()).await {
            Ok(()) => {
                report.entries_persisted = merged.len();
                debug!(
                    user_id = %self.user.user_id,
                    batch_size,
                    changed,
                    total = merged.len(),
                    "Snapshot written"
                );
            }
            Err(e) => {
                let e = match e {
                    SyncError::StoreWriteFailed(_) => e,
                    other => SyncError::StoreWriteFailed(other.to_string()),
                };
                report.write_failures += 1;
                warn!(
                    user_id = %self.user.user_id,
                    batch_size,
                    error = %e,
                    "Failed to write snapshot"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::CachedSnapshot;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `fail_writes` writes, then behaves like `MemoryStore`.
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: usize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_writes {
                return Err(SyncError::StoreWriteFailed("disk full".to_string()));
            }
            self.inner.set(key, value).await
        }
    }

    fn user() -> Arc<UserIdentity> {
        Arc::new(UserIdentity::new("runner42", "42"))
    }

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    async fn stored(store: &MemoryStore) -> CachedSnapshot {
        SnapshotRepository::load(store, &user())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_group_arrivals() {
        let store = MemoryStore::new();
        let tracker = TaskTracker::new();
        let (sink, handle) =
            MergeAndPersistSink::new(Arc::new(store.clone()), user(), &config()).start(&tracker);

        for day in 1..=3 {
            sink.send(RawWeightEntry::new(format!("2024-01-0{day}"), 70_000, day));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        sink.send(RawWeightEntry::new("2024-02-01", 71_000, 10));
        sink.send(RawWeightEntry::new("2024-02-02", 71_500, 11));
        drop(sink);

        let report = handle.finished().await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.entries_received, 5);
        assert_eq!(report.entries_persisted, 5);
        assert_eq!(report.write_failures, 0);
        assert_eq!(stored(&store).await.entries.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_date_keeps_later_arrival() {
        let store = MemoryStore::new();
        let tracker = TaskTracker::new();
        let (sink, handle) =
            MergeAndPersistSink::new(Arc::new(store.clone()), user(), &config()).start(&tracker);

        sink.send(RawWeightEntry::new("2024-06-15", 70_000, 1));
        sink.send(RawWeightEntry::new("2024-06-15", 71_000, 2));
        drop(sink);

        let report = handle.finished().await.unwrap();
        assert_eq!(report.entries_persisted, 1);

        let snapshot = stored(&store).await;
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].weight_grams, 71_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merges_into_cached_snapshot() {
        let store = MemoryStore::new();
        SnapshotRepository::save(
            &store,
            &user(),
            vec![
                RawWeightEntry::new("2020-01-01", 80_000, 1),
                RawWeightEntry::new("2021-01-01", 79_000, 2),
            ],
        )
        .await
        .unwrap();

        let tracker = TaskTracker::new();
        let (sink, handle) =
            MergeAndPersistSink::new(Arc::new(store.clone()), user(), &config()).start(&tracker);
        sink.send(RawWeightEntry::new("2021-01-01", 78_500, 3));
        sink.send(RawWeightEntry::new("2022-01-01", 77_000, 4));
        drop(sink);

        let report = handle.finished().await.unwrap();
        assert_eq!(report.loaded_entries, 2);
        assert_eq!(report.entries_persisted, 3);

        let dates: Vec<_> = stored(&store)
            .await
            .entries
            .into_iter()
            .map(|e| (e.calendar_date, e.weight_grams))
            .collect();
        assert_eq!(
            dates,
            vec![
                ("2020-01-01".to_string(), 80_000),
                ("2021-01-01".to_string(), 78_500),
                ("2022-01-01".to_string(), 77_000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_counted_and_later_batches_write() {
        let memory = MemoryStore::new();
        let store = Arc::new(FlakyStore {
            inner: memory.clone(),
            fail_writes: 1,
            writes: AtomicUsize::new(0),
        });
        let tracker = TaskTracker::new();
        let (sink, handle) = MergeAndPersistSink::new(store, user(), &config()).start(&tracker);

        sink.send(RawWeightEntry::new("2024-01-01", 70_000, 1));
        tokio::time::sleep(Duration::from_millis(150)).await;
        sink.send(RawWeightEntry::new("2024-01-02", 70_100, 2));
        drop(sink);

        let report = handle.finished().await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.entries_persisted, 2);
        assert_eq!(stored(&memory).await.entries.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_input_means_no_write() {
        let store = MemoryStore::new();
        let tracker = TaskTracker::new();
        let (sink, handle) =
            MergeAndPersistSink::new(Arc::new(store.clone()), user(), &config()).start(&tracker);
        drop(sink);

        let report = handle.finished().await.unwrap();
        assert_eq!(report, SinkReport::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_finished_without_sink_is_none() {
        let (tx, handle) = persistence_channel();
        assert!(!handle.is_finished());
        drop(tx);
        assert_eq!(handle.finished().await, None);
    }
}
