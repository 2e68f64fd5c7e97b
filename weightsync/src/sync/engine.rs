use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::discovery::{valid_identities, IdentityDiscovery};
use crate::error::{Result, SyncError};
use crate::models::{UserIdentity, WeightRecord};
use crate::remote::WeightSource;
use crate::store::KeyValueStore;

use super::fetch::BoundedFetchScheduler;
use super::normalize::normalize;
use super::sink::{persistence_channel, MergeAndPersistSink, PersistenceHandle, SinkSender};
use super::years::YearRangeResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ResolvingYears,
    Fetching,
    Draining,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::ResolvingYears => "resolving_years",
            SessionState::Fetching => "fetching",
            SessionState::Draining => "draining",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records of one sync session, in fetch completion order.
///
/// Nothing runs until the first poll. A failed session ends with exactly one
/// `Err`. Dropping the stream stops dispatch of further years; entries from
/// fetches already in flight are still persisted.
pub struct WeightRecordStream {
    inner: BoxStream<'static, Result<WeightRecord>>,
    persistence: PersistenceHandle,
    state: watch::Receiver<SessionState>,
}

impl WeightRecordStream {
    /// Completion of this session's snapshot writes.
    pub fn persistence(&self) -> PersistenceHandle {
        self.persistence.clone()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl Stream for WeightRecordStream {
    type Item = Result<WeightRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Entry point for discovering the user and streaming their weight history.
#[derive(Clone)]
pub struct SyncEngine {
    source: Arc<dyn WeightSource>,
    discovery: Arc<dyn IdentityDiscovery>,
    store: Arc<dyn KeyValueStore>,
    config: SyncConfig,
    tracker: TaskTracker,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn WeightSource>,
        discovery: Arc<dyn IdentityDiscovery>,
        store: Arc<dyn KeyValueStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            discovery,
            store,
            config,
            tracker: TaskTracker::new(),
        }
    }

    /// First candidate profile that passes validation.
    pub async fn get_user(&self) -> Result<UserIdentity> {
        let candidates = self.discovery.candidates().await?;
        let found = candidates.len();

        match valid_identities(candidates).into_iter().next() {
            Some(user) => {
                info!(user_id = %user.user_id, display_name = %user.display_name, "Found user");
                Ok(user)
            }
            None => {
                warn!(candidates = found, "No valid user profile on page");
                Err(SyncError::NoUserFound)
            }
        }
    }

    pub fn get_weight_records(&self, user: &UserIdentity) -> WeightRecordStream {
        let user = Arc::new(user.clone());
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let state_tx = Arc::new(state_tx);
        let (report_tx, persistence) = persistence_channel();

        let engine = self.clone();
        let inner = stream! {
            let cancel = CancellationToken::new();
            let _cancel_on_drop = cancel.clone().drop_guard();

            let sink = MergeAndPersistSink::new(engine.store.clone(), user.clone(), &engine.config)
                .spawn(&engine.tracker, report_tx);

            let (record_tx, mut record_rx) = mpsc::unbounded_channel();
            engine.tracker.spawn(engine.clone().run_session(
                user,
                sink,
                record_tx,
                state_tx.clone(),
                cancel,
            ));

            let mut failed = false;
            while let Some(item) = record_rx.recv().await {
                failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }

            state_tx.send_replace(if failed {
                SessionState::Failed
            } else {
                SessionState::Completed
            });
        };

        WeightRecordStream {
            inner: Box::pin(inner),
            persistence,
            state: state_rx,
        }
    }

    /// Wait for every producer and sink spawned so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn run_session(
        self,
        user: Arc<UserIdentity>,
        sink: SinkSender,
        records: mpsc::UnboundedSender<Result<WeightRecord>>,
        state: Arc<watch::Sender<SessionState>>,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();

        state.send_replace(SessionState::ResolvingYears);
        let years = match YearRangeResolver::new(self.source.clone())
            .resolve(&user)
            .await
        {
            Ok(years) => years,
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e, "Could not resolve year range");
                state.send_replace(SessionState::Failed);
                let _ = records.send(Err(e));
                return;
            }
        };

        state.send_replace(SessionState::Fetching);
        let scheduler = BoundedFetchScheduler::new(
            self.source.clone(),
            self.config.max_concurrent_fetches,
            self.config.year_failure_policy,
        );
        let year_count = years.len();
        let mut entries = scheduler.fetch_entries(user.clone(), years, cancel.clone());

        let mut emitted = 0usize;
        while let Some(item) = entries.next().await {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(user_id = %user.user_id, error = %e, "Sync session failed");
                    state.send_replace(SessionState::Failed);
                    let _ = records.send(Err(e));
                    return;
                }
            };

            let record = normalize(&entry);
            if !sink.send(entry) {
                warn!(user_id = %user.user_id, "Persistence sink stopped early");
            }

            if records.send(Ok(record)).is_ok() {
                emitted += 1;
            } else if !cancel.is_cancelled() {
                debug!(user_id = %user.user_id, "Consumer went away, cancelling remaining years");
                cancel.cancel();
            }
        }

        state.send_replace(SessionState::Draining);
        info!(
            user_id = %user.user_id,
            years = year_count,
            records = emitted,
            cancelled = cancel.is_cancelled(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetch complete"
        );
        state.send_replace(SessionState::Completed);
    }
}
