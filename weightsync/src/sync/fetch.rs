use std::sync::Arc;

use async_stream::stream;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, FuturesUnordered};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::YearFailurePolicy;
use crate::error::{Result, SyncError};
use crate::models::{RawWeightEntry, UserIdentity};
use crate::remote::WeightSource;

/// Entries returned for one calendar year.
#[derive(Debug, Clone)]
pub struct YearPage {
    pub year: i32,
    pub entries: Vec<RawWeightEntry>,
}

/// First and last day of `year`.
pub fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    start
        .zip(end)
        .ok_or_else(|| SyncError::Validation(format!("Year {year} is out of range")))
}

/// Fetches one page per year with a cap on requests in flight.
#[derive(Clone)]
pub struct BoundedFetchScheduler {
    source: Arc<dyn WeightSource>,
    max_in_flight: usize,
    failure_policy: YearFailurePolicy,
}

impl BoundedFetchScheduler {
    pub fn new(
        source: Arc<dyn WeightSource>,
        max_in_flight: usize,
        failure_policy: YearFailurePolicy,
    ) -> Self {
        Self {
            source,
            max_in_flight: max_in_flight.max(1),
            failure_policy,
        }
    }

    /// Pages in completion order.
    ///
    /// Once `cancel` fires no further years are dispatched; pages for years
    /// already in flight are still yielded. Under `YearFailurePolicy::Abort`
    /// the first failure is yielded as `YearFetchFailed` and ends the stream.
    pub fn fetch_pages(
        &self,
        user: Arc<UserIdentity>,
        years: Vec<i32>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<YearPage>> {
        let source = self.source.clone();
        let max_in_flight = self.max_in_flight;
        let failure_policy = self.failure_policy;

        Box::pin(stream! {
            let mut queue = years.into_iter();
            let mut in_flight = FuturesUnordered::new();

            loop {
                while in_flight.len() < max_in_flight && !cancel.is_cancelled() {
                    let Some(year) = queue.next() else {
                        break;
                    };
                    debug!(year, in_flight = in_flight.len() + 1, "Dispatching year fetch");
                    in_flight.push(fetch_year(source.clone(), user.clone(), year));
                }

                let Some((year, result)) = in_flight.next().await else {
                    break;
                };

                match result {
                    Ok(entries) => {
                        debug!(year, entries = entries.len(), "Year fetch complete");
                        yield Ok(YearPage { year, entries });
                    }
                    Err(e) => {
                        let failure = SyncError::YearFetchFailed {
                            year,
                            reason: e.to_string(),
                        };
                        match failure_policy {
                            YearFailurePolicy::Abort => {
                                yield Err(failure);
                                break;
                            }
                            YearFailurePolicy::Skip => {
                                warn!(year, error = %failure, "Skipping year after failed fetch");
                            }
                        }
                    }
                }
            }
        })
    }

    /// The union of all pages as a single sequence of entries.
    pub fn fetch_entries(
        &self,
        user: Arc<UserIdentity>,
        years: Vec<i32>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<RawWeightEntry>> {
        self.fetch_pages(user, years, cancel)
            .flat_map(|page| {
                let items: Vec<Result<RawWeightEntry>> = match page {
                    Ok(page) => page.entries.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed()
    }
}

async fn fetch_year(
    source: Arc<dyn WeightSource>,
    user: Arc<UserIdentity>,
    year: i32,
) -> (i32, Result<Vec<RawWeightEntry>>) {
    let result = match year_bounds(year) {
        Ok((start, end)) => source.fetch_weight_range(&user, start, end).await,
        Err(e) => Err(e),
    };
    (year, result)
}
