use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};

use crate::error::{Result, SyncError};
use crate::models::UserIdentity;
use crate::remote::WeightSource;

/// Every calendar year from the birth year through `today`'s year, inclusive.
pub fn year_range(birth_date: NaiveDate, today: NaiveDate) -> Vec<i32> {
    (birth_date.year()..=today.year()).collect()
}

/// Works out which years of history to request for a user.
#[derive(Clone)]
pub struct YearRangeResolver {
    source: Arc<dyn WeightSource>,
}

impl YearRangeResolver {
    pub fn new(source: Arc<dyn WeightSource>) -> Self {
        Self { source }
    }

    pub async fn resolve(&self, user: &UserIdentity) -> Result<Vec<i32>> {
        self.resolve_at(user, Utc::now().date_naive()).await
    }

    pub async fn resolve_at(&self, user: &UserIdentity, today: NaiveDate) -> Result<Vec<i32>> {
        let profile = self.source.fetch_profile(user).await.map_err(|e| match e {
            SyncError::ProfileUnavailable(_) => e,
            other => SyncError::ProfileUnavailable(other.to_string()),
        })?;

        if profile.birth_date.year() > today.year() {
            return Err(SyncError::ProfileUnavailable(format!(
                "Birth date {} is after {}",
                profile.birth_date, today
            )));
        }

        let years = year_range(profile.birth_date, today);
        tracing::debug!(
            user_id = %user.user_id,
            first_year = years.first().copied(),
            last_year = years.last().copied(),
            "Resolved year range"
        );

        Ok(years)
    }
}
