use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{RawWeightEntry, UserIdentity, UserProfile};

/// Read access to a remote weight history service.
#[async_trait]
pub trait WeightSource: Send + Sync {
    /// Personal information for `user`, including the birth date.
    async fn fetch_profile(&self, user: &UserIdentity) -> Result<UserProfile>;

    /// All entries whose calendar date falls within `[start, end]` inclusive.
    async fn fetch_weight_range(
        &self,
        user: &UserIdentity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawWeightEntry>>;
}
