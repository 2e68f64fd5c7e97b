use serde::{Deserialize, Serialize};

use super::{RawWeightEntry, UserIdentity};

pub const STORAGE_KEY_PREFIX: &str = "weight-sync_";

/// Store key holding the cached snapshot for a user.
pub fn storage_key(user: &UserIdentity) -> String {
    format!("{STORAGE_KEY_PREFIX}{}", user.user_id)
}

/// Merged weight history for a user as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedSnapshot {
    pub user: UserIdentity,
    pub entries: Vec<RawWeightEntry>,
}
