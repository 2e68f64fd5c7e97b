use crate::error::{Result, SyncError};
use crate::models::{storage_key, CachedSnapshot, RawWeightEntry, UserIdentity};

use super::KeyValueStore;

pub struct SnapshotRepository;

impl SnapshotRepository {
    /// Load the cached snapshot for `user`, `Ok(None)` if none was ever written.
    pub async fn load(
        store: &dyn KeyValueStore,
        user: &UserIdentity,
    ) -> Result<Option<CachedSnapshot>> {
        let key = storage_key(user);
        let Some(value) = store.get(&key).await? else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::StoreReadFailed(format!("{key}: unreadable snapshot: {e}")))
    }

    pub async fn save(
        store: &dyn KeyValueStore,
        user: &UserIdentity,
        entries: Vec<RawWeightEntry>,
    ) -> Result<()> {
        let key = storage_key(user);
        let snapshot = CachedSnapshot {
            user: user.clone(),
            entries,
        };
        store.set(&key, serde_json::to_value(&snapshot)?).await
    }
}
