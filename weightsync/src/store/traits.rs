use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Key/value persistence holding one JSON blob per key.
///
/// Each `set` must be all-or-nothing for its key; nothing is promised across
/// keys or across successive writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}
