// Storage ports the queue depends on.
//
// The core says WHAT it needs from the storage engine, the profile store and
// the settings store; `infra` decides HOW. Every call here is atomic per key
// and nothing more: no cross-key transactions are assumed.

use super::queue_models::{RecordFields, SiteConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

#[derive(Debug, Error)]
#[error("Could not read fields for uid {uid}: {reason}")]
pub struct ProfileError {
    pub uid: i64,
    pub reason: String,
}

// ============================================================================
// STORAGE ENGINE (PORT)
// ============================================================================

/// Ordered sets plus flat field records, keyed by string.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add `member` to `set` with `score`, replacing any previous score.
    async fn add_to_ordered_set(
        &self,
        set: &str,
        score: i64,
        member: &str,
    ) -> Result<(), StorageError>;

    /// Remove `member` from `set`. Not an error if it isn't there.
    async fn remove_from_ordered_set(&self, set: &str, member: &str) -> Result<(), StorageError>;

    /// Members of `set` ordered by ascending score (ties by member),
    /// skipping `start` and returning at most `limit`.
    async fn range_ordered_set(
        &self,
        set: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, StorageError>;

    /// Number of members in `set`.
    async fn ordered_set_card(&self, set: &str) -> Result<u64, StorageError>;

    /// Write `fields` under `key`, merging into whatever is already there.
    async fn set_record(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError>;

    async fn get_record(&self, key: &str) -> Result<Option<RecordFields>, StorageError>;

    /// Delete `key` if it exists.
    async fn delete_record(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// PROFILES AND SETTINGS (PORTS)
// ============================================================================

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Raw stored values of the requested fields for `uid`.
    ///
    /// Fields the user doesn't have are simply absent from the map; only a
    /// genuine lookup failure is an error.
    async fn get_user_fields(
        &self,
        uid: i64,
        fields: &[&str],
    ) -> Result<HashMap<String, String>, ProfileError>;
}

#[async_trait]
pub trait SiteConfigStore: Send + Sync {
    /// Every stored setting, values as text.
    async fn load_settings(&self) -> Result<HashMap<String, String>, StorageError>;

    /// Current settings coerced into a [`SiteConfig`].
    async fn load_site_config(&self) -> Result<SiteConfig, StorageError> {
        Ok(SiteConfig::from_raw(&self.load_settings().await?))
    }
}

// Shared handles: lets one store back the service and still be reachable
// from the composition root.

#[async_trait]
impl<T: QueueStore + ?Sized> QueueStore for Arc<T> {
    async fn add_to_ordered_set(
        &self,
        set: &str,
        score: i64,
        member: &str,
    ) -> Result<(), StorageError> {
        (**self).add_to_ordered_set(set, score, member).await
    }

    async fn remove_from_ordered_set(&self, set: &str, member: &str) -> Result<(), StorageError> {
        (**self).remove_from_ordered_set(set, member).await
    }

    async fn range_ordered_set(
        &self,
        set: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        (**self).range_ordered_set(set, start, limit).await
    }

    async fn ordered_set_card(&self, set: &str) -> Result<u64, StorageError> {
        (**self).ordered_set_card(set).await
    }

    async fn set_record(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
        (**self).set_record(key, fields).await
    }

    async fn get_record(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
        (**self).get_record(key).await
    }

    async fn delete_record(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete_record(key).await
    }
}

#[async_trait]
impl<T: ProfileStore + ?Sized> ProfileStore for Arc<T> {
    async fn get_user_fields(
        &self,
        uid: i64,
        fields: &[&str],
    ) -> Result<HashMap<String, String>, ProfileError> {
        (**self).get_user_fields(uid, fields).await
    }
}
