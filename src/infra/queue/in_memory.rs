// In-memory implementation of QueueStore.
//
// Nothing survives a restart, so this is for tests and local runs. It follows
// the same per-key semantics as the SQLite store: each call touches one key
// and is atomic on its own.

use crate::core::queue::{QueueStore, RecordFields, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Ordered sets and records held in concurrent maps.
pub struct InMemoryQueueStore {
    /// Set name -> member -> score
    sets: DashMap<String, HashMap<String, i64>>,
    /// Record key -> fields
    records: DashMap<String, RecordFields>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            records: DashMap::new(),
        }
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn add_to_ordered_set(
        &self,
        set: &str,
        score: i64,
        member: &str,
    ) -> Result<(), StorageError> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn remove_from_ordered_set(&self, set: &str, member: &str) -> Result<(), StorageError> {
        if let Some(mut members) = self.sets.get_mut(set) {
            members.remove(member);
        }
        // Empty sets disappear, as they would in a key/value engine
        self.sets.remove_if(set, |_, members| members.is_empty());
        Ok(())
    }

    async fn range_ordered_set(
        &self,
        set: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        let mut members: Vec<(String, i64)> = match self.sets.get(set) {
            Some(members) => members
                .iter()
                .map(|(member, score)| (member.clone(), *score))
                .collect(),
            None => return Ok(Vec::new()),
        };

        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members.into_iter().skip(start).take(limit).collect())
    }

    async fn ordered_set_card(&self, set: &str) -> Result<u64, StorageError> {
        Ok(self.sets.get(set).map(|m| m.len() as u64).unwrap_or(0))
    }

    async fn set_record(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
        self.records
            .entry(key.to_string())
            .or_default()
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn get_record(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
        Ok(self.records.get(key).map(|entry| entry.clone()))
    }

    async fn delete_record(&self, key: &str) -> Result<(), StorageError> {
        self.records.remove(key);
        Ok(())
    }
}
