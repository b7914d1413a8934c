//! # In-Memory Repository
//!
//! The reference implementation of the repository contract and the mirror
//! used by the durable backends. Records live in an owned arena guarded by one
//! lock per collection; every call takes the lock once for its whole duration,
//! and mutations go through the stored element's index.

use crate::domain::{Entity, ListParams};
use crate::errors::{KeystashError, Result};
use crate::storage::query;
use crate::storage::repository::{
    ensure_unique, merge_update, next_id_of, now, stamp_new, Repository,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Debug)]
pub struct MemoryRepository<E> {
    records: Arc<RwLock<Vec<E>>>,
}

// Clones share the same collection
impl<E> Clone for MemoryRepository<E> {
    fn clone(&self) -> Self {
        Self { records: Arc::clone(&self.records) }
    }
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Repository pre-filled with records, stored as given
    pub fn with_records(records: Vec<E>) -> Self {
        Self { records: Arc::new(RwLock::new(records)) }
    }

    /// Replace the whole collection (mirror reseed)
    pub async fn replace_all(&self, records: Vec<E>) {
        let mut guard = self.records.write().await;
        *guard = records;
    }

    /// Insert or overwrite a record exactly as given, keyed by ID
    pub async fn put(&self, record: E) -> E {
        let mut records = self.records.write().await;
        match records.iter().position(|r| r.id() == record.id()) {
            Some(index) => records[index] = record.clone(),
            None => records.push(record.clone()),
        }
        record
    }

    /// Remove a record by ID regardless of its deletion state
    pub async fn remove(&self, id: i64) -> Option<E> {
        let mut records = self.records.write().await;
        let index = records.iter().position(|r| r.id() == id)?;
        Some(records.remove(index))
    }

    /// Record by ID regardless of its deletion state
    pub async fn find(&self, id: i64) -> Option<E> {
        self.records.read().await.iter().find(|r| r.id() == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn next_id(&self) -> Result<i64> {
        next_id_of(self.records.read().await.iter())
    }

    async fn load(&self) -> Result<Vec<E>> {
        Ok(self.records.read().await.clone())
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "memory_get")]
    async fn get(&self, params: &ListParams) -> Result<Vec<E>> {
        let records = self.records.read().await;
        query::apply(records.iter().cloned(), params)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "memory_count")]
    async fn count(&self, params: &ListParams) -> Result<u64> {
        let records = self.records.read().await;
        query::count(records.iter(), params)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, record_name = %record.name()),
        name = "memory_create"
    )]
    async fn create(&self, mut record: E) -> Result<E> {
        let mut records = self.records.write().await;
        ensure_unique(records.iter(), &record, true)?;
        stamp_new(&mut record, next_id_of(records.iter())?);
        records.push(record.clone());

        tracing::debug!(entity = E::KIND, id = record.id(), "Created record in memory");
        Ok(record)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, id = record.id()),
        name = "memory_update"
    )]
    async fn update(&self, record: E) -> Result<E> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id() == record.id() && !r.is_deleted())
            .ok_or_else(|| KeystashError::not_found(E::KIND, record.id()))?;
        let updated = merge_update(&records[index], record);
        ensure_unique(records.iter(), &updated, false)?;
        records[index] = updated.clone();
        Ok(updated)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "memory_delete")]
    async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id() == id && (force || !r.is_deleted()))
            .ok_or_else(|| KeystashError::not_found(E::KIND, id))?;

        if force {
            records.remove(index);
        } else {
            let stamp = now();
            let stored = &mut records[index];
            stored.set_deleted_at(Some(stamp));
            stored.set_updated_at(stamp);
        }

        tracing::debug!(entity = E::KIND, id, force, "Deleted record in memory");
        Ok(())
    }
}
