//! # Write-Through Mirror
//!
//! [`Mirrored`] wraps a durable repository with an in-memory copy of its
//! collection. Reads are served from the copy; writes go to the durable store
//! first and are applied to the copy only after they succeed, so a failed write
//! never shows up in reads. When the durable write succeeds but updating the
//! copy does not, the divergence is logged and [`Mirrored::resync`] restores it.

use crate::domain::{DeletedMode, Entity, ListParams};
use crate::errors::Result;
use crate::storage::memory::MemoryRepository;
use crate::storage::repository::Repository;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn, Instrument};

pub struct Mirrored<E: Entity> {
    physical: Arc<dyn Repository<E>>,
    mirror: MemoryRepository<E>,
    // Held across the durable write and the mirror write so both sides apply
    // concurrent writes in the same order
    write_lock: Arc<Mutex<()>>,
}

impl<E: Entity> Clone for Mirrored<E> {
    fn clone(&self) -> Self {
        Self {
            physical: Arc::clone(&self.physical),
            mirror: self.mirror.clone(),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<E: Entity> Mirrored<E> {
    /// Wrap `physical` and seed the mirror from its full contents
    pub async fn new(physical: Arc<dyn Repository<E>>) -> Result<Self> {
        let records = physical.load().await?;
        info!(
            entity = E::KIND,
            backend = physical.backend(),
            records = records.len(),
            "Seeded in-memory mirror"
        );
        Ok(Self {
            physical,
            mirror: MemoryRepository::with_records(records),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Reload the mirror from the durable store
    pub async fn resync(&self) -> Result<usize> {
        let span = crate::repo_span!(self.physical.backend(), E::KIND, "resync");
        async {
            let _guard = self.write_lock.lock().await;
            let records = self.physical.load().await?;
            let count = records.len();
            self.mirror.replace_all(records).await;
            info!(
                entity = E::KIND,
                backend = self.physical.backend(),
                records = count,
                "Resynced mirror"
            );
            Ok::<_, crate::errors::KeystashError>(count)
        }
        .instrument(span)
        .await
    }

    pub fn physical(&self) -> &Arc<dyn Repository<E>> {
        &self.physical
    }

    pub fn mirror(&self) -> &MemoryRepository<E> {
        &self.mirror
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for Mirrored<E> {
    fn backend(&self) -> &'static str {
        self.physical.backend()
    }

    async fn next_id(&self) -> Result<i64> {
        self.physical.next_id().await
    }

    async fn load(&self) -> Result<Vec<E>> {
        self.physical.load().await
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "mirror_get")]
    async fn get(&self, params: &ListParams) -> Result<Vec<E>> {
        self.mirror.get(params).await
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "mirror_count")]
    async fn count(&self, params: &ListParams) -> Result<u64> {
        self.mirror.count(params).await
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, record_name = %record.name()),
        name = "mirror_create"
    )]
    async fn create(&self, record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let created = self.physical.create(record).await?;
        self.mirror.put(created.clone()).await;
        Ok(created)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, id = record.id()),
        name = "mirror_update"
    )]
    async fn update(&self, record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let id = record.id();
        // Staged copy, restored if the durable write fails
        let previous = self.mirror.find(id).await;

        match self.physical.update(record).await {
            Ok(updated) => {
                self.mirror.put(updated.clone()).await;
                Ok(updated)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.mirror.put(previous).await;
                }
                warn!(
                    entity = E::KIND,
                    id,
                    error = %e,
                    "Durable update failed; mirror left unchanged"
                );
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "mirror_delete")]
    async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.physical.delete(id, force).await?;

        if force {
            if self.mirror.remove(id).await.is_none() {
                error!(
                    entity = E::KIND,
                    id,
                    action = "delete",
                    "Mirror diverged from durable store: record missing from mirror; call resync()"
                );
            }
            return Ok(());
        }

        // Copy the durable soft-delete stamps so both sides agree exactly
        let params = ListParams::new().with_ids([id]).with_deleted(DeletedMode::Both);
        match self.physical.get(&params).await {
            Ok(mut found) if !found.is_empty() => {
                self.mirror.put(found.remove(0)).await;
            }
            Ok(_) => {
                error!(
                    entity = E::KIND,
                    id,
                    action = "delete",
                    "Mirror diverged from durable store: deleted record not readable; call resync()"
                );
            }
            Err(e) => {
                error!(
                    entity = E::KIND,
                    id,
                    action = "delete",
                    error = %e,
                    "Mirror diverged from durable store; call resync()"
                );
            }
        }
        Ok(())
    }
}
