//! Copy every record from one store into another.
//!
//! Records are read with `load` (soft-deleted ones included) and written with
//! `create`, which keeps their IDs, UIDs and timestamps. Individual failures are
//! collected in the report instead of aborting the run.

use crate::domain::Entity;
use crate::errors::Result;
use crate::storage::repository::Repository;
use crate::storage::store::Store;
use tracing::{info, warn};

/// A record that could not be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    pub entity: &'static str,
    pub id: i64,
    pub error: String,
}

/// Summary of a copy run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopyReport {
    pub folders: usize,
    pub paths: usize,
    pub secrets: usize,
    pub failed: Vec<CopyFailure>,
}

impl CopyReport {
    pub fn copied(&self) -> usize {
        self.folders + self.paths + self.secrets
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copy one collection; returns how many records were written
pub async fn copy_collection<E: Entity>(
    from: &dyn Repository<E>,
    to: &dyn Repository<E>,
    failed: &mut Vec<CopyFailure>,
) -> Result<usize> {
    let mut records = from.load().await?;
    records.sort_by_key(|r| r.id());

    let mut copied = 0;
    for record in records {
        let id = record.id();
        match to.create(record).await {
            Ok(_) => copied += 1,
            Err(e) => {
                warn!(entity = E::KIND, id, error = %e, "Failed to copy record");
                failed.push(CopyFailure { entity: E::KIND, id, error: e.to_string() });
            }
        }
    }
    Ok(copied)
}

/// Copy folders, paths and secrets from `from` into `to`
pub async fn copy_all(from: &Store, to: &Store) -> Result<CopyReport> {
    let mut report = CopyReport::default();
    let failed = &mut report.failed;
    report.folders = copy_collection(from.folders.as_ref(), to.folders.as_ref(), failed).await?;
    report.paths = copy_collection(from.paths.as_ref(), to.paths.as_ref(), failed).await?;
    report.secrets = copy_collection(from.secrets.as_ref(), to.secrets.as_ref(), failed).await?;

    info!(
        from = from.backend(),
        to = to.backend(),
        copied = report.copied(),
        failed = report.failed.len(),
        "Copied store contents"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeletedMode, Folder, ListParams, Path, Secret};

    #[tokio::test]
    async fn test_copy_preserves_identity_and_deletions() {
        let source = Store::in_memory();
        let root = source.folders.create(Folder::new(0, "root")).await.unwrap();
        let path = source.paths.create(Path::new(0, "prod")).await.unwrap();
        let old = source.secrets.create(Secret::new(path.id, "A", "1", "int")).await.unwrap();
        source.secrets.delete(old.id, false).await.unwrap();
        let live = source.secrets.create(Secret::new(path.id, "A", "2", "int")).await.unwrap();

        let target = Store::in_memory();
        let report = copy_all(&source, &target).await.unwrap();
        assert!(report.is_complete());
        assert_eq!((report.folders, report.paths, report.secrets), (1, 1, 2));

        assert_eq!(target.folders.get_by_id(root.id).await.unwrap(), root);
        assert_eq!(target.secrets.get_by_uid(&live.uid).await.unwrap(), live);
        let deleted = target
            .secrets
            .get(&ListParams::new().with_deleted(DeletedMode::Deleted))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, old.id);
        assert_eq!(target.secrets.next_id().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_copy_reports_conflicts() {
        let source = Store::in_memory();
        source.folders.create(Folder::new(0, "root")).await.unwrap();

        let target = Store::in_memory();
        target.folders.create(Folder::new(0, "root")).await.unwrap();

        let report = copy_all(&source, &target).await.unwrap();
        assert_eq!(report.copied(), 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entity, "folder");
    }
}
