//! # Repository Contract
//!
//! One async trait per entity type, implemented identically by every backend
//! (memory, database, key-value, file) and by the write-through [`Mirrored`]
//! decorator.
//!
//! [`Mirrored`]: crate::storage::Mirrored

use crate::domain::{new_uid, Entity, ListParams};
use crate::errors::{KeystashError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;

// Repository trait

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Short backend name used in logs ("memory", "database", ...)
    fn backend(&self) -> &'static str;

    /// The ID the next created record will receive
    async fn next_id(&self) -> Result<i64>;

    /// Dump every record, deleted ones included, bypassing all filters.
    ///
    /// Reads the physical store even when a mirror is configured, so it can
    /// reseed a mirror or copy a collection into another backend.
    async fn load(&self) -> Result<Vec<E>>;

    /// Records matching the descriptor, sorted and paginated
    async fn get(&self, params: &ListParams) -> Result<Vec<E>>;

    /// Number of records matching the descriptor's filters
    async fn count(&self, params: &ListParams) -> Result<u64>;

    /// Store a new record. Fails with `AlreadyExists` when a live record holds
    /// the same `(parent, name)` pair.
    async fn create(&self, record: E) -> Result<E>;

    /// Replace the mutable fields of a live record. Fails with `NotFound` when
    /// no live record has the record's ID.
    async fn update(&self, record: E) -> Result<E>;

    /// Soft delete (`force == false`) stamps `deleted_at`; a forced delete
    /// removes the record, including an already soft-deleted one.
    async fn delete(&self, id: i64, force: bool) -> Result<()>;

    /// The live record with this ID
    async fn get_by_id(&self, id: i64) -> Result<E> {
        self.get(&ListParams::new().with_ids([id]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KeystashError::not_found(E::KIND, id))
    }

    /// The live record with this UID
    async fn get_by_uid(&self, uid: &str) -> Result<E> {
        self.get(&ListParams::new().with_uids([uid]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KeystashError::not_found(E::KIND, uid))
    }

    /// Matching records indexed by ID
    async fn get_map_by_id(&self, params: &ListParams) -> Result<HashMap<i64, E>> {
        Ok(self.get(params).await?.into_iter().map(|r| (r.id(), r)).collect())
    }

    /// Matching records indexed by UID
    async fn get_map_by_uid(&self, params: &ListParams) -> Result<HashMap<String, E>> {
        Ok(self.get(params).await?.into_iter().map(|r| (r.uid().to_string(), r)).collect())
    }
}

/// Current time at the precision every backend round-trips exactly
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fill in identity and timestamps for a record about to be created.
///
/// Caller-supplied identity and timestamps are kept, which lets a seeding run
/// reproduce records exactly.
pub fn stamp_new<E: Entity>(record: &mut E, next_id: i64) {
    if record.id() == 0 {
        record.set_id(next_id);
    }
    if record.uid().is_empty() {
        record.set_uid(new_uid());
    }
    let unset = DateTime::<Utc>::default();
    if record.created_at() == unset {
        let now = now();
        record.set_created_at(now);
        record.set_updated_at(now);
    } else if record.updated_at() == unset {
        record.set_updated_at(record.created_at());
    }
}

/// Build the stored form of an update: identity, creation and deletion stamps
/// come from the current record, everything else from the incoming one.
pub fn merge_update<E: Entity>(current: &E, mut incoming: E) -> E {
    incoming.set_uid(current.uid().to_string());
    incoming.set_created_at(current.created_at());
    incoming.set_deleted_at(current.deleted_at());
    incoming.set_updated_at(now());
    incoming
}

/// Reject a caller-supplied ID that can never be allocated
pub fn ensure_valid_id<E: Entity>(candidate: &E) -> Result<()> {
    if candidate.id() < 0 {
        return Err(KeystashError::invalid_field(
            format!("{} ID must not be negative, got {}", E::KIND, candidate.id()),
            "id",
        ));
    }
    Ok(())
}

/// Fail with `AlreadyExists` if a live `candidate` collides with a live record
/// other than itself, reuses an existing ID when it is new, or carries a UID
/// that another record (deleted or not) already holds.
pub fn ensure_unique<'a, E, I>(existing: I, candidate: &E, is_new: bool) -> Result<()>
where
    E: Entity,
    I: IntoIterator<Item = &'a E>,
{
    if is_new {
        ensure_valid_id(candidate)?;
    }
    for record in existing {
        if is_new && candidate.id() != 0 && record.id() == candidate.id() {
            return Err(KeystashError::already_exists(
                format!("{} with ID {} already exists", E::KIND, candidate.id()),
                E::KIND,
            ));
        }
        if !candidate.uid().is_empty()
            && record.uid() == candidate.uid()
            && (is_new || record.id() != candidate.id())
        {
            return Err(KeystashError::already_exists(
                format!("{} with UID '{}' already exists", E::KIND, candidate.uid()),
                E::KIND,
            ));
        }
        if record.id() != candidate.id()
            && !record.is_deleted()
            && !candidate.is_deleted()
            && record.same_key(candidate)
        {
            return Err(KeystashError::already_exists(
                format!(
                    "{} '{}' already exists under parent {}",
                    E::KIND,
                    candidate.name(),
                    candidate.parent_id()
                ),
                E::KIND,
            ));
        }
    }
    Ok(())
}

/// ID following `max`; fails once the ID space is exhausted
pub fn successor_id(kind: &str, max: i64) -> Result<i64> {
    max.max(0).checked_add(1).ok_or_else(|| {
        KeystashError::invalid_field(format!("{} ID space exhausted after {}", kind, max), "id")
    })
}

/// Next ID for a collection: one greater than the current maximum
pub fn next_id_of<'a, E, I>(records: I) -> Result<i64>
where
    E: Entity,
    I: IntoIterator<Item = &'a E>,
{
    successor_id(E::KIND, records.into_iter().map(Entity::id).max().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Folder;

    #[test]
    fn test_stamp_new_assigns_identity() {
        let mut folder = Folder::new(0, "root");
        stamp_new(&mut folder, 7);
        assert_eq!(folder.id, 7);
        assert!(!folder.uid.is_empty());
        assert_eq!(folder.created_at, folder.updated_at);
    }

    #[test]
    fn test_stamp_new_keeps_supplied_identity() {
        let created_at = now() - chrono::Duration::days(1);
        let mut folder =
            Folder { id: 3, uid: "fixed".to_string(), created_at, ..Folder::new(0, "root") };
        stamp_new(&mut folder, 7);
        assert_eq!(folder.id, 3);
        assert_eq!(folder.uid, "fixed");
        assert_eq!(folder.created_at, created_at);
        assert_eq!(folder.updated_at, created_at);
    }

    #[test]
    fn test_merge_update_preserves_identity() {
        let mut current = Folder::new(0, "root");
        stamp_new(&mut current, 1);
        let incoming = Folder { id: 1, ..Folder::new(0, "renamed") };

        let merged = merge_update(&current, incoming);
        assert_eq!(merged.uid, current.uid);
        assert_eq!(merged.created_at, current.created_at);
        assert_eq!(merged.name, "renamed");
    }

    #[test]
    fn test_ensure_unique() {
        let mut live = Folder::new(0, "root");
        stamp_new(&mut live, 1);
        let existing = vec![live.clone()];

        let duplicate = Folder::new(0, "root");
        assert!(ensure_unique(&existing, &duplicate, true).unwrap_err().is_already_exists());

        let other_parent = Folder::new(1, "root");
        assert!(ensure_unique(&existing, &other_parent, true).is_ok());

        // A record never collides with itself on update
        assert!(ensure_unique(&existing, &live, false).is_ok());

        let mut deleted = live.clone();
        deleted.deleted_at = Some(now());
        assert!(ensure_unique(&[deleted.clone()], &duplicate, true).is_ok());

        // A soft-deleted record being copied in never claims the live slot
        let copied = Folder { id: 2, uid: "copied".to_string(), ..deleted };
        assert!(ensure_unique(&existing, &copied, true).is_ok());
    }

    #[test]
    fn test_ensure_unique_rejects_reused_uid() {
        let mut live = Folder::new(0, "root");
        stamp_new(&mut live, 1);
        let mut deleted = Folder::new(0, "old");
        stamp_new(&mut deleted, 2);
        deleted.deleted_at = Some(now());
        let existing = vec![live.clone(), deleted.clone()];

        let same_uid = Folder { uid: live.uid.clone(), ..Folder::new(0, "other") };
        assert!(ensure_unique(&existing, &same_uid, true).unwrap_err().is_already_exists());

        // Deleted records keep their UID reserved
        let reused = Folder { uid: deleted.uid.clone(), ..Folder::new(0, "other") };
        assert!(ensure_unique(&existing, &reused, true).unwrap_err().is_already_exists());

        // Updating a record keeps its own UID
        assert!(ensure_unique(&existing, &live, false).is_ok());
    }

    #[test]
    fn test_negative_id_is_invalid() {
        let folder = Folder { id: -3, ..Folder::new(0, "root") };
        let err = ensure_unique(&Vec::<Folder>::new(), &folder, true).unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }));
    }

    #[test]
    fn test_next_id_of() {
        assert_eq!(next_id_of::<Folder, _>(&[]).unwrap(), 1);
        let records =
            vec![Folder { id: 4, ..Default::default() }, Folder { id: 2, ..Default::default() }];
        assert_eq!(next_id_of(&records).unwrap(), 5);
    }

    #[test]
    fn test_next_id_of_exhausted_space() {
        let records = vec![Folder { id: i64::MAX, ..Default::default() }];
        let err = next_id_of(&records).unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }));
        assert_eq!(successor_id("folder", i64::MAX - 1).unwrap(), i64::MAX);
    }
}
