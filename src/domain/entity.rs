//! Shared identity and lifecycle contract for stored records.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Debug;

/// A record held by a repository: Folder, Path or Secret.
///
/// Every entity carries a numeric ID (assigned per backend, one greater than
/// the current maximum), a UID, three lifecycle timestamps and a
/// `(parent, name)` pair that is unique among live records.
pub trait Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Lowercase entity name, used for key prefixes, file names and errors
    const KIND: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn uid(&self) -> &str;
    fn set_uid(&mut self, uid: String);
    fn name(&self) -> &str;

    /// Parent folder for folders, parent path for paths, owning path for secrets
    fn parent_id(&self) -> i64;

    fn created_at(&self) -> DateTime<Utc>;
    fn set_created_at(&mut self, at: DateTime<Utc>);
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    /// Compare two records on an entity-specific field.
    ///
    /// `field` is already normalized by [`normalize_field`]. Returns `None` when
    /// the entity has no such field.
    fn compare_extra(&self, other: &Self, field: &str) -> Option<Ordering>;

    /// Database column for an entity-specific field, if any.
    fn extra_column(field: &str) -> Option<&'static str>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// True when both records claim the same `(parent, name)` slot
    fn same_key(&self, other: &Self) -> bool {
        self.parent_id() == other.parent_id() && self.name() == other.name()
    }

    /// Compare two records on any sortable field; `None` for unknown fields.
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "id" => Some(self.id().cmp(&other.id())),
            "uid" => Some(self.uid().cmp(other.uid())),
            "name" => Some(self.name().cmp(other.name())),
            "createdat" => Some(self.created_at().cmp(&other.created_at())),
            "updatedat" => Some(self.updated_at().cmp(&other.updated_at())),
            "deletedat" => Some(self.deleted_at().cmp(&other.deleted_at())),
            other_field => self.compare_extra(other, other_field),
        }
    }

    /// Database column for a sortable field; `None` for unknown fields.
    fn column(field: &str) -> Option<&'static str> {
        match field {
            "id" => Some("id"),
            "uid" => Some("uid"),
            "name" => Some("name"),
            "createdat" => Some("created_at"),
            "updatedat" => Some("updated_at"),
            "deletedat" => Some("deleted_at"),
            other_field => Self::extra_column(other_field),
        }
    }
}

/// Normalize a sort field name: `"CreatedAt"`, `"created_at"` and
/// `"createdAt"` all become `"createdat"`.
pub fn normalize_field(field: &str) -> String {
    field.chars().filter(|c| *c != '_' && *c != '-').flat_map(char::to_lowercase).collect()
}

/// Generate a fresh UID for a new record
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Implements the identity/timestamp accessors of [`Entity`] for a struct with
/// the standard `id`, `uid`, `name`, `created_at`, `updated_at`, `deleted_at` fields.
macro_rules! entity_accessors {
    () => {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }

        fn uid(&self) -> &str {
            &self.uid
        }

        fn set_uid(&mut self, uid: String) {
            self.uid = uid;
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.created_at
        }

        fn set_created_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
            self.created_at = at;
        }

        fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.updated_at
        }

        fn set_updated_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
            self.updated_at = at;
        }

        fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
            self.deleted_at
        }

        fn set_deleted_at(&mut self, at: Option<chrono::DateTime<chrono::Utc>>) {
            self.deleted_at = at;
        }
    };
}

pub(crate) use entity_accessors;
