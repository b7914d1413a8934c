//! Path entity

use super::entity::{entity_accessors, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A secret path such as `/` or `/billing/prod`; secrets hang off paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: i64,
    pub uid: String,
    pub parent_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Path {
    /// New unsaved path; ID, UID and timestamps are assigned on create
    pub fn new(parent_id: i64, name: impl Into<String>) -> Self {
        Self { parent_id, name: name.into(), ..Default::default() }
    }
}

impl Entity for Path {
    const KIND: &'static str = "path";

    entity_accessors!();

    fn parent_id(&self) -> i64 {
        self.parent_id
    }

    fn compare_extra(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "parentid" => Some(self.parent_id.cmp(&other.parent_id)),
            _ => None,
        }
    }

    fn extra_column(field: &str) -> Option<&'static str> {
        match field {
            "parentid" => Some("parent_id"),
            _ => None,
        }
    }
}
