//! Secret entity
//!
//! A secret's `value` is stored raw. It may be a plain literal or an expression
//! over the other live secrets; it is only interpreted when
//! [`Secret::evaluate`] is called, and evaluation never rewrites the stored value.

use super::entity::{entity_accessors, Entity};
use crate::errors::Result;
use crate::evaluator::{self, SecretsLookup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A named value stored under a path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub id: i64,
    pub uid: String,
    pub path_id: i64,
    pub name: String,
    pub value: String,
    /// Declared type tag such as `"int"` or `"string"`. Informational only.
    pub secret_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Secret {
    /// New unsaved secret; ID, UID and timestamps are assigned on create
    pub fn new(
        path_id: i64,
        name: impl Into<String>,
        value: impl Into<String>,
        secret_type: impl Into<String>,
    ) -> Self {
        Self {
            path_id,
            name: name.into(),
            value: value.into(),
            secret_type: secret_type.into(),
            ..Default::default()
        }
    }

    /// Resolve this secret's value against the other live secrets.
    pub async fn evaluate<L>(&self, lookup: &L) -> Result<String>
    where
        L: SecretsLookup + ?Sized,
    {
        evaluator::evaluate_secret(self, lookup).await
    }
}

impl Entity for Secret {
    const KIND: &'static str = "secret";

    entity_accessors!();

    fn parent_id(&self) -> i64 {
        self.path_id
    }

    fn compare_extra(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "pathid" => Some(self.path_id.cmp(&other.path_id)),
            "value" => Some(self.value.cmp(&other.value)),
            "type" | "secrettype" => Some(self.secret_type.cmp(&other.secret_type)),
            _ => None,
        }
    }

    fn extra_column(field: &str) -> Option<&'static str> {
        match field {
            "pathid" => Some("path_id"),
            "value" => Some("value"),
            "type" | "secrettype" => Some("secret_type"),
            _ => None,
        }
    }
}
