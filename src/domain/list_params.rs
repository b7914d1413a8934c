//! # Query Descriptor
//!
//! [`ListParams`] is the filter + sort + pagination descriptor accepted by
//! every repository's `get` and `count`. Each part is only applied when it is
//! non-empty, so `ListParams::default()` means "every live record, in storage
//! order".

use crate::errors::{KeystashError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Soft-delete visibility filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedMode {
    /// Records without a deletion timestamp
    #[default]
    Live,
    /// Only soft-deleted records
    Deleted,
    /// Live and soft-deleted records
    Both,
}

impl DeletedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletedMode::Live => "live",
            DeletedMode::Deleted => "deleted",
            DeletedMode::Both => "both",
        }
    }

    /// Whether a record with the given deletion timestamp passes this filter
    pub fn admits(&self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            DeletedMode::Live => deleted_at.is_none(),
            DeletedMode::Deleted => deleted_at.is_some(),
            DeletedMode::Both => true,
        }
    }
}

impl std::str::FromStr for DeletedMode {
    type Err = KeystashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" | "only-live" => Ok(DeletedMode::Live),
            "deleted" | "only-deleted" => Ok(DeletedMode::Deleted),
            "both" | "all" => Ok(DeletedMode::Both),
            other => Err(KeystashError::invalid_field(
                format!("unknown deleted mode '{}'", other),
                "deleted",
            )),
        }
    }
}

/// Inclusive timestamp range. A range with neither bound set is inactive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: Some(to) }
    }

    pub fn is_zero(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }

    fn validate(&self, field: &str) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(KeystashError::invalid_field(
                    format!("{} range starts after it ends ({} > {})", field, from, to),
                    field,
                ));
            }
        }
        Ok(())
    }
}

/// One sort key: a field name and its direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: true }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), ascending: false }
    }
}

/// Filter, sort and pagination descriptor shared by all repositories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    /// ID allow-list
    pub ids: Vec<i64>,
    /// UID allow-list
    pub uids: Vec<String>,
    /// Parent allow-list: parent folder, parent path, or owning path for secrets
    pub parent_ids: Vec<i64>,
    /// Shell-style name pattern (`*`, `?`, `[...]`)
    pub name: Option<String>,
    pub deleted: DeletedMode,
    pub created: TimeRange,
    pub updated: TimeRange,
    pub removed: TimeRange,
    /// Ordered sort keys; the first key that discriminates two records wins
    pub sort: Vec<SortKey>,
    /// 1-based page number; 0 together with `page_size == 0` disables paging
    pub page: u64,
    pub page_size: u64,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    pub fn with_uids<S: Into<String>>(mut self, uids: impl IntoIterator<Item = S>) -> Self {
        self.uids = uids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parent_ids(mut self, parent_ids: impl IntoIterator<Item = i64>) -> Self {
        self.parent_ids = parent_ids.into_iter().collect();
        self
    }

    /// Secrets only: alias of [`ListParams::with_parent_ids`]
    pub fn with_path_ids(self, path_ids: impl IntoIterator<Item = i64>) -> Self {
        self.with_parent_ids(path_ids)
    }

    pub fn with_name(mut self, pattern: impl Into<String>) -> Self {
        self.name = Some(pattern.into());
        self
    }

    pub fn with_deleted(mut self, mode: DeletedMode) -> Self {
        self.deleted = mode;
        self
    }

    pub fn created_between(mut self, range: TimeRange) -> Self {
        self.created = range;
        self
    }

    pub fn updated_between(mut self, range: TimeRange) -> Self {
        self.updated = range;
        self
    }

    pub fn deleted_between(mut self, range: TimeRange) -> Self {
        self.removed = range;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortKey { field: field.into(), ascending });
        self
    }

    pub fn paginate(mut self, page: u64, page_size: u64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// True when a page window must be applied
    pub fn is_paginated(&self) -> bool {
        self.page != 0 || self.page_size != 0
    }

    /// Half-open `[offset, offset + page_size)` window; `None` when paging is off.
    pub fn window(&self) -> Option<(u64, u64)> {
        if !self.is_paginated() {
            return None;
        }
        let page = self.page.max(1);
        Some(((page - 1).saturating_mul(self.page_size), self.page_size))
    }

    /// The same filters with sorting and pagination removed, as used by `count`
    pub fn for_count(&self) -> Self {
        Self { sort: Vec::new(), page: 0, page_size: 0, ..self.clone() }
    }

    /// Reject malformed ranges and paging parameters
    pub fn validate(&self) -> Result<()> {
        self.created.validate("created")?;
        self.updated.validate("updated")?;
        self.removed.validate("deleted")?;
        if self.page != 0 && self.page_size == 0 {
            return Err(KeystashError::invalid_field(
                "page requires a non-zero page_size",
                "page_size",
            ));
        }
        Ok(())
    }
}
