//! # Database Repository
//!
//! SQLite-backed implementation of the repository contract. Filters, sorting
//! and paging are translated into SQL so that only the requested window leaves
//! the database. Timestamps are stored as INTEGER microseconds since the epoch,
//! which keeps range filters and ordering exact.

use crate::domain::{
    normalize_field, DeletedMode, Entity, Folder, ListParams, Path, Secret, TimeRange,
};
use crate::errors::{KeystashError, Result};
use crate::storage::repository::{
    ensure_valid_id, merge_update, now, stamp_new, successor_id, Repository,
};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{FromRow, QueryBuilder};
use std::marker::PhantomData;
use tracing::instrument;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Table mapping for an entity stored by [`DatabaseRepository`]
pub trait SqlEntity: Entity {
    const TABLE: &'static str;
    /// Column holding the uniqueness parent (`parent_id` or `path_id`)
    const PARENT_COLUMN: &'static str;
    /// Every column, in the order [`SqlEntity::bind_columns`] binds them
    const COLUMNS: &'static [&'static str];

    type Row: for<'r> FromRow<'r, SqliteRow> + Send + Unpin;

    fn from_row(row: Self::Row) -> Result<Self>;

    /// Bind one value per entry of [`SqlEntity::COLUMNS`]
    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// Database row shared by folders and paths
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    pub id: i64,
    pub uid: String,
    pub parent_id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// Database row for secrets
#[derive(Debug, Clone, FromRow)]
pub struct SecretRow {
    pub id: i64,
    pub uid: String,
    pub path_id: i64,
    pub name: String,
    pub value: String,
    pub secret_type: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

const NODE_COLUMNS: &[&str] =
    &["id", "uid", "parent_id", "name", "created_at", "updated_at", "deleted_at"];

fn from_micros(kind: &str, id: i64, micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        KeystashError::serialization(format!(
            "{} {} has an out-of-range timestamp: {}",
            kind, id, micros
        ))
    })
}

fn deleted_from_micros(kind: &str, id: i64, micros: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    micros.map(|m| from_micros(kind, id, m)).transpose()
}

impl SqlEntity for Folder {
    const TABLE: &'static str = "folders";
    const PARENT_COLUMN: &'static str = "parent_id";
    const COLUMNS: &'static [&'static str] = NODE_COLUMNS;

    type Row = NodeRow;

    fn from_row(row: NodeRow) -> Result<Self> {
        Ok(Folder {
            created_at: from_micros(Self::KIND, row.id, row.created_at)?,
            updated_at: from_micros(Self::KIND, row.id, row.updated_at)?,
            deleted_at: deleted_from_micros(Self::KIND, row.id, row.deleted_at)?,
            id: row.id,
            uid: row.uid,
            parent_id: row.parent_id,
            name: row.name,
        })
    }

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id)
            .bind(self.uid.as_str())
            .bind(self.parent_id)
            .bind(self.name.as_str())
            .bind(self.created_at.timestamp_micros())
            .bind(self.updated_at.timestamp_micros())
            .bind(self.deleted_at.map(|at| at.timestamp_micros()))
    }
}

impl SqlEntity for Path {
    const TABLE: &'static str = "paths";
    const PARENT_COLUMN: &'static str = "parent_id";
    const COLUMNS: &'static [&'static str] = NODE_COLUMNS;

    type Row = NodeRow;

    fn from_row(row: NodeRow) -> Result<Self> {
        Ok(Path {
            created_at: from_micros(Self::KIND, row.id, row.created_at)?,
            updated_at: from_micros(Self::KIND, row.id, row.updated_at)?,
            deleted_at: deleted_from_micros(Self::KIND, row.id, row.deleted_at)?,
            id: row.id,
            uid: row.uid,
            parent_id: row.parent_id,
            name: row.name,
        })
    }

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id)
            .bind(self.uid.as_str())
            .bind(self.parent_id)
            .bind(self.name.as_str())
            .bind(self.created_at.timestamp_micros())
            .bind(self.updated_at.timestamp_micros())
            .bind(self.deleted_at.map(|at| at.timestamp_micros()))
    }
}

impl SqlEntity for Secret {
    const TABLE: &'static str = "secrets";
    const PARENT_COLUMN: &'static str = "path_id";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "uid",
        "path_id",
        "name",
        "value",
        "secret_type",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    type Row = SecretRow;

    fn from_row(row: SecretRow) -> Result<Self> {
        Ok(Secret {
            created_at: from_micros(Self::KIND, row.id, row.created_at)?,
            updated_at: from_micros(Self::KIND, row.id, row.updated_at)?,
            deleted_at: deleted_from_micros(Self::KIND, row.id, row.deleted_at)?,
            id: row.id,
            uid: row.uid,
            path_id: row.path_id,
            name: row.name,
            value: row.value,
            secret_type: row.secret_type,
        })
    }

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.id)
            .bind(self.uid.as_str())
            .bind(self.path_id)
            .bind(self.name.as_str())
            .bind(self.value.as_str())
            .bind(self.secret_type.as_str())
            .bind(self.created_at.timestamp_micros())
            .bind(self.updated_at.timestamp_micros())
            .bind(self.deleted_at.map(|at| at.timestamp_micros()))
    }
}

fn select_sql<E: SqlEntity>() -> String {
    format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
}

fn insert_sql<E: SqlEntity>() -> String {
    let placeholders = vec!["?"; E::COLUMNS.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", E::TABLE, E::COLUMNS.join(", "), placeholders)
}

fn upsert_sql<E: SqlEntity>() -> String {
    let assignments: Vec<String> = E::COLUMNS
        .iter()
        .filter(|column| **column != "id")
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();
    format!("{} ON CONFLICT(id) DO UPDATE SET {}", insert_sql::<E>(), assignments.join(", "))
}

/// Translate a glob into SQLite `GLOB` syntax, matching the in-memory engine:
/// `[!..]` negates, while `[]` and an unterminated `[` are literal.
pub fn sqlite_glob(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '[' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars[i + 1..].iter().position(|c| *c == ']') {
            Some(len) if len > 0 => {
                let class: String = chars[i + 1..i + 1 + len].iter().collect();
                match class.strip_prefix('!') {
                    Some(rest) => {
                        out.push_str("[^");
                        out.push_str(rest);
                        out.push(']');
                    }
                    // A leading `^` is literal for us but negation for SQLite
                    None if class == "^" => out.push('^'),
                    None if class.starts_with('^') => {
                        out.push('[');
                        out.push_str(&class[1..]);
                        out.push_str("^]");
                    }
                    None => {
                        out.push('[');
                        out.push_str(&class);
                        out.push(']');
                    }
                }
                i += len + 2;
            }
            _ => {
                out.push_str("[[]");
                i += 1;
            }
        }
    }
    out
}

fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, range: &TimeRange) {
    if let Some(from) = range.from {
        qb.push(format!(" AND {} >= ", column)).push_bind(from.timestamp_micros());
    }
    if let Some(to) = range.to {
        qb.push(format!(" AND {} <= ", column)).push_bind(to.timestamp_micros());
    }
}

/// Append the WHERE clause for a descriptor's filters
fn push_filters<E: SqlEntity>(qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
    qb.push(" WHERE 1 = 1");

    if !params.ids.is_empty() {
        qb.push(" AND id IN (");
        let mut list = qb.separated(", ");
        for id in &params.ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");
    }
    if !params.uids.is_empty() {
        qb.push(" AND uid IN (");
        let mut list = qb.separated(", ");
        for uid in &params.uids {
            list.push_bind(uid.clone());
        }
        list.push_unseparated(")");
    }
    if !params.parent_ids.is_empty() {
        qb.push(format!(" AND {} IN (", E::PARENT_COLUMN));
        let mut list = qb.separated(", ");
        for parent_id in &params.parent_ids {
            list.push_bind(*parent_id);
        }
        list.push_unseparated(")");
    }
    if let Some(pattern) = params.name.as_deref().filter(|p| !p.is_empty()) {
        qb.push(" AND name GLOB ").push_bind(sqlite_glob(pattern));
    }

    push_range(qb, "created_at", &params.created);
    push_range(qb, "updated_at", &params.updated);
    if !params.removed.is_zero() {
        qb.push(" AND deleted_at IS NOT NULL");
        push_range(qb, "deleted_at", &params.removed);
    }

    match params.deleted {
        DeletedMode::Live => {
            qb.push(" AND deleted_at IS NULL");
        }
        DeletedMode::Deleted => {
            qb.push(" AND deleted_at IS NOT NULL");
        }
        DeletedMode::Both => {}
    }
}

/// Append ORDER BY; unknown sort fields are skipped and `id` breaks ties
fn push_order<E: SqlEntity>(qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
    qb.push(" ORDER BY ");
    for key in &params.sort {
        if let Some(column) = E::column(&normalize_field(&key.field)) {
            qb.push(column).push(if key.ascending { " ASC, " } else { " DESC, " });
        }
    }
    qb.push("id ASC");
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Repository storing one entity type in its SQLite table
#[derive(Debug)]
pub struct DatabaseRepository<E> {
    pool: DbPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for DatabaseRepository<E> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), _entity: PhantomData }
    }
}

impl<E: SqlEntity> DatabaseRepository<E> {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, _entity: PhantomData }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn db_error(action: &str, id: impl ToString, error: sqlx::Error) -> KeystashError {
        match &error {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                KeystashError::already_exists(
                    format!("{} {} violates a uniqueness constraint", E::KIND, id.to_string()),
                    E::KIND,
                )
            }
            _ => {
                tracing::error!(
                    error = %error,
                    entity = E::KIND,
                    action,
                    "Database operation failed"
                );
                KeystashError::backend(E::KIND, id, action, error)
            }
        }
    }

    fn rows_into(rows: Vec<E::Row>) -> Result<Vec<E>> {
        rows.into_iter().map(E::from_row).collect()
    }
}

#[async_trait]
impl<E: SqlEntity> Repository<E> for DatabaseRepository<E> {
    fn backend(&self) -> &'static str {
        "database"
    }

    async fn next_id(&self) -> Result<i64> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", E::TABLE);
        let max = sqlx::query_scalar::<Sqlite, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_error("next_id", "*", e))?;
        successor_id(E::KIND, max)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "db_load")]
    async fn load(&self) -> Result<Vec<E>> {
        let sql = format!("{} ORDER BY id ASC", select_sql::<E>());
        let rows = sqlx::query_as::<Sqlite, E::Row>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("load", "*", e))?;
        Self::rows_into(rows)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "db_get")]
    async fn get(&self, params: &ListParams) -> Result<Vec<E>> {
        params.validate()?;

        let mut qb = QueryBuilder::<Sqlite>::new(select_sql::<E>());
        push_filters::<E>(&mut qb, params);
        push_order::<E>(&mut qb, params);
        if let Some((offset, size)) = params.window() {
            qb.push(" LIMIT ").push_bind(to_i64(size));
            qb.push(" OFFSET ").push_bind(to_i64(offset));
        }

        let rows = qb
            .build_query_as::<E::Row>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("get", "*", e))?;
        Self::rows_into(rows)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "db_count")]
    async fn count(&self, params: &ListParams) -> Result<u64> {
        params.validate()?;
        let params = params.for_count();

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
        push_filters::<E>(&mut qb, &params);

        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_error("count", "*", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, record_name = %record.name()),
        name = "db_create"
    )]
    async fn create(&self, mut record: E) -> Result<E> {
        ensure_valid_id(&record)?;
        let mut tx =
            self.pool.begin().await.map_err(|e| Self::db_error("create", record.id(), e))?;

        if record.id() != 0 {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", E::TABLE);
            let taken: i64 = sqlx::query_scalar::<Sqlite, i64>(&sql)
                .bind(record.id())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Self::db_error("create", record.id(), e))?;
            if taken > 0 {
                return Err(KeystashError::already_exists(
                    format!("{} with ID {} already exists", E::KIND, record.id()),
                    E::KIND,
                ));
            }
        }

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ? AND name = ? AND deleted_at IS NULL",
            E::TABLE,
            E::PARENT_COLUMN
        );
        let collisions: i64 = sqlx::query_scalar::<Sqlite, i64>(&sql)
            .bind(record.parent_id())
            .bind(record.name())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Self::db_error("create", record.id(), e))?;
        if collisions > 0 && !record.is_deleted() {
            return Err(KeystashError::already_exists(
                format!(
                    "{} '{}' already exists under parent {}",
                    E::KIND,
                    record.name(),
                    record.parent_id()
                ),
                E::KIND,
            ));
        }

        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", E::TABLE);
        let max: i64 = sqlx::query_scalar::<Sqlite, i64>(&sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Self::db_error("create", record.id(), e))?;
        stamp_new(&mut record, successor_id(E::KIND, max)?);

        let sql = insert_sql::<E>();
        record
            .bind_columns(sqlx::query(&sql))
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_error("create", record.id(), e))?;

        tx.commit().await.map_err(|e| Self::db_error("create", record.id(), e))?;

        tracing::info!(entity = E::KIND, id = record.id(), uid = %record.uid(), "Created record");
        Ok(record)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, id = record.id()),
        name = "db_update"
    )]
    async fn update(&self, record: E) -> Result<E> {
        let id = record.id();
        let mut tx = self.pool.begin().await.map_err(|e| Self::db_error("update", id, e))?;

        let sql = format!("{} WHERE id = ? AND deleted_at IS NULL", select_sql::<E>());
        let current = sqlx::query_as::<Sqlite, E::Row>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Self::db_error("update", id, e))?
            .ok_or_else(|| KeystashError::not_found(E::KIND, id))
            .and_then(E::from_row)?;

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ? AND name = ? AND deleted_at IS NULL AND id != ?",
            E::TABLE,
            E::PARENT_COLUMN
        );
        let collisions: i64 = sqlx::query_scalar::<Sqlite, i64>(&sql)
            .bind(record.parent_id())
            .bind(record.name())
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Self::db_error("update", id, e))?;
        if collisions > 0 {
            return Err(KeystashError::already_exists(
                format!(
                    "{} '{}' already exists under parent {}",
                    E::KIND,
                    record.name(),
                    record.parent_id()
                ),
                E::KIND,
            ));
        }

        let updated = merge_update(&current, record);
        let sql = upsert_sql::<E>();
        updated
            .bind_columns(sqlx::query(&sql))
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_error("update", id, e))?;

        tx.commit().await.map_err(|e| Self::db_error("update", id, e))?;

        tracing::info!(entity = E::KIND, id, "Updated record");
        Ok(updated)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "db_delete")]
    async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let outcome = if force {
            let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
            sqlx::query(&sql).bind(id).execute(&self.pool).await
        } else {
            let stamp = now().timestamp_micros();
            let sql = format!(
                "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                E::TABLE
            );
            sqlx::query(&sql).bind(stamp).bind(stamp).bind(id).execute(&self.pool).await
        };
        let result = outcome.map_err(|e| Self::db_error("delete", id, e))?;

        if result.rows_affected() == 0 {
            return Err(KeystashError::not_found(E::KIND, id));
        }

        tracing::info!(entity = E::KIND, id, force, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;

    async fn pool() -> DbPool {
        create_pool(&DatabaseConfig::in_memory()).await.unwrap()
    }

    #[test]
    fn test_sqlite_glob_translation() {
        assert_eq!(sqlite_glob("a*b?"), "a*b?");
        assert_eq!(sqlite_glob("[!ab]*"), "[^ab]*");
        assert_eq!(sqlite_glob("[ab]"), "[ab]");
        assert_eq!(sqlite_glob("x[y"), "x[[]y");
        assert_eq!(sqlite_glob("[]"), "[[]]");
        assert_eq!(sqlite_glob("[^a]"), "[a^]");
    }

    #[test]
    fn test_upsert_sql_skips_id_assignment() {
        let sql = upsert_sql::<Folder>();
        assert!(sql.starts_with("INSERT INTO folders (id, uid, parent_id"));
        assert!(sql.contains("ON CONFLICT(id) DO UPDATE SET uid = excluded.uid"));
        assert!(!sql.contains("id = excluded.id,"));
    }

    #[tokio::test]
    async fn test_timestamps_round_trip() {
        let repo = DatabaseRepository::<Secret>::new(pool().await);
        let created = repo.create(Secret::new(1, "A", "1", "int")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_sql_sorting_and_paging() {
        let repo = DatabaseRepository::<Folder>::new(pool().await);
        for name in ["delta", "alpha", "charlie", "bravo"] {
            repo.create(Folder::new(0, name)).await.unwrap();
        }

        let params = ListParams::new().sort_by("Name", true).paginate(2, 2);
        let names: Vec<String> =
            repo.get(&params).await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["charlie", "delta"]);

        let params = ListParams::new().sort_by("colour", false);
        let ids: Vec<i64> = repo.get(&params).await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        assert_eq!(repo.count(&params.paginate(1, 1)).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_stay_in_table() {
        let repo = DatabaseRepository::<Path>::new(pool().await);
        let path = repo.create(Path::new(0, "prod")).await.unwrap();
        repo.delete(path.id, false).await.unwrap();

        let all = repo.load().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted_at.is_some());
        assert!(repo.delete(path.id, false).await.unwrap_err().is_not_found());

        // Live name is free again, and the ID sequence counts the deleted row
        let again = repo.create(Path::new(0, "prod")).await.unwrap();
        assert_eq!(again.id, 2);
    }
}
