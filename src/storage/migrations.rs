//! # Database Migration Management
//!
//! Schema evolution for the database backend. Migrations are embedded in the
//! binary as `(version, description, sql)` triples, applied in version order
//! inside one transaction each, and recorded in a tracking table.

use crate::errors::{KeystashError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{error, info, warn};

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time: i64,
    pub checksum: Vec<u8>,
}

/// Embedded migrations, ordered by version
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        20250101000001,
        "create_folders_table",
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            parent_id INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_live_name
            ON folders (parent_id, name) WHERE deleted_at IS NULL;
        "#,
    ),
    (
        20250101000002,
        "create_paths_table",
        r#"
        CREATE TABLE IF NOT EXISTS paths (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            parent_id INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_paths_live_name
            ON paths (parent_id, name) WHERE deleted_at IS NULL;
        "#,
    ),
    (
        20250101000003,
        "create_secrets_table",
        r#"
        CREATE TABLE IF NOT EXISTS secrets (
            id INTEGER PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            path_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            secret_type TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_secrets_live_name
            ON secrets (path_id, name) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_secrets_path_id ON secrets (path_id);
        "#,
    ),
];

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    create_migration_table(pool).await?;
    let applied = get_applied_migration_versions(pool).await?;

    let mut migrations_run = 0;
    for (version, description, sql) in MIGRATIONS {
        if applied.contains(version) {
            info!(version = version, "Migration already applied: {}", description);
            continue;
        }

        info!(version = version, "Running migration: {}", description);
        let start_time = std::time::Instant::now();

        let mut tx = pool.begin().await.map_err(|e| KeystashError::Database {
            source: e,
            context: "Failed to start migration transaction".to_string(),
        })?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = description, "Migration failed");
            KeystashError::Database {
                source: e,
                context: format!("Migration failed: {}", description),
            }
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        sqlx::query(
            "INSERT INTO _keystash_migrations \
             (version, description, checksum, execution_time, installed_on) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(version)
        .bind(description)
        .bind(calculate_checksum(sql))
        .bind(execution_time)
        .bind(Utc::now().timestamp_micros())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, migration = description, "Failed to record migration");
            KeystashError::Database {
                source: e,
                context: format!("Failed to record migration: {}", description),
            }
        })?;

        tx.commit().await.map_err(|e| KeystashError::Database {
            source: e,
            context: "Failed to commit migration transaction".to_string(),
        })?;

        migrations_run += 1;
        info!(
            version = version,
            execution_time_ms = execution_time,
            "Migration completed: {}",
            description
        );
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

/// Create the migration tracking table
async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _keystash_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum BLOB NOT NULL,
            execution_time INTEGER NOT NULL,
            installed_on INTEGER NOT NULL
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| KeystashError::Database {
        source: e,
        context: "Failed to create migration tracking table".to_string(),
    })?;

    Ok(())
}

fn is_missing_table(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_err) if db_err.message().contains("no such table"))
}

/// Get list of applied migration versions
async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _keystash_migrations ORDER BY version")
        .fetch_all(pool)
        .await;

    match rows {
        Ok(rows) => Ok(rows.into_iter().map(|row| row.get::<i64, _>("version")).collect()),
        // Table doesn't exist yet - this is expected on first run
        Err(e) if is_missing_table(&e) => Ok(Vec::new()),
        Err(e) => Err(KeystashError::Database {
            source: e,
            context: "Failed to get applied migrations".to_string(),
        }),
    }
}

/// Calculate checksum for migration content
fn calculate_checksum(content: &str) -> Vec<u8> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish().to_le_bytes().to_vec()
}

/// Validate that exactly the embedded migrations are applied
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    info!("Validating migration integrity");

    let applied_versions = get_applied_migration_versions(pool).await?;
    let expected_versions: Vec<i64> = MIGRATIONS.iter().map(|(version, _, _)| *version).collect();

    for expected in &expected_versions {
        if !applied_versions.contains(expected) {
            warn!(version = expected, "Missing migration");
            return Ok(false);
        }
    }

    for applied in &applied_versions {
        if !expected_versions.contains(applied) {
            warn!(version = applied, "Unexpected migration found");
            return Ok(false);
        }
    }

    info!("Migration validation successful");
    Ok(true)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = get_applied_migration_versions(pool).await?;
    Ok(applied.into_iter().max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description, checksum, execution_time, installed_on \
         FROM _keystash_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|row| MigrationInfo {
                version: row.get("version"),
                description: row.get("description"),
                installed_on: DateTime::from_timestamp_micros(row.get::<i64, _>("installed_on"))
                    .unwrap_or_default(),
                execution_time: row.get("execution_time"),
                checksum: row.get("checksum"),
            })
            .collect()),
        Err(e) if is_missing_table(&e) => Ok(Vec::new()),
        Err(e) => Err(KeystashError::Database {
            source: e,
            context: "Failed to list applied migrations".to_string(),
        }),
    }
}
