//! Database migrations
//!
//! Code-based migrations for the Slopemate service. All migrations are
//! embedded directly in the binary as SQL strings, with variants for both
//! SQLite and MySQL, and tracked in a `_migrations` bookkeeping table.
//!
//! The accommodation columns arrive in their own migration on top of the
//! ledger table; deployed databases from before accommodation sharing
//! upgrade in place.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both supported backends
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, sequential version number
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations for the Slopemate service
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_groups",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS groups (
                code VARCHAR(6) PRIMARY KEY,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS groups (
                code VARCHAR(6) PRIMARY KEY,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_checkins",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS checkins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_code VARCHAR(6) NOT NULL,
                device_id VARCHAR(128) NOT NULL,
                user_name VARCHAR(100) NOT NULL,
                place_id BIGINT NOT NULL,
                place_name VARCHAR(255) NOT NULL,
                checked_in_at BIGINT NOT NULL,
                checked_out_at BIGINT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                FOREIGN KEY (group_code) REFERENCES groups(code) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_checkins_group_device_active
                ON checkins(group_code, device_id, is_active);
            CREATE INDEX IF NOT EXISTS idx_checkins_group_time
                ON checkins(group_code, checked_in_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS checkins (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                group_code VARCHAR(6) NOT NULL,
                device_id VARCHAR(128) NOT NULL,
                user_name VARCHAR(100) NOT NULL,
                place_id BIGINT NOT NULL,
                place_name VARCHAR(255) NOT NULL,
                checked_in_at BIGINT NOT NULL,
                checked_out_at BIGINT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                FOREIGN KEY (group_code) REFERENCES groups(code) ON DELETE CASCADE
            );
            CREATE INDEX idx_checkins_group_device_active
                ON checkins(group_code, device_id, is_active);
            CREATE INDEX idx_checkins_group_time
                ON checkins(group_code, checked_in_at);
        "#,
    },
    Migration {
        version: 3,
        name: "add_accommodation_sharing",
        up_sqlite: r#"
            ALTER TABLE checkins ADD COLUMN accommodation_place_id BIGINT;
            ALTER TABLE checkins ADD COLUMN accommodation_lng REAL;
            ALTER TABLE checkins ADD COLUMN accommodation_lat REAL;
            ALTER TABLE checkins ADD COLUMN accommodation_name VARCHAR(255);
            ALTER TABLE checkins ADD COLUMN display_accommodation_to_group BOOLEAN NOT NULL DEFAULT 0;
        "#,
        up_mysql: r#"
            ALTER TABLE checkins ADD COLUMN accommodation_place_id BIGINT NULL;
            ALTER TABLE checkins ADD COLUMN accommodation_lng DOUBLE NULL;
            ALTER TABLE checkins ADD COLUMN accommodation_lat DOUBLE NULL;
            ALTER TABLE checkins ADD COLUMN accommodation_name VARCHAR(255) NULL;
            ALTER TABLE checkins ADD COLUMN display_accommodation_to_group BOOLEAN NOT NULL DEFAULT 0;
        "#,
    },
];

/// Run all pending migrations
///
/// Creates the tracking table if needed, checks which migrations have
/// already been applied and runs the rest in version order. Returns the
/// number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// List already applied migrations
async fn applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => applied_migrations_sqlite(pool.as_sqlite().unwrap()).await,
        DatabaseDriver::Mysql => applied_migrations_mysql(pool.as_mysql().unwrap()).await,
    }
}

async fn applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply a single migration and record it
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.as_sqlite().unwrap(), migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.as_mysql().unwrap(), migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    if sql.len() > 100 {
        format!("{}...", &sql[..100])
    } else {
        sql.to_string()
    }
}

/// Split a migration into individual statements
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a fragment contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    let _ = create_migrations_table(pool).await;
    let applied = applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}
