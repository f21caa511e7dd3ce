//! Group repository
//!
//! Database operations for join-code groups.
//!
//! This module provides:
//! - `GroupRepository` trait defining the interface for group data access
//! - `SqlxGroupRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Group;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Group repository trait
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Insert a new group
    ///
    /// Returns `false` when the code is already taken, so the caller can
    /// retry with a fresh code.
    async fn insert(&self, group: &Group) -> Result<bool>;

    /// Get a group by its join code
    async fn find(&self, code: &str) -> Result<Option<Group>>;

    /// Check whether a join code exists
    async fn exists(&self, code: &str) -> Result<bool>;
}

/// SQLx-based group repository implementation
pub struct SqlxGroupRepository {
    pool: DynDatabasePool,
}

impl SqlxGroupRepository {
    /// Create a new SQLx group repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for dependency injection
    pub fn shared(pool: DynDatabasePool) -> Arc<dyn GroupRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GroupRepository for SqlxGroupRepository {
    async fn insert(&self, group: &Group) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_group_sqlite(self.pool.as_sqlite().unwrap(), group).await
            }
            DatabaseDriver::Mysql => {
                insert_group_mysql(self.pool.as_mysql().unwrap(), group).await
            }
        }
    }

    async fn find(&self, code: &str) -> Result<Option<Group>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_group_sqlite(self.pool.as_sqlite().unwrap(), code).await
            }
            DatabaseDriver::Mysql => find_group_mysql(self.pool.as_mysql().unwrap(), code).await,
        }
    }

    async fn exists(&self, code: &str) -> Result<bool> {
        Ok(self.find(code).await?.is_some())
    }
}

/// Whether an error is the storage layer rejecting a duplicate key
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_group_sqlite(pool: &SqlitePool, group: &Group) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO groups (code, created_at, expires_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&group.code)
    .bind(group.created_at)
    .bind(group.expires_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e).context("Failed to insert group"),
    }
}

async fn find_group_sqlite(pool: &SqlitePool, code: &str) -> Result<Option<Group>> {
    let row = sqlx::query(
        r#"
        SELECT code, created_at, expires_at
        FROM groups
        WHERE code = ?
        "#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("Failed to get group by code")?;

    Ok(row.map(|row| Group {
        code: row.get("code"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_group_mysql(pool: &MySqlPool, group: &Group) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO groups (code, created_at, expires_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&group.code)
    .bind(group.created_at)
    .bind(group.expires_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e).context("Failed to insert group"),
    }
}

async fn find_group_mysql(pool: &MySqlPool, code: &str) -> Result<Option<Group>> {
    let row = sqlx::query(
        r#"
        SELECT code, created_at, expires_at
        FROM groups
        WHERE code = ?
        "#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("Failed to get group by code")?;

    match row {
        Some(row) => {
            let created_at: DateTime<Utc> = row.get("created_at");
            let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
            Ok(Some(Group {
                code: row.get("code"),
                created_at,
                expires_at,
            }))
        }
        None => Ok(None),
    }
}
