//! Check-in ledger repository
//!
//! Database operations for the append-only check-in ledger.
//!
//! This module provides:
//! - `CheckinRepository` trait defining the interface for ledger access
//! - `SqlxCheckinRepository` implementing the trait for SQLite and MySQL
//!
//! The two mutation paths with correctness stakes run inside a single
//! transaction per call:
//! - `check_in` closes any still-active row for the device before inserting
//!   the new one, so a device never holds two active rows at once.
//! - `set_accommodation` locates the device's most recent row, rewrites its
//!   accommodation fields, and closes any other still-active rows, all under
//!   the same consistent read.
//!
//! "Most recent" is always `checked_in_at DESC, id DESC`; the id makes the
//! ordering deterministic when two rows carry the same timestamp.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AccommodationUpdate, CheckinRecord, Coordinates, NewCheckin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Check-in ledger repository trait
#[async_trait]
pub trait CheckinRepository: Send + Sync {
    /// Close any active rows for the device and insert a new active row,
    /// atomically
    async fn check_in(&self, new: &NewCheckin) -> Result<CheckinRecord>;

    /// Close every active row for the device; returns the number closed
    async fn deactivate_all(
        &self,
        group_code: &str,
        device_id: &str,
        checked_out_at: i64,
    ) -> Result<u64>;

    /// Close the active row for the device at one specific place; returns
    /// the number closed (zero when there is no such row)
    async fn deactivate_at_place(
        &self,
        group_code: &str,
        device_id: &str,
        place_id: i64,
        checked_out_at: i64,
    ) -> Result<u64>;

    /// The device's single most recent row, regardless of activity
    async fn latest_for_device(
        &self,
        group_code: &str,
        device_id: &str,
    ) -> Result<Option<CheckinRecord>>;

    /// The device's single most recent row that carries accommodation data
    ///
    /// Kept separate from `latest_for_device` on purpose: the two "latest"
    /// rows can differ, and member views combine both.
    async fn latest_with_accommodation(
        &self,
        group_code: &str,
        device_id: &str,
    ) -> Result<Option<CheckinRecord>>;

    /// Rewrite the accommodation state on the device's most recent row and
    /// close any other still-active rows, atomically
    ///
    /// Returns `None` when the device has no rows in the group at all.
    async fn set_accommodation(
        &self,
        group_code: &str,
        device_id: &str,
        update: &AccommodationUpdate,
    ) -> Result<Option<CheckinRecord>>;

    /// All active rows in the group
    async fn active_for_group(&self, group_code: &str) -> Result<Vec<CheckinRecord>>;

    /// All rows in the group checked in at or after `since_ms`
    async fn history(&self, group_code: &str, since_ms: i64) -> Result<Vec<CheckinRecord>>;

    /// Distinct devices with any row at or after `since_ms`
    async fn devices_in_window(&self, group_code: &str, since_ms: i64) -> Result<Vec<String>>;

    /// Mark active, never-closed rows older than `cutoff_ms` as inactive
    ///
    /// Leaves `checked_out_at` untouched so swept rows read as expired
    /// rather than checked out.
    async fn expire_stale(&self, group_code: &str, cutoff_ms: i64) -> Result<u64>;
}

/// SQLx-based check-in repository implementation
pub struct SqlxCheckinRepository {
    pool: DynDatabasePool,
}

impl SqlxCheckinRepository {
    /// Create a new SQLx check-in repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a shared repository for dependency injection
    pub fn shared(pool: DynDatabasePool) -> Arc<dyn CheckinRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CheckinRepository for SqlxCheckinRepository {
    async fn check_in(&self, new: &NewCheckin) -> Result<CheckinRecord> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => check_in_sqlite(self.pool.as_sqlite().unwrap(), new).await,
            DatabaseDriver::Mysql => check_in_mysql(self.pool.as_mysql().unwrap(), new).await,
        }
    }

    async fn deactivate_all(
        &self,
        group_code: &str,
        device_id: &str,
        checked_out_at: i64,
    ) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                deactivate_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    group_code,
                    device_id,
                    None,
                    checked_out_at,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                deactivate_mysql(
                    self.pool.as_mysql().unwrap(),
                    group_code,
                    device_id,
                    None,
                    checked_out_at,
                )
                .await
            }
        }
    }

    async fn deactivate_at_place(
        &self,
        group_code: &str,
        device_id: &str,
        place_id: i64,
        checked_out_at: i64,
    ) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                deactivate_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    group_code,
                    device_id,
                    Some(place_id),
                    checked_out_at,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                deactivate_mysql(
                    self.pool.as_mysql().unwrap(),
                    group_code,
                    device_id,
                    Some(place_id),
                    checked_out_at,
                )
                .await
            }
        }
    }

    async fn latest_for_device(
        &self,
        group_code: &str,
        device_id: &str,
    ) -> Result<Option<CheckinRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                latest_sqlite(self.pool.as_sqlite().unwrap(), group_code, device_id, false).await
            }
            DatabaseDriver::Mysql => {
                latest_mysql(self.pool.as_mysql().unwrap(), group_code, device_id, false).await
            }
        }
    }

    async fn latest_with_accommodation(
        &self,
        group_code: &str,
        device_id: &str,
    ) -> Result<Option<CheckinRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                latest_sqlite(self.pool.as_sqlite().unwrap(), group_code, device_id, true).await
            }
            DatabaseDriver::Mysql => {
                latest_mysql(self.pool.as_mysql().unwrap(), group_code, device_id, true).await
            }
        }
    }

    async fn set_accommodation(
        &self,
        group_code: &str,
        device_id: &str,
        update: &AccommodationUpdate,
    ) -> Result<Option<CheckinRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_accommodation_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    group_code,
                    device_id,
                    update,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                set_accommodation_mysql(
                    self.pool.as_mysql().unwrap(),
                    group_code,
                    device_id,
                    update,
                )
                .await
            }
        }
    }

    async fn active_for_group(&self, group_code: &str) -> Result<Vec<CheckinRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                active_for_group_sqlite(self.pool.as_sqlite().unwrap(), group_code).await
            }
            DatabaseDriver::Mysql => {
                active_for_group_mysql(self.pool.as_mysql().unwrap(), group_code).await
            }
        }
    }

    async fn history(&self, group_code: &str, since_ms: i64) -> Result<Vec<CheckinRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                history_sqlite(self.pool.as_sqlite().unwrap(), group_code, since_ms).await
            }
            DatabaseDriver::Mysql => {
                history_mysql(self.pool.as_mysql().unwrap(), group_code, since_ms).await
            }
        }
    }

    async fn devices_in_window(&self, group_code: &str, since_ms: i64) -> Result<Vec<String>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                devices_sqlite(self.pool.as_sqlite().unwrap(), group_code, since_ms).await
            }
            DatabaseDriver::Mysql => {
                devices_mysql(self.pool.as_mysql().unwrap(), group_code, since_ms).await
            }
        }
    }

    async fn expire_stale(&self, group_code: &str, cutoff_ms: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                expire_stale_sqlite(self.pool.as_sqlite().unwrap(), group_code, cutoff_ms).await
            }
            DatabaseDriver::Mysql => {
                expire_stale_mysql(self.pool.as_mysql().unwrap(), group_code, cutoff_ms).await
            }
        }
    }
}

const SELECT_COLUMNS: &str = "id, group_code, device_id, user_name, place_id, place_name, \
     checked_in_at, checked_out_at, is_active, accommodation_place_id, accommodation_lng, \
     accommodation_lat, accommodation_name, display_accommodation_to_group";

const INSERT_SQL: &str = "INSERT INTO checkins \
     (group_code, device_id, user_name, place_id, place_name, checked_in_at, is_active, \
      accommodation_place_id, accommodation_lng, accommodation_lat, accommodation_name, \
      display_accommodation_to_group) \
     VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?)";

const SUPERSEDE_SQL: &str = "UPDATE checkins \
     SET is_active = 0, checked_out_at = ? \
     WHERE group_code = ? AND device_id = ? AND is_active = 1";

/// Merge an accommodation update into what the targeted row already stores.
///
/// Supplied fields win; absent fields keep the stored values. The share
/// flag alone never clears stored accommodation data.
fn merged_accommodation(
    row: &CheckinRecord,
    update: &AccommodationUpdate,
) -> (Option<i64>, Option<Coordinates>, Option<String>) {
    (
        update.place_id.or(row.accommodation_place_id),
        update.coords.or(row.accommodation_coords),
        update.name.clone().or_else(|| row.accommodation_name.clone()),
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn row_to_checkin_sqlite(row: &SqliteRow) -> CheckinRecord {
    let lng: Option<f64> = row.get("accommodation_lng");
    let lat: Option<f64> = row.get("accommodation_lat");

    CheckinRecord {
        id: row.get("id"),
        group_code: row.get("group_code"),
        device_id: row.get("device_id"),
        user_name: row.get("user_name"),
        place_id: row.get("place_id"),
        place_name: row.get("place_name"),
        checked_in_at: row.get("checked_in_at"),
        checked_out_at: row.get("checked_out_at"),
        is_active: row.get("is_active"),
        accommodation_place_id: row.get("accommodation_place_id"),
        accommodation_coords: match (lng, lat) {
            (Some(lng), Some(lat)) => Some(Coordinates { lng, lat }),
            _ => None,
        },
        accommodation_name: row.get("accommodation_name"),
        display_accommodation_to_group: row.get("display_accommodation_to_group"),
    }
}

async fn check_in_sqlite(pool: &SqlitePool, new: &NewCheckin) -> Result<CheckinRecord> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(SUPERSEDE_SQL)
        .bind(new.checked_in_at)
        .bind(&new.group_code)
        .bind(&new.device_id)
        .execute(&mut *tx)
        .await
        .context("Failed to supersede active check-ins")?;

    let result = sqlx::query(INSERT_SQL)
        .bind(&new.group_code)
        .bind(&new.device_id)
        .bind(&new.user_name)
        .bind(new.place_id)
        .bind(&new.place_name)
        .bind(new.checked_in_at)
        .bind(new.accommodation_place_id)
        .bind(new.accommodation_coords.map(|c| c.lng))
        .bind(new.accommodation_coords.map(|c| c.lat))
        .bind(&new.accommodation_name)
        .bind(new.display_accommodation_to_group)
        .execute(&mut *tx)
        .await
        .context("Failed to insert check-in")?;

    let id = result.last_insert_rowid();
    let row = sqlx::query(&format!("SELECT {} FROM checkins WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back inserted check-in")?;

    tx.commit().await.context("Failed to commit check-in")?;

    Ok(row_to_checkin_sqlite(&row))
}

async fn deactivate_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    device_id: &str,
    place_id: Option<i64>,
    checked_out_at: i64,
) -> Result<u64> {
    let result = match place_id {
        Some(place_id) => {
            sqlx::query(
                "UPDATE checkins SET is_active = 0, checked_out_at = ? \
                 WHERE group_code = ? AND device_id = ? AND place_id = ? AND is_active = 1",
            )
            .bind(checked_out_at)
            .bind(group_code)
            .bind(device_id)
            .bind(place_id)
            .execute(pool)
            .await
        }
        None => {
            sqlx::query(SUPERSEDE_SQL)
                .bind(checked_out_at)
                .bind(group_code)
                .bind(device_id)
                .execute(pool)
                .await
        }
    }
    .context("Failed to deactivate check-ins")?;

    Ok(result.rows_affected())
}

async fn latest_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    device_id: &str,
    with_accommodation: bool,
) -> Result<Option<CheckinRecord>> {
    let filter = if with_accommodation {
        " AND accommodation_place_id IS NOT NULL"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND device_id = ?{} \
         ORDER BY checked_in_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS, filter
    );

    let row = sqlx::query(&sql)
        .bind(group_code)
        .bind(device_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get latest check-in")?;

    Ok(row.map(|row| row_to_checkin_sqlite(&row)))
}

async fn set_accommodation_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    device_id: &str,
    update: &AccommodationUpdate,
) -> Result<Option<CheckinRecord>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND device_id = ? \
         ORDER BY checked_in_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(group_code)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to locate latest check-in")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let latest = row_to_checkin_sqlite(&row);
    let (place_id, coords, name) = merged_accommodation(&latest, update);

    sqlx::query(
        "UPDATE checkins SET accommodation_place_id = ?, accommodation_lng = ?, \
         accommodation_lat = ?, accommodation_name = ?, display_accommodation_to_group = ? \
         WHERE id = ?",
    )
    .bind(place_id)
    .bind(coords.map(|c| c.lng))
    .bind(coords.map(|c| c.lat))
    .bind(&name)
    .bind(update.share)
    .bind(latest.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update accommodation")?;

    // Any other row still flagged active is stale; close it so reads never
    // coalesce accommodation from a superseded row.
    sqlx::query(
        "UPDATE checkins SET is_active = 0, checked_out_at = ? \
         WHERE group_code = ? AND device_id = ? AND is_active = 1 AND id != ?",
    )
    .bind(update.updated_at)
    .bind(group_code)
    .bind(device_id)
    .bind(latest.id)
    .execute(&mut *tx)
    .await
    .context("Failed to close stale check-ins")?;

    let row = sqlx::query(&format!("SELECT {} FROM checkins WHERE id = ?", SELECT_COLUMNS))
        .bind(latest.id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back accommodation update")?;

    tx.commit()
        .await
        .context("Failed to commit accommodation update")?;

    Ok(Some(row_to_checkin_sqlite(&row)))
}

async fn active_for_group_sqlite(pool: &SqlitePool, group_code: &str) -> Result<Vec<CheckinRecord>> {
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND is_active = 1 \
         ORDER BY checked_in_at DESC, id DESC",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(group_code)
        .fetch_all(pool)
        .await
        .context("Failed to list active check-ins")?;

    Ok(rows.iter().map(row_to_checkin_sqlite).collect())
}

async fn history_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    since_ms: i64,
) -> Result<Vec<CheckinRecord>> {
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND checked_in_at >= ? \
         ORDER BY checked_in_at DESC, id DESC",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(group_code)
        .bind(since_ms)
        .fetch_all(pool)
        .await
        .context("Failed to list check-in history")?;

    Ok(rows.iter().map(row_to_checkin_sqlite).collect())
}

async fn devices_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    since_ms: i64,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT device_id FROM checkins \
         WHERE group_code = ? AND checked_in_at >= ?",
    )
    .bind(group_code)
    .bind(since_ms)
    .fetch_all(pool)
    .await
    .context("Failed to list devices")?;

    Ok(rows.iter().map(|row| row.get("device_id")).collect())
}

async fn expire_stale_sqlite(
    pool: &SqlitePool,
    group_code: &str,
    cutoff_ms: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE checkins SET is_active = 0 \
         WHERE group_code = ? AND is_active = 1 AND checked_out_at IS NULL \
           AND checked_in_at < ?",
    )
    .bind(group_code)
    .bind(cutoff_ms)
    .execute(pool)
    .await
    .context("Failed to expire stale check-ins")?;

    Ok(result.rows_affected())
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn row_to_checkin_mysql(row: &MySqlRow) -> CheckinRecord {
    let lng: Option<f64> = row.get("accommodation_lng");
    let lat: Option<f64> = row.get("accommodation_lat");

    CheckinRecord {
        id: row.get("id"),
        group_code: row.get("group_code"),
        device_id: row.get("device_id"),
        user_name: row.get("user_name"),
        place_id: row.get("place_id"),
        place_name: row.get("place_name"),
        checked_in_at: row.get("checked_in_at"),
        checked_out_at: row.get("checked_out_at"),
        is_active: row.get("is_active"),
        accommodation_place_id: row.get("accommodation_place_id"),
        accommodation_coords: match (lng, lat) {
            (Some(lng), Some(lat)) => Some(Coordinates { lng, lat }),
            _ => None,
        },
        accommodation_name: row.get("accommodation_name"),
        display_accommodation_to_group: row.get("display_accommodation_to_group"),
    }
}

async fn check_in_mysql(pool: &MySqlPool, new: &NewCheckin) -> Result<CheckinRecord> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(SUPERSEDE_SQL)
        .bind(new.checked_in_at)
        .bind(&new.group_code)
        .bind(&new.device_id)
        .execute(&mut *tx)
        .await
        .context("Failed to supersede active check-ins")?;

    let result = sqlx::query(INSERT_SQL)
        .bind(&new.group_code)
        .bind(&new.device_id)
        .bind(&new.user_name)
        .bind(new.place_id)
        .bind(&new.place_name)
        .bind(new.checked_in_at)
        .bind(new.accommodation_place_id)
        .bind(new.accommodation_coords.map(|c| c.lng))
        .bind(new.accommodation_coords.map(|c| c.lat))
        .bind(&new.accommodation_name)
        .bind(new.display_accommodation_to_group)
        .execute(&mut *tx)
        .await
        .context("Failed to insert check-in")?;

    let id = result.last_insert_id() as i64;
    let row = sqlx::query(&format!("SELECT {} FROM checkins WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back inserted check-in")?;

    tx.commit().await.context("Failed to commit check-in")?;

    Ok(row_to_checkin_mysql(&row))
}

async fn deactivate_mysql(
    pool: &MySqlPool,
    group_code: &str,
    device_id: &str,
    place_id: Option<i64>,
    checked_out_at: i64,
) -> Result<u64> {
    let result = match place_id {
        Some(place_id) => {
            sqlx::query(
                "UPDATE checkins SET is_active = 0, checked_out_at = ? \
                 WHERE group_code = ? AND device_id = ? AND place_id = ? AND is_active = 1",
            )
            .bind(checked_out_at)
            .bind(group_code)
            .bind(device_id)
            .bind(place_id)
            .execute(pool)
            .await
        }
        None => {
            sqlx::query(SUPERSEDE_SQL)
                .bind(checked_out_at)
                .bind(group_code)
                .bind(device_id)
                .execute(pool)
                .await
        }
    }
    .context("Failed to deactivate check-ins")?;

    Ok(result.rows_affected())
}

async fn latest_mysql(
    pool: &MySqlPool,
    group_code: &str,
    device_id: &str,
    with_accommodation: bool,
) -> Result<Option<CheckinRecord>> {
    let filter = if with_accommodation {
        " AND accommodation_place_id IS NOT NULL"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND device_id = ?{} \
         ORDER BY checked_in_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS, filter
    );

    let row = sqlx::query(&sql)
        .bind(group_code)
        .bind(device_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get latest check-in")?;

    Ok(row.map(|row| row_to_checkin_mysql(&row)))
}

async fn set_accommodation_mysql(
    pool: &MySqlPool,
    group_code: &str,
    device_id: &str,
    update: &AccommodationUpdate,
) -> Result<Option<CheckinRecord>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND device_id = ? \
         ORDER BY checked_in_at DESC, id DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(group_code)
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to locate latest check-in")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let latest = row_to_checkin_mysql(&row);
    let (place_id, coords, name) = merged_accommodation(&latest, update);

    sqlx::query(
        "UPDATE checkins SET accommodation_place_id = ?, accommodation_lng = ?, \
         accommodation_lat = ?, accommodation_name = ?, display_accommodation_to_group = ? \
         WHERE id = ?",
    )
    .bind(place_id)
    .bind(coords.map(|c| c.lng))
    .bind(coords.map(|c| c.lat))
    .bind(&name)
    .bind(update.share)
    .bind(latest.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update accommodation")?;

    sqlx::query(
        "UPDATE checkins SET is_active = 0, checked_out_at = ? \
         WHERE group_code = ? AND device_id = ? AND is_active = 1 AND id != ?",
    )
    .bind(update.updated_at)
    .bind(group_code)
    .bind(device_id)
    .bind(latest.id)
    .execute(&mut *tx)
    .await
    .context("Failed to close stale check-ins")?;

    let row = sqlx::query(&format!("SELECT {} FROM checkins WHERE id = ?", SELECT_COLUMNS))
        .bind(latest.id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read back accommodation update")?;

    tx.commit()
        .await
        .context("Failed to commit accommodation update")?;

    Ok(Some(row_to_checkin_mysql(&row)))
}

async fn active_for_group_mysql(pool: &MySqlPool, group_code: &str) -> Result<Vec<CheckinRecord>> {
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND is_active = 1 \
         ORDER BY checked_in_at DESC, id DESC",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(group_code)
        .fetch_all(pool)
        .await
        .context("Failed to list active check-ins")?;

    Ok(rows.iter().map(row_to_checkin_mysql).collect())
}

async fn history_mysql(
    pool: &MySqlPool,
    group_code: &str,
    since_ms: i64,
) -> Result<Vec<CheckinRecord>> {
    let sql = format!(
        "SELECT {} FROM checkins WHERE group_code = ? AND checked_in_at >= ? \
         ORDER BY checked_in_at DESC, id DESC",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(group_code)
        .bind(since_ms)
        .fetch_all(pool)
        .await
        .context("Failed to list check-in history")?;

    Ok(rows.iter().map(row_to_checkin_mysql).collect())
}

async fn devices_mysql(pool: &MySqlPool, group_code: &str, since_ms: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT device_id FROM checkins \
         WHERE group_code = ? AND checked_in_at >= ?",
    )
    .bind(group_code)
    .bind(since_ms)
    .fetch_all(pool)
    .await
    .context("Failed to list devices")?;

    Ok(rows.iter().map(|row| row.get("device_id")).collect())
}

async fn expire_stale_mysql(pool: &MySqlPool, group_code: &str, cutoff_ms: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE checkins SET is_active = 0 \
         WHERE group_code = ? AND is_active = 1 AND checked_out_at IS NULL \
           AND checked_in_at < ?",
    )
    .bind(group_code)
    .bind(cutoff_ms)
    .execute(pool)
    .await
    .context("Failed to expire stale check-ins")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::group::{GroupRepository, SqlxGroupRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::Group;

    const GROUP: &str = "271828";
    const DEVICE: &str = "dave2";

    async fn setup_test_repo() -> SqlxCheckinRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let groups = SqlxGroupRepository::new(pool.clone());
        groups
            .insert(&Group {
                code: GROUP.to_string(),
                created_at: chrono::Utc::now(),
                expires_at: None,
            })
            .await
            .expect("Failed to seed group");

        SqlxCheckinRepository::new(pool)
    }

    fn new_checkin(place_id: i64, at: i64) -> NewCheckin {
        NewCheckin {
            group_code: GROUP.to_string(),
            device_id: DEVICE.to_string(),
            user_name: "Dave".to_string(),
            place_id,
            place_name: format!("Place {}", place_id),
            checked_in_at: at,
            accommodation_place_id: None,
            accommodation_coords: None,
            accommodation_name: None,
            display_accommodation_to_group: false,
        }
    }

    async fn active_rows(repo: &SqlxCheckinRepository) -> Vec<CheckinRecord> {
        repo.active_for_group(GROUP)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.device_id == DEVICE)
            .collect()
    }

    #[tokio::test]
    async fn check_in_supersedes_previous_active_row() {
        let repo = setup_test_repo().await;

        let first = repo.check_in(&new_checkin(1, 1_000)).await.unwrap();
        assert!(first.is_active);

        let second = repo.check_in(&new_checkin(2, 2_000)).await.unwrap();
        assert!(second.is_active);

        let active = active_rows(&repo).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        // The superseded row was closed at the new check-in's timestamp.
        let history = repo.history(GROUP, 0).await.unwrap();
        let old = history.iter().find(|r| r.id == first.id).unwrap();
        assert!(!old.is_active);
        assert_eq!(old.checked_out_at, Some(2_000));
    }

    #[tokio::test]
    async fn targeted_deactivation_only_touches_matching_place() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(5, 1_000)).await.unwrap();

        let missed = repo
            .deactivate_at_place(GROUP, DEVICE, 99, 2_000)
            .await
            .unwrap();
        assert_eq!(missed, 0);
        assert_eq!(active_rows(&repo).await.len(), 1);

        let hit = repo
            .deactivate_at_place(GROUP, DEVICE, 5, 2_000)
            .await
            .unwrap();
        assert_eq!(hit, 1);
        assert!(active_rows(&repo).await.is_empty());
    }

    #[tokio::test]
    async fn deactivate_all_closes_every_active_row() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(1, 1_000)).await.unwrap();
        repo.check_in(&new_checkin(2, 2_000)).await.unwrap();

        let closed = repo.deactivate_all(GROUP, DEVICE, 3_000).await.unwrap();
        assert_eq!(closed, 1);
        assert!(active_rows(&repo).await.is_empty());
    }

    #[tokio::test]
    async fn latest_lookups_can_disagree() {
        let repo = setup_test_repo().await;

        let mut with_accommodation = new_checkin(1, 1_000);
        with_accommodation.accommodation_place_id = Some(42);
        with_accommodation.accommodation_name = Some("Nozawa House".to_string());
        with_accommodation.display_accommodation_to_group = true;
        repo.check_in(&with_accommodation).await.unwrap();

        repo.check_in(&new_checkin(2, 2_000)).await.unwrap();

        let latest = repo.latest_for_device(GROUP, DEVICE).await.unwrap().unwrap();
        assert_eq!(latest.place_id, 2);
        assert!(latest.accommodation_place_id.is_none());

        let latest_acc = repo
            .latest_with_accommodation(GROUP, DEVICE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest_acc.place_id, 1);
        assert_eq!(latest_acc.accommodation_name.as_deref(), Some("Nozawa House"));
    }

    #[tokio::test]
    async fn set_accommodation_targets_latest_row_and_keeps_fields_on_unshare() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(1, 1_000)).await.unwrap();

        let shared = repo
            .set_accommodation(
                GROUP,
                DEVICE,
                &AccommodationUpdate {
                    share: true,
                    place_id: Some(42),
                    coords: Some(Coordinates { lng: 138.44, lat: 36.92 }),
                    name: Some("Pension Schnee".to_string()),
                    updated_at: 2_000,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(shared.display_accommodation_to_group);
        assert_eq!(shared.accommodation_name.as_deref(), Some("Pension Schnee"));

        // Turning sharing off keeps every stored accommodation field.
        let hidden = repo
            .set_accommodation(
                GROUP,
                DEVICE,
                &AccommodationUpdate {
                    share: false,
                    place_id: None,
                    coords: None,
                    name: None,
                    updated_at: 3_000,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!hidden.display_accommodation_to_group);
        assert_eq!(hidden.accommodation_place_id, Some(42));
        assert_eq!(hidden.accommodation_name.as_deref(), Some("Pension Schnee"));
        assert!(hidden.accommodation_coords.is_some());
    }

    #[tokio::test]
    async fn set_accommodation_without_rows_is_none() {
        let repo = setup_test_repo().await;
        let result = repo
            .set_accommodation(
                GROUP,
                "ghost-device",
                &AccommodationUpdate {
                    share: true,
                    place_id: Some(1),
                    coords: None,
                    name: None,
                    updated_at: 1_000,
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn expire_stale_leaves_checkout_stamp_unset() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(1, 1_000)).await.unwrap();

        let swept = repo.expire_stale(GROUP, 5_000).await.unwrap();
        assert_eq!(swept, 1);

        let history = repo.history(GROUP, 0).await.unwrap();
        assert!(!history[0].is_active);
        assert!(history[0].checked_out_at.is_none());
    }

    #[tokio::test]
    async fn history_orders_newest_first_with_id_tiebreak() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(1, 1_000)).await.unwrap();
        repo.check_in(&new_checkin(2, 1_000)).await.unwrap();
        repo.check_in(&new_checkin(3, 2_000)).await.unwrap();

        let history = repo.history(GROUP, 0).await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.place_id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }

    #[tokio::test]
    async fn devices_in_window_is_distinct() {
        let repo = setup_test_repo().await;
        repo.check_in(&new_checkin(1, 1_000)).await.unwrap();
        repo.check_in(&new_checkin(2, 2_000)).await.unwrap();

        let mut other = new_checkin(3, 3_000);
        other.device_id = "lena".to_string();
        repo.check_in(&other).await.unwrap();

        let mut devices = repo.devices_in_window(GROUP, 0).await.unwrap();
        devices.sort();
        assert_eq!(devices, vec!["dave2".to_string(), "lena".to_string()]);

        let recent = repo.devices_in_window(GROUP, 2_500).await.unwrap();
        assert_eq!(recent, vec!["lena".to_string()]);
    }
}
