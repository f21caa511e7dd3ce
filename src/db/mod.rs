//! Database layer
//!
//! This module provides database abstraction for the Slopemate service.
//! It supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The driver is selected based on configuration. Repositories work against
//! the `DynDatabasePool` abstraction so the rest of the service never knows
//! which backend it is talking to.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
