//! Database repositories
//!
//! Repository pattern implementations for database access. Each repository
//! is a trait (so services can be tested against fakes) with a SQLx-backed
//! implementation covering both SQLite and MySQL.

pub mod checkin;
pub mod group;

pub use checkin::{CheckinRepository, SqlxCheckinRepository};
pub use group::{GroupRepository, SqlxGroupRepository};
