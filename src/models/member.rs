//! Derived member views
//!
//! A member is not stored anywhere; it is the latest-known snapshot of a
//! device within a group, combined from two possibly different ledger rows:
//! the most recent row overall (identity, current activity) and the most
//! recent row carrying accommodation data.

use serde::Serialize;

use super::Coordinates;

/// Where a member currently is, when they are checked in somewhere
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlace {
    pub place_id: i64,
    pub place_name: String,
    /// Epoch milliseconds
    pub checked_in_at: i64,
}

/// A member's shared accommodation
///
/// Only present in a view when the member opted into sharing; the stored
/// fields survive unshared periods untouched.
#[derive(Debug, Clone, Serialize)]
pub struct AccommodationView {
    pub place_id: i64,
    pub coords: Option<Coordinates>,
    pub name: Option<String>,
}

/// Latest-known snapshot of a device in a group
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub device_id: String,
    pub user_name: String,
    /// Epoch milliseconds of the member's most recent check-in
    pub last_checked_in_at: i64,
    pub is_checked_in: bool,
    pub currently_at: Option<CurrentPlace>,
    pub accommodation: Option<AccommodationView>,
}
