//! Check-in ledger models

use serde::{Deserialize, Serialize};

/// A longitude/latitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    /// Check that the pair describes a point on the globe
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// One row of the check-in ledger
///
/// A row asserts "device declared itself at this place". Accommodation
/// fields ride on the same row but are independent of the check-in's
/// activity: `display_accommodation_to_group` alone decides whether they
/// are exposed to other members, it never clears them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub id: i64,
    pub group_code: String,
    pub device_id: String,
    pub user_name: String,
    pub place_id: i64,
    pub place_name: String,
    /// Epoch milliseconds
    pub checked_in_at: i64,
    /// Epoch milliseconds; unset for rows that were never explicitly
    /// closed (still active, or swept after the TTL)
    pub checked_out_at: Option<i64>,
    pub is_active: bool,
    pub accommodation_place_id: Option<i64>,
    pub accommodation_coords: Option<Coordinates>,
    pub accommodation_name: Option<String>,
    pub display_accommodation_to_group: bool,
}

impl CheckinRecord {
    /// Derive the row's lifecycle status
    ///
    /// A row that is no longer active and has no checkout stamp was swept
    /// by the TTL expiry, not closed by the client.
    pub fn status(&self) -> CheckinStatus {
        if self.is_active {
            CheckinStatus::Active
        } else if let Some(at) = self.checked_out_at {
            CheckinStatus::CheckedOut { at }
        } else {
            CheckinStatus::Expired
        }
    }
}

/// Lifecycle status of a ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinStatus {
    Active,
    CheckedOut { at: i64 },
    Expired,
}

impl CheckinStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CheckedOut { .. } => "checked_out",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for CheckinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for inserting a ledger row
#[derive(Debug, Clone)]
pub struct NewCheckin {
    pub group_code: String,
    pub device_id: String,
    pub user_name: String,
    pub place_id: i64,
    pub place_name: String,
    /// Epoch milliseconds; may be a client-supplied override of "now"
    pub checked_in_at: i64,
    pub accommodation_place_id: Option<i64>,
    pub accommodation_coords: Option<Coordinates>,
    pub accommodation_name: Option<String>,
    pub display_accommodation_to_group: bool,
}

/// Input for updating a device's accommodation state
///
/// Fields left as `None` keep whatever the targeted row already stores;
/// only `share` is always written.
#[derive(Debug, Clone)]
pub struct AccommodationUpdate {
    pub share: bool,
    pub place_id: Option<i64>,
    pub coords: Option<Coordinates>,
    pub name: Option<String>,
    /// Epoch milliseconds used when closing other still-active rows
    pub updated_at: i64,
}
