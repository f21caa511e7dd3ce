//! Shared API response types
//!
//! Wire representations of ledger rows and member views, plus the relative
//! time annotation on history entries. The wire uses camelCase keys; the
//! `status`/`time_ago` annotations keep the names clients already rely on.

use serde::{Deserialize, Serialize};

use crate::models::{CheckinRecord, Coordinates, MemberView};

/// A ledger row as returned by check-in and accommodation endpoints
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub id: i64,
    pub group_code: String,
    pub device_id: String,
    pub user_name: String,
    pub place_id: i64,
    pub place_name: String,
    pub checked_in_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out_at: Option<i64>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation_place_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation_coords: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation_name: Option<String>,
    pub display_accommodation_to_group: bool,
}

impl From<CheckinRecord> for CheckinResponse {
    fn from(record: CheckinRecord) -> Self {
        Self {
            id: record.id,
            group_code: record.group_code,
            device_id: record.device_id,
            user_name: record.user_name,
            place_id: record.place_id,
            place_name: record.place_name,
            checked_in_at: record.checked_in_at,
            checked_out_at: record.checked_out_at,
            is_active: record.is_active,
            accommodation_place_id: record.accommodation_place_id,
            accommodation_coords: record.accommodation_coords,
            accommodation_name: record.accommodation_name,
            display_accommodation_to_group: record.display_accommodation_to_group,
        }
    }
}

/// A history entry: the row plus its derived status and a relative time
#[derive(Debug, Serialize)]
pub struct CheckinHistoryEntry {
    #[serde(flatten)]
    pub checkin: CheckinResponse,
    pub status: &'static str,
    pub time_ago: String,
}

impl CheckinHistoryEntry {
    pub fn from_record(record: CheckinRecord, now_ms: i64) -> Self {
        let status = record.status().as_str();
        let time_ago = format_time_ago(now_ms, record.checked_in_at);
        Self {
            checkin: record.into(),
            status,
            time_ago,
        }
    }
}

/// A member view on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub device_id: String,
    pub user_name: String,
    pub last_checked_in_at: i64,
    pub is_checked_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currently_at: Option<CurrentPlaceResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<AccommodationResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPlaceResponse {
    pub place_id: i64,
    pub place_name: String,
    pub checked_in_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccommodationResponse {
    pub place_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<MemberView> for MemberResponse {
    fn from(member: MemberView) -> Self {
        Self {
            device_id: member.device_id,
            user_name: member.user_name,
            last_checked_in_at: member.last_checked_in_at,
            is_checked_in: member.is_checked_in,
            currently_at: member.currently_at.map(|p| CurrentPlaceResponse {
                place_id: p.place_id,
                place_name: p.place_name,
                checked_in_at: p.checked_in_at,
            }),
            accommodation: member.accommodation.map(|a| AccommodationResponse {
                place_id: a.place_id,
                coords: a.coords,
                name: a.name,
            }),
        }
    }
}

/// Compact "how long ago" label for history entries
pub fn format_time_ago(now_ms: i64, then_ms: i64) -> String {
    let delta_secs = (now_ms - then_ms).max(0) / 1000;
    match delta_secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", delta_secs / 60),
        3_600..=86_399 => format!("{}h ago", delta_secs / 3_600),
        _ => format!("{}d ago", delta_secs / 86_400),
    }
}
