//! Check-in and checkout API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::responses::{CheckinHistoryEntry, CheckinResponse};
use crate::api::{ApiError, AppState};
use crate::models::Coordinates;
use crate::services::CheckInInput;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub device_id: String,
    pub user_name: String,
    pub place_id: i64,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub accommodation_place_id: Option<i64>,
    #[serde(default)]
    pub accommodation_coords: Option<Coordinates>,
    #[serde(default)]
    pub accommodation_name: Option<String>,
    #[serde(default)]
    pub display_accommodation_to_group: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    pub device_id: String,
    #[serde(default)]
    pub place_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutResponse {
    pub mode: &'static str,
    pub rows_affected: u64,
}

#[derive(Debug, Serialize)]
pub struct CheckinListResponse {
    pub checkins: Vec<CheckinHistoryEntry>,
}

/// POST /groups/{code}/checkin - record a device at a place
pub async fn check_in(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .presence
        .check_in(
            &code,
            CheckInInput {
                device_id: req.device_id,
                user_name: req.user_name,
                place_id: req.place_id,
                place_name: req.place_name,
                accommodation_place_id: req.accommodation_place_id,
                accommodation_coords: req.accommodation_coords,
                accommodation_name: req.accommodation_name,
                display_accommodation_to_group: req.display_accommodation_to_group,
                timestamp: req.timestamp,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(CheckinResponse::from(record))))
}

/// POST /groups/{code}/checkout - close one check-in, or leave the group
///
/// A request with a place id only closes the check-in at that place; one
/// without closes everything the device still has open.
pub async fn check_out(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<CheckOutRequest>,
) -> Result<Json<CheckOutResponse>, ApiError> {
    let outcome = state
        .presence
        .check_out(&code, &req.device_id, req.place_id)
        .await?;

    Ok(Json(CheckOutResponse {
        mode: outcome.mode.as_str(),
        rows_affected: outcome.rows_affected,
    }))
}

/// GET /groups/{code}/checkins - history within the window, newest first
pub async fn list_checkins(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CheckinListResponse>, ApiError> {
    let records = state.presence.checkin_history(&code).await?;

    let now = Utc::now().timestamp_millis();
    Ok(Json(CheckinListResponse {
        checkins: records
            .into_iter()
            .map(|record| CheckinHistoryEntry::from_record(record, now))
            .collect(),
    }))
}
