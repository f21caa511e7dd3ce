//! Member and accommodation API endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::{CheckinResponse, MemberResponse};
use crate::api::{ApiError, AppState};
use crate::models::Coordinates;
use crate::services::AccommodationInput;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccommodationRequest {
    pub share: bool,
    #[serde(default)]
    pub accommodation_place_id: Option<i64>,
    #[serde(default)]
    pub accommodation_coords: Option<Coordinates>,
    #[serde(default)]
    pub accommodation_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub members: Vec<MemberResponse>,
}

/// GET /groups/{code}/members - latest-known snapshot of every member
pub async fn list_members(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<MemberListResponse>, ApiError> {
    let members = state.presence.members(&code).await?;
    Ok(Json(MemberListResponse {
        members: members.into_iter().map(MemberResponse::from).collect(),
    }))
}

/// PUT /groups/{code}/members/{deviceId}/accommodation - update lodging
///
/// `share` is the only field that has to be present; omitted accommodation
/// fields keep their stored values, so a bare visibility toggle round-trips
/// the same lodging it started with.
pub async fn update_accommodation(
    State(state): State<AppState>,
    Path((code, device_id)): Path<(String, String)>,
    Json(req): Json<AccommodationRequest>,
) -> Result<Json<CheckinResponse>, ApiError> {
    let record = state
        .presence
        .update_accommodation(
            &code,
            &device_id,
            AccommodationInput {
                share: req.share,
                place_id: req.accommodation_place_id,
                coords: req.accommodation_coords,
                name: req.accommodation_name,
            },
        )
        .await?;

    Ok(Json(CheckinResponse::from(record)))
}
