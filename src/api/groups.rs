//! Group API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::{ApiError, AppState};
use crate::models::Group;

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub code: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            code: group.code,
            created_at: group.created_at.to_rfc3339(),
            expires_at: group.expires_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupLookupResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupInfo>,
}

/// POST /groups - create a group under a fresh join code
pub async fn create_group(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state.registry.create_group().await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse { code: group.code }),
    ))
}

/// GET /groups/{code} - check whether a join code exists
pub async fn get_group(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GroupLookupResponse>, ApiError> {
    let group = state.registry.find(&code).await?;
    Ok(Json(GroupLookupResponse {
        exists: group.is_some(),
        group: group.map(GroupInfo::from),
    }))
}
