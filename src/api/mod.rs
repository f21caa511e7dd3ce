//! API layer - HTTP handlers and routing
//!
//! This module contains the HTTP endpoints for the Slopemate service:
//! - Group creation and join-code lookup
//! - Check-in / checkout
//! - Check-in history
//! - Member list and accommodation updates

pub mod checkins;
pub mod error;
pub mod groups;
pub mod members;
pub mod responses;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::DynDatabasePool;
use crate::services::{GroupRegistry, PresenceService};

pub use error::ApiError;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub registry: Arc<GroupRegistry>,
    pub presence: Arc<PresenceService>,
}

/// Build the main API router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/groups", post(groups::create_group))
        .route("/groups/{code}", get(groups::get_group))
        .route("/groups/{code}/checkin", post(checkins::check_in))
        .route("/groups/{code}/checkout", post(checkins::check_out))
        .route("/groups/{code}/checkins", get(checkins::list_checkins))
        .route("/groups/{code}/members", get(members::list_members))
        .route(
            "/groups/{code}/members/{device_id}/accommodation",
            put(members::update_accommodation),
        )
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>().expect("invalid CORS origin"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api/v1", build_api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresenceConfig;
    use crate::db::repositories::{SqlxCheckinRepository, SqlxGroupRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::places::NullPlaceDirectory;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    async fn test_server() -> TestServer {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let groups = SqlxGroupRepository::shared(pool.clone());
        let checkins = SqlxCheckinRepository::shared(pool.clone());
        let config = PresenceConfig::default();

        let state = AppState {
            pool,
            registry: Arc::new(GroupRegistry::new(groups.clone(), &config)),
            presence: Arc::new(PresenceService::new(
                groups,
                checkins,
                Arc::new(NullPlaceDirectory),
                config,
            )),
        };

        TestServer::new(build_router(state, "http://localhost:3000")).unwrap()
    }

    async fn create_group(server: &TestServer) -> String {
        let response = server.post("/api/v1/groups").await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["code"].as_str().unwrap().to_string()
    }

    fn checkin_body(device: &str, place_id: i64) -> Value {
        json!({
            "deviceId": device,
            "userName": "Dave",
            "placeId": place_id,
            "placeName": format!("Place {}", place_id),
        })
    }

    #[tokio::test]
    async fn group_creation_and_lookup() {
        let server = test_server().await;
        let code = create_group(&server).await;
        assert_eq!(code.len(), 6);

        let response = server.get(&format!("/api/v1/groups/{}", code)).await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["exists"], json!(true));
        assert_eq!(body["group"]["code"].as_str().unwrap(), code);

        let response = server.get("/api/v1/groups/000001").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["exists"], json!(false));
    }

    #[tokio::test]
    async fn check_in_returns_created_record() {
        let server = test_server().await;
        let code = create_group(&server).await;

        let response = server
            .post(&format!("/api/v1/groups/{}/checkin", code))
            .json(&checkin_body("dave2", 7))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body = response.json::<Value>();
        assert_eq!(body["deviceId"], json!("dave2"));
        assert_eq!(body["placeId"], json!(7));
        assert_eq!(body["isActive"], json!(true));
    }

    #[tokio::test]
    async fn check_in_against_unknown_group_is_404() {
        let server = test_server().await;

        let response = server
            .post("/api/v1/groups/999999/checkin")
            .json(&checkin_body("dave2", 7))
            .await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"]["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_code() {
        let server = test_server().await;
        let code = create_group(&server).await;

        let response = server
            .post(&format!("/api/v1/groups/{}/checkin", code))
            .json(&json!({
                "deviceId": "",
                "userName": "Dave",
                "placeId": 7,
                "placeName": "Somewhere",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"]["code"],
            json!("VALIDATION_ERROR")
        );
    }

    #[tokio::test]
    async fn checkout_modes() {
        let server = test_server().await;
        let code = create_group(&server).await;

        server
            .post(&format!("/api/v1/groups/{}/checkin", code))
            .json(&checkin_body("dave2", 7))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        // Targeted checkout at the wrong place misses.
        let response = server
            .post(&format!("/api/v1/groups/{}/checkout", code))
            .json(&json!({"deviceId": "dave2", "placeId": 99}))
            .await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);

        // Full leave works without a place id.
        let response = server
            .post(&format!("/api/v1/groups/{}/checkout", code))
            .json(&json!({"deviceId": "dave2"}))
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["mode"], json!("full"));
        assert_eq!(body["rowsAffected"], json!(1));
    }

    #[tokio::test]
    async fn members_reflect_accommodation_visibility() {
        let server = test_server().await;
        let code = create_group(&server).await;

        server
            .post(&format!("/api/v1/groups/{}/checkin", code))
            .json(&checkin_body("dave2", 7))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        // Share accommodation through the dedicated endpoint.
        let response = server
            .put(&format!("/api/v1/groups/{}/members/dave2/accommodation", code))
            .json(&json!({
                "share": true,
                "accommodationPlaceId": 42,
                "accommodationCoords": {"lng": 138.44, "lat": 36.92},
                "accommodationName": "Pension Schnee",
            }))
            .await;
        response.assert_status_ok();

        let response = server.get(&format!("/api/v1/groups/{}/members", code)).await;
        let body = response.json::<Value>();
        let member = &body["members"][0];
        assert_eq!(member["isCheckedIn"], json!(true));
        assert_eq!(member["accommodation"]["name"], json!("Pension Schnee"));

        // Hide it; the stored value survives, the view omits it.
        server
            .put(&format!("/api/v1/groups/{}/members/dave2/accommodation", code))
            .json(&json!({"share": false}))
            .await
            .assert_status_ok();

        let response = server.get(&format!("/api/v1/groups/{}/members", code)).await;
        let member = &response.json::<Value>()["members"][0];
        assert!(member.get("accommodation").is_none());

        // Reveal again without resending the payload.
        server
            .put(&format!("/api/v1/groups/{}/members/dave2/accommodation", code))
            .json(&json!({"share": true}))
            .await
            .assert_status_ok();

        let response = server.get(&format!("/api/v1/groups/{}/members", code)).await;
        let member = &response.json::<Value>()["members"][0];
        assert_eq!(member["accommodation"]["name"], json!("Pension Schnee"));
    }

    #[tokio::test]
    async fn accommodation_update_for_unknown_device_is_404() {
        let server = test_server().await;
        let code = create_group(&server).await;

        let response = server
            .put(&format!("/api/v1/groups/{}/members/ghost/accommodation", code))
            .json(&json!({"share": true, "accommodationPlaceId": 1}))
            .await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_carries_status_and_time_ago() {
        let server = test_server().await;
        let code = create_group(&server).await;

        server
            .post(&format!("/api/v1/groups/{}/checkin", code))
            .json(&checkin_body("dave2", 7))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = server.get(&format!("/api/v1/groups/{}/checkins", code)).await;
        response.assert_status_ok();
        let entry = &response.json::<Value>()["checkins"][0];
        assert_eq!(entry["status"], json!("active"));
        assert_eq!(entry["time_ago"], json!("just now"));
    }
}
