//! Slopemate - anonymous group presence sharing for resort visitors

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slopemate::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{SqlxCheckinRepository, SqlxGroupRepository},
    },
    places::{HttpPlaceDirectory, NullPlaceDirectory, PlaceDirectory},
    services::{GroupRegistry, PresenceService},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slopemate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slopemate presence service...");

    // Load configuration
    let config = Config::load(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize cache (backs place directory lookups)
    let cache = create_cache(&config.cache).await?;

    // Wire up the place directory, if one is configured
    let places: Arc<dyn PlaceDirectory> = match &config.places.base_url {
        Some(base_url) => {
            tracing::info!("Place directory at {}", base_url);
            Arc::new(HttpPlaceDirectory::new(base_url, &config.places, cache)?)
        }
        None => {
            tracing::info!("No place directory configured; using client-supplied place names");
            Arc::new(NullPlaceDirectory)
        }
    };

    // Create repositories and services
    let group_repo = SqlxGroupRepository::shared(pool.clone());
    let checkin_repo = SqlxCheckinRepository::shared(pool.clone());

    let registry = Arc::new(GroupRegistry::new(group_repo.clone(), &config.presence));
    let presence = Arc::new(PresenceService::new(
        group_repo.clone(),
        checkin_repo,
        places,
        config.presence.clone(),
    ));

    // Demo mode: make sure the well-known demo group exists
    #[cfg(feature = "demo")]
    {
        use chrono::Utc;
        use slopemate::db::repositories::GroupRepository;
        use slopemate::models::Group;

        if !group_repo.exists("123456").await? {
            tracing::info!("Demo mode: creating group 123456");
            group_repo
                .insert(&Group {
                    code: "123456".to_string(),
                    created_at: Utc::now(),
                    expires_at: None,
                })
                .await?;
        }
    }

    // Build application state and router
    let state = AppState {
        pool,
        registry,
        presence,
    };
    let app = api::build_router(state, &config.server.cors_origin);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
