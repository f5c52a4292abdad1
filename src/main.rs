mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::services::access::AccessGate;
use crate::services::derivative::DerivativePolicy;
use crate::services::resolver::AssetResolver;
use crate::services::token::TokenCodec;
use crate::storage::AssetStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub resolver: Arc<AssetResolver>,
    pub gate: Arc<AccessGate>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let store = AssetStore::local(config.storage.root.clone());
        let policy = DerivativePolicy::from_config(&config.derivative);
        let resolver = AssetResolver::new(store, policy, config.derivative.worker_count());
        let gate = AccessGate::new(TokenCodec::from_config(&config.token), Arc::new(db.clone()));

        Self {
            db,
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            gate: Arc::new(gate),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photovault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting photovault...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(db, config);
    tracing::info!(
        "Asset store: {} at {}",
        state.resolver.store().storage_type(),
        state.config.storage.root
    );

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes; album contents are gated per request
    let public_routes = Router::new()
        .route("/albums", get(handlers::album::list_albums))
        .route(
            "/albums/:album_id/images",
            get(handlers::album::list_album_images),
        )
        .route(
            "/albums/:album_id/image-count",
            get(handlers::album::image_count),
        )
        .route(
            "/albums/:album_id/has-password",
            get(handlers::password::has_password),
        )
        .route(
            "/albums/:album_id/verify-password",
            post(handlers::password::verify_password),
        )
        .route(
            "/albums/:album_id/images/:image_id/file",
            get(handlers::image::get_image_file),
        );

    // Admin routes
    let admin_routes = Router::new()
        .route("/albums", post(handlers::album::create_album))
        .route(
            "/albums/:album_id",
            put(handlers::album::update_album).delete(handlers::album::delete_album),
        )
        .route(
            "/albums/:album_id/images",
            post(handlers::image::upload_image),
        )
        .route(
            "/albums/:album_id/password",
            post(handlers::password::set_password).delete(handlers::password::remove_password),
        )
        .route("/images/:image_id", delete(handlers::image::delete_image))
        .route(
            "/images/:image_id/favorite",
            post(handlers::image::toggle_favorite),
        )
        .route(
            "/images/:image_id/rename",
            post(handlers::image::rename_image),
        )
        .route(
            "/images/:image_id/description",
            put(handlers::image::update_description),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_middleware,
        ));

    // Combine all routes under /api/v1
    Router::new()
        .nest("/api/v1", public_routes.merge(admin_routes))
        .layer(DefaultBodyLimit::max(state.config.storage.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
