//! services/api/src/bin/api.rs

use api_lib::{
    accounts::{AccountService, AccountSettings},
    adapters::{build_s3_client, DbAdapter, S3Store},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// How often expired login sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let s3_client = build_s3_client(&config).await;
    let store = Arc::new(S3Store::new(
        s3_client,
        config.s3_bucket.clone(),
        config.s3_public_base_url.clone(),
    ));
    info!(bucket = %config.s3_bucket, "Object store client initialized");

    let accounts = AccountService::new(
        db_adapter.clone(),
        AccountSettings {
            admin_emails: config.admin_emails.clone(),
            session_ttl: config.session_ttl,
            app_base_url: config.app_base_url.clone(),
        },
    );
    if config.admin_emails.is_empty() {
        warn!("ADMIN_EMAILS is empty; nobody will be able to manage notes");
    }

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        notes: db_adapter.clone(),
        favorites: db_adapter,
        store,
        accounts: accounts.clone(),
        config: config.clone(),
    });

    // --- 5. Sweep Expired Login Sessions ---
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match accounts.expire_sessions().await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "Expired login sessions removed"),
                Err(e) => warn!(error = %e, "Failed to sweep expired login sessions"),
            }
        }
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
