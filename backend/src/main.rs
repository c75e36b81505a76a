use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod handlers;
mod pagination;
mod response;
mod services;
mod validation;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};
pub use validation::Validator;

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
}

pub fn app(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(|| async { "QuickPay Invoicing API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .nest("/api/v1/clients", handlers::client_routes())
        .nest("/api/v1/payments", handlers::payment_routes())
        .nest("/api/v1/invoices", handlers::invoice_routes())
        .nest("/api/v1/stats", handlers::stats_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    // One explicit connectivity check at startup; afterwards /health/ready is
    // the live signal for the load balancer.
    if !database::health_check(&db_pool).await {
        anyhow::bail!("Database is unreachable at startup");
    }
    tracing::info!("Startup health check passed");

    let app_state = Arc::new(AppState { db_pool });

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = app(app_state, cors);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!(
        "Server running on {} ({})",
        config.server_addr,
        config.environment
    );

    axum::serve(listener, app).await?;

    Ok(())
}
