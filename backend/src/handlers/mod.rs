use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::{database, AppState};

pub mod clients;
pub mod invoices;
pub mod payments;
pub mod stats;

pub use clients::client_routes;
pub use invoices::invoice_routes;
pub use payments::payment_routes;
pub use stats::stats_routes;

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "service": "quickpay-api"})),
    )
}

/// Readiness probe: reports whether the store is reachable right now. The
/// startup connectivity check runs once in main; this endpoint is what a load
/// balancer polls afterwards.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let database_up = database::health_check(&state.db_pool).await;
    let pool = database::get_pool_stats(&state.db_pool);

    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_up { "ready" } else { "unavailable" },
            "database": database_up,
            "pool": pool,
        })),
    )
}
