use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{sql_query, RunQueryDsl};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// Liveness plus a database round trip; 503 when the pool cannot serve a query.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state
        .db()
        .and_then(|mut conn| sql_query("SELECT 1").execute(&mut conn).map_err(Into::into));

    match database {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": env!("CARGO_PKG_NAME"),
                "database": "ok",
                "notifications": state.config.telegram.is_some(),
            })),
        ),
        Err(err) => {
            warn!(error = %err.message(), "health check failed to reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "service": env!("CARGO_PKG_NAME"),
                    "database": "unavailable",
                })),
            )
        }
    }
}
