use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::db::check_connection;
use crate::state::AppState;

fn reachability(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// GET /health
/// Reports service version and database reachability. A primary outage
/// answers 503 so load balancers can take the instance out of rotation.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let primary = check_connection(&state.db).await;
    let secondary = match &state.secondary_db {
        Some(pool) => reachability(check_connection(pool).await),
        None => "not_configured",
    };

    let (status, code) = if primary {
        ("ok", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "service": env!("CARGO_PKG_NAME"),
            "database": {
                "primary": reachability(primary),
                "secondary": secondary,
            }
        })),
    )
}
