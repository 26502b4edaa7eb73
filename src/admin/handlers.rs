use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_sessions: u64,
    pub total_sessions: u64,
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    pub name: String,
    pub mount: String,
    pub bucket: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        active_sessions: state.sessions.active_count(),
        total_sessions: state.sessions.total_count(),
    })
}

/// Routes of the live configuration, most specific first.
pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteStatus>> {
    let ctx = state.inner.load();
    let routes = ctx
        .router
        .routes()
        .iter()
        .map(|r| RouteStatus {
            name: r.name.clone(),
            mount: r.matcher.mount().to_string(),
            bucket: r.bucket.clone(),
        })
        .collect();
    Json(routes)
}
