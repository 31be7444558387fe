//! Route definitions for the Stock Movement Filler

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/stock-fill",
            post(handlers::fill_stock_template).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
