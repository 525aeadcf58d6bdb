pub mod images;

use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

/// Large enough that an oversized upload still reaches validation.
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024; // 8MB

pub fn router(state: AppState, storage_root: &Path) -> Router {
    Router::new()
        .route("/", get(images::index))
        // Images
        .route("/images", get(images::index))
        .route("/images", post(images::store))
        .route("/images/create", get(images::create))
        .route("/images/search", get(images::search))
        .route("/images/{id}", get(images::show))
        .route("/images/{id}", put(images::update))
        .route("/images/{id}", patch(images::update))
        .route("/images/{id}", delete(images::destroy))
        .route("/images/{id}/edit", get(images::edit))
        // Originals and thumbnails
        .nest_service("/storage", ServeDir::new(storage_root))
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
