//! HTTP surface of the tileset service.
//!
//! Routes:
//!
//! | Method | Path                                   | Handler                      |
//! |--------|----------------------------------------|------------------------------|
//! | GET    | `/health`                              | [`handlers::health`]         |
//! | GET    | `/{owner}/tilesets`                    | [`handlers::list_tilesets`]  |
//! | POST   | `/{owner}/tilesets`                    | [`handlers::create_tileset`] |
//! | GET    | `/{owner}/tilesets/{id}`               | [`handlers::get_tileset`]    |
//! | POST   | `/{owner}/tilesets/{id}`               | [`handlers::replace_tileset`]|
//! | PATCH  | `/{owner}/tilesets/{id}`               | [`handlers::update_tileset`] |
//! | DELETE | `/{owner}/tilesets/{id}`               | [`handlers::delete_tileset`] |
//! | GET    | `/{owner}/tilesets/{id}/{z}/{x}/{y}`   | [`handlers::get_tile`]       |
//!
//! Uploads are accepted as soon as the file has been sniffed and the record
//! written; conversion continues in the background and is reported through
//! the record's `progress`, `complete` and `error` fields.

mod error;
pub mod handlers;
mod upload;

pub use error::ApiError;

use crate::import::ImportOrchestrator;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ImportOrchestrator,
    upload_dir: Arc<PathBuf>,
}

impl AppState {
    /// `upload_dir` receives multipart uploads until their import finishes.
    pub fn new(orchestrator: ImportOrchestrator, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            upload_dir: Arc::new(upload_dir.into()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}

/// Builds the router. Request bodies larger than `max_upload_size` bytes are
/// rejected with 413.
pub fn router(state: AppState, max_upload_size: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/:owner/tilesets",
            get(handlers::list_tilesets).post(handlers::create_tileset),
        )
        .route(
            "/:owner/tilesets/:tileset_id",
            get(handlers::get_tileset)
                .post(handlers::replace_tileset)
                .patch(handlers::update_tileset)
                .delete(handlers::delete_tileset),
        )
        .route(
            "/:owner/tilesets/:tileset_id/:z/:x/:y",
            get(handlers::get_tile),
        )
        .layer(DefaultBodyLimit::max(max_upload_size))
        .with_state(state)
}
