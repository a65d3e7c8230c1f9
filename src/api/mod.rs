//! Web API module for Mural
//!
//! REST endpoints for canvas persistence:
//! - `GET    /api/canvas/default`       - fetch (or lazily create) the caller's canvas
//! - `GET    /api/canvas`               - list the caller's canvases
//! - `PUT    /api/canvas/:id`           - save with optimistic concurrency
//! - `PUT    /api/canvas/:id/thumbnail` - upload a rendered thumbnail
//! - `DELETE /api/canvas/:id`           - delete a canvas and its assets
//! - `GET    /health`                   - liveness check

pub mod canvas;
pub mod health;

use axum::Router;

pub use canvas::{canvas_routes, AppState};
pub use health::health_routes;

/// Create the API router with all endpoints
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(canvas_routes(state))
}
