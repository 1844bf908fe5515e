//! # actlog-server
//!
//! Axum integration for the actlog audit pipeline, plus a small demo
//! application exercising every trigger.

pub mod config;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use config::ServerConfig;
pub use state::AppState;

/// Demo routes wrapped in the audit middleware.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/items", get(routes::list_items).post(routes::create_item))
        .route(
            "/items/{id}",
            get(routes::get_item)
                .put(routes::update_item)
                .delete(routes::delete_item),
        )
        .layer(from_fn_with_state(state.clone(), middleware::audit_requests))
        .with_state(state)
}
