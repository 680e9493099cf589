//! Demo service for DocuSign envelopes
//!
//! Provides REST endpoints for:
//! - Backend settings
//! - Envelope creation from an uploaded document or a DocuSign template
//! - Embedded signing redirects and the signer return page
//! - Status callbacks and document download

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use config::Config;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        .route("/", get(handlers::home))
        .route(
            "/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        // Envelopes
        .route("/signatures", post(handlers::create_signature))
        .route(
            "/signatures/template",
            post(handlers::create_template_signature),
        )
        .route("/signatures/:id", get(handlers::get_signature))
        .route("/signatures/:id/document", get(handlers::get_document))
        // Embedded signing
        .route("/signers/:id", get(handlers::signer_view))
        .route("/signers/:id/return", get(handlers::signer_return))
        // Backend status notifications
        .route("/callback", post(handlers::callback))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
