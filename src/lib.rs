//! Short links with click tracking.
//!
//! Visitors following `/l/:id` are redirected to the link's destination while
//! a click (client IP, user agent, referrer, approximate location) is
//! appended to the link's history.

use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

pub mod client_ip;
pub mod config;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod shortcode;
pub mod store;

use geo::GeoResolver;
use pipeline::RedirectPipeline;
use store::{LinkRepository, LinkStore};

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub store: LinkStore,
    pub pipeline: RedirectPipeline,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        repo: Arc<dyn LinkRepository>,
        geo: GeoResolver,
    ) -> Arc<Self> {
        let store = LinkStore::new(repo);
        let pipeline = RedirectPipeline::new(store.clone(), Arc::new(geo));
        Arc::new(Self {
            config,
            store,
            pipeline,
        })
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/links",
            get(handlers::links::list_links).post(handlers::links::create_link),
        )
        .route(
            "/links/:id",
            get(handlers::links::get_link).delete(handlers::links::delete_link),
        )
        .route("/l/:id", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
