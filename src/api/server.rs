use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers::get_status;
use crate::db::{Connector, PoolHolder};

/// Shared state handed to every route.
pub struct AppState<C: Connector> {
    pub pools: Arc<PoolHolder<C>>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
        }
    }
}

/// Build the router. Unknown paths get 404, other methods on `/status` get 405.
pub fn build_router<C: Connector + Clone>(pools: Arc<PoolHolder<C>>) -> Router {
    Router::new()
        .route("/status", get(get_status::<C>))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB max body
        .with_state(AppState { pools })
}
