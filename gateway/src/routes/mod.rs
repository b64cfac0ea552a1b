pub mod api;
pub mod media_stream;

use std::sync::Arc;

use axum::{Router, middleware};

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Assemble every route with its middleware.
///
/// The media stream route is the only one subject to connection limits. The
/// resulting router needs `ConnectInfo<SocketAddr>`, so serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let media_stream_routes = media_stream::create_media_stream_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );

    api::create_api_router()
        .merge(media_stream_routes)
        .with_state(state)
}
