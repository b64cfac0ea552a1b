//! Media stream route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade, one phone call per connection
///
/// # Example
///
/// ```json
/// // Caller transport sends
/// {"event": "start", "streamSid": "MZ..", "start": {"streamSid": "MZ.."}}
/// {"event": "media", "media": {"payload": "<base64 mulaw>", "timestamp": "20"}}
///
/// // Server sends generated audio back
/// {"event": "media", "streamSid": "MZ..", "media": {"payload": "<base64 mulaw>"}}
/// ```
///
/// Connection limits are applied by the caller in `main.rs`.
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
