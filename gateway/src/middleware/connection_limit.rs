//! Connection limit middleware for call media streams
//!
//! Every media stream upgrade is one phone call. This middleware caps:
//! - concurrent calls across the process
//! - concurrent calls per client IP
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use callrelay_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Extension type to carry the client IP through to the handler
/// so the handler can release the connection when done.
#[derive(Clone, Debug)]
pub struct ClientIp(pub IpAddr);

/// Reject new calls once a limit is hit.
///
/// Returns 503 when the process-wide call limit is reached and 429 when the
/// client IP is at its own limit. On success the slot is held and `ClientIp`
/// is attached so the media stream handler can release it when the call ends.
///
/// Only WebSocket upgrade requests count; plain HTTP passes straight through.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                "Rejecting call: global call limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Call capacity reached. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                "Rejecting call: per-IP call limit reached"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many concurrent calls from your IP address.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use axum::{Router, middleware, routing::get};
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    fn limited_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/media-stream", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                state,
                connection_limit_middleware,
            ))
    }

    fn upgrade_request(ip: [u8; 4]) -> Request<Body> {
        let mut request = Request::builder()
            .uri("/media-stream")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    #[test]
    fn test_connection_tracking_basic() {
        let mut config = test_config();
        config.max_call_connections = Some(10);
        config.max_connections_per_ip = 3;
        let state = AppState::new(config);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.call_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);

        for expected in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.call_connection_count(), expected);
            assert_eq!(state.ip_connection_count(&ip), expected as u32);
        }

        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );

        state.release_connection(ip);
        assert_eq!(state.call_connection_count(), 2);
        assert_eq!(state.ip_connection_count(&ip), 2);

        assert!(state.try_acquire_connection(ip).is_ok());
        assert_eq!(state.call_connection_count(), 3);
    }

    #[test]
    fn test_global_connection_limit() {
        let mut config = test_config();
        config.max_call_connections = Some(5);
        config.max_connections_per_ip = 10;
        let state = AppState::new(config);

        let ips: Vec<IpAddr> = (1..=6)
            .map(|i| Ipv4Addr::new(192, 168, 1, i).into())
            .collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }
        assert_eq!(state.call_connection_count(), 5);

        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    #[tokio::test]
    async fn test_middleware_status_codes() {
        let mut config = test_config();
        config.max_call_connections = Some(2);
        config.max_connections_per_ip = 1;
        let state = AppState::new(config);
        let app = limited_app(state.clone());

        let response = app.clone().oneshot(upgrade_request([10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(upgrade_request([10, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.clone().oneshot(upgrade_request([10, 0, 0, 2])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(upgrade_request([10, 0, 0, 3])).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.call_connection_count(), 2);
    }

    #[tokio::test]
    async fn test_plain_http_is_not_counted() {
        let mut config = test_config();
        config.max_call_connections = Some(0);
        let state = AppState::new(config);

        let mut request = Request::builder()
            .uri("/media-stream")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 40000))));

        let response = limited_app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.call_connection_count(), 0);
    }
}
