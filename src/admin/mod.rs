//! Operator API.
//!
//! Served on its own listener and guarded by a bearer key. Backend URLs in
//! paths are percent-encoded by the caller.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::dispatch::Dispatcher;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub dispatcher: Arc<Dispatcher>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(dispatcher: Arc<Dispatcher>, api_key: &str) -> Router {
    let state = AdminState {
        dispatcher,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuit-breakers", get(list_circuit_breakers))
        .route(
            "/admin/circuit-breakers/{backend}",
            get(get_circuit_breaker).delete(reset_circuit_breaker),
        )
        .route("/admin/rate-limits", delete(reset_all_rate_limits))
        .route("/admin/rate-limits/{key}", delete(reset_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RouteConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn router() -> Router {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/ping", 200, "pong"));
        let dispatcher = Arc::new(Dispatcher::new(config).unwrap());
        setup_admin_router(dispatcher, "k3y")
    }

    #[tokio::test]
    async fn test_status_behind_bearer_key() {
        let denied = router()
            .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let res = router()
            .oneshot(
                Request::builder()
                    .uri("/admin/status")
                    .header("authorization", "Bearer k3y")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["routes"], 1);
        assert_eq!(status["in_flight"], 0);
    }

    #[tokio::test]
    async fn test_unknown_breaker_reports_closed() {
        let res = router()
            .oneshot(
                Request::builder()
                    .uri("/admin/circuit-breakers/http%3A%2F%2Fnowhere%3A9")
                    .header("authorization", "Bearer k3y")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let state: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(state["backend"], "http://nowhere:9");
        assert_eq!(state["state"], "CLOSED");
    }
}
