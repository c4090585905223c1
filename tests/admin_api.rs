//! Admin API tests against a live gateway.

use std::net::SocketAddr;

use dispatch_gateway::admin::setup_admin_router;
use dispatch_gateway::config::{FilterConfig, RouteConfig};
use dispatch_gateway::resilience::circuit_breaker::CircuitState;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;

const ADMIN_KEY: &str = "admin-secret";

async fn start_admin(gateway: &common::TestGateway) -> SocketAddr {
    let app = setup_admin_router(gateway.dispatcher.clone(), ADMIN_KEY);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[tokio::test]
async fn test_admin_requires_key() {
    let gateway = common::start_gateway(common::test_config()).await;
    let admin = start_admin(&gateway).await;
    let client = common::client();

    let res = client
        .get(format!("http://{admin}/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("http://{admin}/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn test_status_reports_routes() {
    let mut config = common::test_config();
    config.routes.push(RouteConfig::static_response("/a", 200, "a"));
    config.routes.push(RouteConfig::static_response("/b", 200, "b"));
    let gateway = common::start_gateway(config).await;
    let admin = start_admin(&gateway).await;

    let res = common::client()
        .get(format!("http://{admin}/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["routes"], 2);
    assert_eq!(status["open_circuits"], 0);
}

#[tokio::test]
async fn test_circuit_breaker_inspection_and_reset() {
    let backend = common::start_programmable_backend(|_| async { (503, "down".to_string()) }).await;
    let backend_url = format!("http://{backend}");

    let mut config = common::test_config();
    config.circuit_breaker.failure_threshold = 2;
    config.routes.push(RouteConfig::proxy("/svc/*", vec![backend_url.clone()]));
    let gateway = common::start_gateway(config).await;
    let admin = start_admin(&gateway).await;
    let client = common::client();

    for _ in 0..2 {
        client.get(gateway.url("/svc/x")).send().await.unwrap();
    }

    let list: Value = client
        .get(format!("http://{admin}/admin/circuit-breakers"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["backend"], backend_url.as_str());
    assert_eq!(list[0]["state"], "OPEN");

    let one_url = format!("http://{admin}/admin/circuit-breakers/{}", encode(&backend_url));
    let one: Value = client
        .get(&one_url)
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["state"], "OPEN");

    let reset = client.delete(&one_url).bearer_auth(ADMIN_KEY).send().await.unwrap();
    assert_eq!(reset.status(), 200);
    assert_eq!(
        gateway.dispatcher.circuit_breaker_state(&backend_url),
        CircuitState::Closed
    );

    let unknown = client
        .delete(format!(
            "http://{admin}/admin/circuit-breakers/{}",
            encode("http://nowhere:9")
        ))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn test_rate_limit_reset() {
    let mut config = common::test_config();
    let mut route = RouteConfig::static_response("/limited", 200, "ok");
    route.filters.push(FilterConfig::new(
        "rate-limiting",
        json!({ "requests_per_minute": 60, "burst_capacity": 1 }),
    ));
    config.routes.push(route);
    let gateway = common::start_gateway(config).await;
    let admin = start_admin(&gateway).await;
    let client = common::client();

    assert_eq!(client.get(gateway.url("/limited")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(gateway.url("/limited")).send().await.unwrap().status(), 429);

    let res = client
        .delete(format!("http://{admin}/admin/rate-limits/127.0.0.1"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(client.get(gateway.url("/limited")).send().await.unwrap().status(), 200);

    let res = client
        .delete(format!("http://{admin}/admin/rate-limits/203.0.113.1"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = client
        .delete(format!("http://{admin}/admin/rate-limits"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(client.get(gateway.url("/limited")).send().await.unwrap().status(), 200);
}
