#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use nrc_api::auth::jwt::{generate_token, JwtConfig};
use nrc_api::config::ServerConfig;
use nrc_api::router::build_app_router;
use nrc_api::state::AppState;
use nrc_core::permissions::{self, SCOPE_CONSUME, SCOPE_PUBLISH};
use nrc_events::broker::MemoryBroker;
use nrc_events::store::MemoryStore;
use nrc_events::{PublishPipeline, SubscriptionIndex};
use nrc_worker::WorkerConfig;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            token_expiry_mins: 15,
        },
        embedded_dispatcher: false,
        worker: WorkerConfig::default(),
    }
}

/// The application under test plus direct handles on its backends.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
    pub config: ServerConfig,
}

impl TestApp {
    /// Token for a client holding `notifications.publish`.
    pub fn publisher(&self, client_id: &str) -> String {
        self.token(client_id, &[SCOPE_PUBLISH])
    }

    /// Token for a client holding `notifications.consume`.
    pub fn consumer(&self, client_id: &str) -> String {
        self.token(client_id, &[SCOPE_CONSUME])
    }

    pub fn token(&self, client_id: &str, scopes: &[&str]) -> String {
        generate_token(client_id, scopes, &self.config.jwt).unwrap()
    }
}

/// Build the full application router over the in-memory store and broker,
/// using the same middleware stack as production.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MemoryBroker::new(config.worker.dispatch.delivery_lease()));
    let index = Arc::new(SubscriptionIndex::new(
        store.clone(),
        config.worker.dispatch.index_staleness(),
    ));

    let state = AppState {
        store: store.clone(),
        index,
        pipeline: PublishPipeline::new(store.clone(), broker.clone()),
        config: Arc::new(config.clone()),
        capabilities: permissions::scope_policy(),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        broker,
        config,
    }
}

pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json(
    app: &TestApp,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn patch_json(
    app: &TestApp,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn delete(app: &TestApp, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a channel through the API and return its JSON.
pub async fn create_channel(
    app: &TestApp,
    token: &str,
    name: &str,
    filters: &[&str],
) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/channels",
        token,
        serde_json::json!({ "name": name, "filters": filters }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await
}

/// Create a subscription through the API and return its JSON.
pub async fn create_subscription(
    app: &TestApp,
    token: &str,
    channel: &str,
    filters: serde_json::Value,
) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/subscriptions",
        token,
        serde_json::json!({
            "channel": channel,
            "callbackUrl": "https://drc.test/callbacks",
            "auth": "Bearer callback-secret",
            "filters": filters,
        }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await
}
