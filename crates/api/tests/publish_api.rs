//! HTTP-level tests for publishing and reading notifications.

mod common;

use axum::http::StatusCode;
use common::{body_json, create_channel, get, post_json};
use nrc_core::permissions::{SCOPE_CONSUME, SCOPE_PUBLISH};
use serde_json::json;

async fn app_with_channel() -> common::TestApp {
    let app = common::build_test_app();
    create_channel(&app, &app.publisher("zrc"), "zaken", &["bron", "zaaktype"]).await;
    app
}

fn notification(attrs: serde_json::Value) -> serde_json::Value {
    json!({
        "channel": "zaken",
        "attrs": attrs,
        "resourceUrl": "https://zrc.test/api/v1/zaken/1"
    })
}

#[tokio::test]
async fn publish_returns_201_and_enqueues() {
    let app = app_with_channel().await;

    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.publisher("zrc"),
        notification(json!({ "bron": "083" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["channel"], "zaken");
    assert_eq!(body["attrs"]["bron"], "083");
    assert_eq!(body["resourceUrl"], "https://zrc.test/api/v1/zaken/1");
    assert!(body["id"].is_string());
    assert!(body["createdAt"].is_string());
    assert_eq!(app.broker.len().await, 1);
}

#[tokio::test]
async fn undeclared_attribute_is_400_and_not_recorded() {
    let app = app_with_channel().await;

    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.publisher("zrc"),
        notification(json!({ "bron": "083", "kleur": "rood" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["invalid_params"][0]["name"], "attrs.kleur");
    assert_eq!(body["invalid_params"][0]["code"], "undeclared_attribute");
    assert_eq!(app.store.notification_count().await, 0);
    assert!(app.broker.is_empty().await);
}

#[tokio::test]
async fn unknown_channel_is_404() {
    let app = common::build_test_app();
    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.publisher("zrc"),
        notification(json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.store.notification_count().await, 0);
}

#[tokio::test]
async fn malformed_resource_url_is_400() {
    let app = app_with_channel().await;
    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.publisher("zrc"),
        json!({ "channel": "zaken", "resourceUrl": "zaak 1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["invalid_params"][0]["name"], "resource_url");
}

#[tokio::test]
async fn broker_outage_is_503() {
    let app = app_with_channel().await;
    app.broker.set_unavailable(true);

    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.publisher("zrc"),
        notification(json!({})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(app.store.notification_count().await, 0);
}

#[tokio::test]
async fn consumer_cannot_publish() {
    let app = app_with_channel().await;
    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.consumer("drc"),
        notification(json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.broker.is_empty().await);
}

#[tokio::test]
async fn any_publisher_may_publish_to_any_channel() {
    let app = app_with_channel().await;
    let response = post_json(
        &app,
        "/api/v1/notifications",
        &app.token("brc", &[SCOPE_PUBLISH, SCOPE_CONSUME]),
        notification(json!({ "zaaktype": "melding" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn published_notification_can_be_read_back() {
    let app = app_with_channel().await;
    let created = body_json(
        post_json(
            &app,
            "/api/v1/notifications",
            &app.publisher("zrc"),
            notification(json!({ "bron": "083" })),
        )
        .await,
    )
    .await;
    let uri = format!("/api/v1/notifications/{}", created["id"].as_str().unwrap());

    let response = get(&app, &uri, &app.consumer("drc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, created);

    let response = get(&app, &format!("{uri}/deliveries"), &app.consumer("drc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], json!([]));
}

#[tokio::test]
async fn unknown_notification_is_404() {
    let app = common::build_test_app();
    let uri = format!("/api/v1/notifications/{}", uuid::Uuid::now_v7());
    let token = app.publisher("zrc");

    assert_eq!(get(&app, &uri, &token).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        get(&app, &format!("{uri}/deliveries"), &token).await.status(),
        StatusCode::NOT_FOUND
    );
}
