//! HTTP-level tests for the `/channels` resource.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, create_channel, create_subscription, delete, get, patch_json, post_json};
use serde_json::json;

#[tokio::test]
async fn publisher_creates_channel_and_owns_it() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");

    let channel = create_channel(&app, &token, "zaken", &["bron", "zaaktype"]).await;

    assert_eq!(channel["name"], "zaken");
    assert_eq!(channel["owner"], "zrc");
    assert_eq!(channel["filters"], json!(["bron", "zaaktype"]));
    assert!(channel["id"].is_string());
}

#[tokio::test]
async fn missing_token_is_401() {
    let app = common::build_test_app();
    let response = common::send(&app, Method::GET, "/api/v1/channels", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn malformed_token_is_401() {
    let app = common::build_test_app();
    let response = get(&app, "/api/v1/channels", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn consumer_cannot_create_channel() {
    let app = common::build_test_app();
    let response = post_json(
        &app,
        "/api/v1/channels",
        &app.consumer("drc"),
        json!({ "name": "zaken" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_name_is_409() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");
    create_channel(&app, &token, "zaken", &[]).await;

    let response = post_json(&app, "/api/v1/channels", &token, json!({ "name": "zaken" })).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_names_and_filters_are_400() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");

    let response = post_json(&app, "/api/v1/channels", &token, json!({ "name": "Zaken!" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app,
        "/api/v1/channels",
        &token,
        json!({ "name": "zaken", "filters": ["bron", "bron"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["invalid_params"][0]["name"], "filters.1");
    assert_eq!(body["invalid_params"][0]["code"], "duplicate");
}

#[tokio::test]
async fn list_filters_by_name() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");
    create_channel(&app, &token, "besluiten", &[]).await;
    create_channel(&app, &token, "zaken", &[]).await;

    let all = body_json(get(&app, "/api/v1/channels", &token).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let response = get(&app, "/api/v1/channels?name=zaken", &app.consumer("drc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let filtered = body_json(response).await;
    let data = filtered["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "zaken");
}

#[tokio::test]
async fn list_respects_limit() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");
    for name in ["a1", "a2", "a3"] {
        create_channel(&app, &token, name, &[]).await;
    }

    let page = body_json(get(&app, "/api/v1/channels?limit=2&offset=1", &token).await).await;
    let data = page["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["name"], "a2");
}

#[tokio::test]
async fn get_unknown_channel_is_404() {
    let app = common::build_test_app();
    let uri = format!("/api/v1/channels/{}", uuid::Uuid::now_v7());
    let response = get(&app, &uri, &app.publisher("zrc")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_may_extend_filters() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");
    let channel = create_channel(&app, &token, "zaken", &["bron"]).await;
    let uri = format!("/api/v1/channels/{}", channel["id"].as_str().unwrap());

    let response = patch_json(
        &app,
        &uri,
        &token,
        json!({
            "filters": ["zaaktype", "bron"],
            "documentationUrl": "https://docs.test/zaken"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["filters"], json!(["zaaktype", "bron"]));
    assert_eq!(updated["documentationUrl"], "https://docs.test/zaken");
}

#[tokio::test]
async fn declared_filters_cannot_be_removed() {
    let app = common::build_test_app();
    let token = app.publisher("zrc");
    let channel = create_channel(&app, &token, "zaken", &["bron", "zaaktype"]).await;
    let uri = format!("/api/v1/channels/{}", channel["id"].as_str().unwrap());

    let response = patch_json(&app, &uri, &token, json!({ "filters": ["bron"] })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_owner_may_update_or_delete() {
    let app = common::build_test_app();
    let channel = create_channel(&app, &app.publisher("zrc"), "zaken", &[]).await;
    let uri = format!("/api/v1/channels/{}", channel["id"].as_str().unwrap());
    let intruder = app.publisher("brc");

    let response = patch_json(&app, &uri, &intruder, json!({ "filters": ["x"] })).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = delete(&app, &uri, &intruder).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_is_409_while_subscribed() {
    let app = common::build_test_app();
    let publisher = app.publisher("zrc");
    let channel = create_channel(&app, &publisher, "zaken", &[]).await;
    let uri = format!("/api/v1/channels/{}", channel["id"].as_str().unwrap());

    let subscription = create_subscription(&app, &app.consumer("drc"), "zaken", json!([])).await;

    let response = delete(&app, &uri, &publisher).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let sub_uri = format!(
        "/api/v1/subscriptions/{}",
        subscription["id"].as_str().unwrap()
    );
    let response = delete(&app, &sub_uri, &app.consumer("drc")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = delete(&app, &uri, &publisher).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(get(&app, &uri, &publisher).await.status(), StatusCode::NOT_FOUND);
}
