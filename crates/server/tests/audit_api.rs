mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestConfig, TestFixture};

#[tokio::test]
async fn test_order_creation_is_audited() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .post("/api/v1/orders", json!({ "uid": "5123456789", "target_amount": 60 }))
        .await;
    let order_id = created.body["id"].as_str().unwrap().to_string();

    assert!(fixture.wait_for_audit("order_created", 1).await);

    let response = fixture
        .get(&format!("/api/v1/audit?order_id={}", order_id))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    let event = &response.body["events"][0];
    assert_eq!(event["event_type"], "order_created");
    assert_eq!(event["order_id"], order_id.as_str());
    assert_eq!(event["data"]["target_amount"], 60);
}

#[tokio::test]
async fn test_fulfillment_run_is_audited() {
    let fixture = TestFixture::new().await;
    fixture.seed_stock(&[60]);
    fixture.seed_workers(&["alpha"]);
    let created = fixture
        .post("/api/v1/orders", json!({ "uid": "5123456789", "target_amount": 60 }))
        .await;
    let order_id = created.body["id"].as_str().unwrap().to_string();

    fixture
        .post_empty(&format!("/api/v1/orders/{}/fulfill", order_id))
        .await;
    assert!(fixture.wait_for_audit("order_status_changed", 1).await);

    let response = fixture
        .get(&format!("/api/v1/audit?order_id={}&event_type=code_activated", order_id))
        .await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["events"][0]["data"]["worker"], "alpha");
}

#[tokio::test]
async fn test_audit_pagination() {
    let fixture = TestFixture::new().await;
    for amount in [60, 120, 180] {
        fixture
            .post("/api/v1/orders", json!({ "uid": "5123456789", "target_amount": amount }))
            .await;
    }
    assert!(fixture.wait_for_audit("order_created", 3).await);

    let page = fixture
        .get("/api/v1/audit?event_type=order_created&limit=2")
        .await;

    assert_status!(page, StatusCode::OK);
    assert_eq!(page.body["events"].as_array().unwrap().len(), 2);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["limit"], 2);
}

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    for path in ["/api/v1/stock", "/api/v1/workers", "/api/v1/audit"] {
        let response = fixture.get_anonymous(path).await;
        assert_status!(response, StatusCode::UNAUTHORIZED);
    }

    let import = fixture
        .post_anonymous("/api/v1/stock/import", json!({ "text": "60 CODE-0001" }))
        .await;
    assert_status!(import, StatusCode::UNAUTHORIZED);

    let with_key = fixture.get("/api/v1/workers").await;
    assert_status!(with_key, StatusCode::OK);
}

#[tokio::test]
async fn test_public_routes_do_not_require_api_key() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    assert_status!(fixture.get_anonymous("/api/v1/health").await, StatusCode::OK);
    assert_status!(fixture.get_anonymous("/api/v1/stock/summary").await, StatusCode::OK);

    let created = fixture
        .post_anonymous(
            "/api/v1/orders",
            json!({ "uid": "5123456789", "target_amount": 60 }),
        )
        .await;
    assert_status!(created, StatusCode::CREATED);
}

#[tokio::test]
async fn test_operator_actions_record_actor() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    fixture
        .post("/api/v1/workers", json!({ "identity": "alpha", "secret": "s" }))
        .await;
    assert!(fixture.wait_for_audit("worker_added", 1).await);

    let response = fixture.get("/api/v1/audit?user_id=operator").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["events"][0]["event_type"], "worker_added");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["auth"]["method"], "api_key");
    assert_eq!(response.body["auth"]["api_key_configured"], true);
    let raw = serde_json::to_string(&response.body).unwrap();
    assert!(!raw.contains(common::TEST_API_KEY));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.seed_stock(&[60, 120]);

    let response = fixture.get_text("/metrics").await;

    assert!(response.contains("redeemer_codes_by_state"));
    assert!(response.contains("redeemer_free_stock_value"));
}
