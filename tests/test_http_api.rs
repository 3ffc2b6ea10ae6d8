//! HTTP route tests
//!
//! Drives the warp filters in-process with `warp::test`; the service behind
//! them runs over scripted collaborators.

mod test_helpers;

use dermascore::api::{routes, MAX_UPLOAD_BYTES};
use dermascore::testing::mocks::MockRemoteClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::mock_service;
use warp::http::StatusCode;

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_submit_then_poll_to_success() {
    let service = Arc::new(mock_service(Arc::new(
        MockRemoteClient::new().pending_for(Duration::from_secs(4)),
    )));
    let api = routes(service);

    let response = warp::test::request()
        .method("POST")
        .path("/analyze")
        .body("jpeg-bytes")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let receipt = body_json(response.body());
    assert_eq!(receipt["status"], "processing");
    let task_id = receipt["taskId"].as_str().unwrap().to_string();
    assert_eq!(receipt["pollPath"], format!("/analyze/{task_id}"));

    let response = warp::test::request()
        .path(&format!("/analyze/{task_id}"))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.body());
    assert_eq!(body["status"], "processing");
    assert_eq!(body["recommendedPollSeconds"], 5);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let response = warp::test::request()
        .path(&format!("/analyze/{task_id}"))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.body());
    assert_eq!(body["status"], "success");
    assert_eq!(body["taskId"], task_id);
    assert_eq!(body["scores"]["wrinkles"], 50);
    assert!(body["overallHealth"].is_u64());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids_are_404() {
    let api = routes(Arc::new(mock_service(Arc::new(MockRemoteClient::new()))));

    for id in ["0b5c7d1e-2f3a-4b5c-8d9e-0f1a2b3c4d5e", "not-a-uuid"] {
        let response = warp::test::request()
            .path(&format!("/analyze/{id}"))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response.body());
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["classification"], "not_found_error");
    }
}

#[tokio::test]
async fn test_delete_always_succeeds() {
    let service = Arc::new(mock_service(Arc::new(MockRemoteClient::new())));
    let api = routes(service.clone());
    let receipt = service.submit(bytes::Bytes::from_static(b"img"), None).unwrap();

    for _ in 0..2 {
        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/analyze/{}", receipt.task_id))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response.body()), json!({"deleted": true}));
    }
    assert!(service.poll(&receipt.task_id).is_not_found());
}

#[tokio::test]
async fn test_missing_credential_is_503_configuration_error() {
    let service = Arc::new(mock_service(Arc::new(MockRemoteClient::new().unconfigured())));
    let api = routes(service.clone());

    let response = warp::test::request()
        .method("POST")
        .path("/analyze")
        .body("img")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response.body())["classification"],
        "configuration_error"
    );
    assert!(service.store().is_empty());
}

#[tokio::test]
async fn test_calibration_context_sources() {
    let service = Arc::new(mock_service(Arc::new(MockRemoteClient::new())));
    let api = routes(service.clone());

    let with_header = warp::test::request()
        .method("POST")
        .path("/analyze")
        .header("x-calibration-context", r#"{"age": 45, "skinType": "oily"}"#)
        .body("img")
        .reply(&api)
        .await;
    assert_eq!(with_header.status(), StatusCode::ACCEPTED);

    let with_query = warp::test::request()
        .method("POST")
        .path("/analyze?context=%7B%22smoker%22%3Atrue%7D")
        .body("img")
        .reply(&api)
        .await;
    assert_eq!(with_query.status(), StatusCode::ACCEPTED);

    // Malformed context is ignored rather than rejected
    let malformed = warp::test::request()
        .method("POST")
        .path("/analyze")
        .header("x-calibration-context", "{broken")
        .body("img")
        .reply(&api)
        .await;
    assert_eq!(malformed.status(), StatusCode::ACCEPTED);

    assert_eq!(service.store().len(), 3);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let api = routes(Arc::new(mock_service(Arc::new(MockRemoteClient::new()))));

    let response = warp::test::request()
        .method("POST")
        .path("/analyze")
        .body(vec![0u8; MAX_UPLOAD_BYTES as usize + 1])
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response.body())["classification"], "input_error");
}

#[tokio::test]
async fn test_health_reports_readiness() {
    let client = Arc::new(MockRemoteClient::new());
    let service = Arc::new(mock_service(client.clone()));
    let api = routes(service);

    let body = body_json(warp::test::request().path("/health").reply(&api).await.body());
    assert_eq!(body["apiKeyConfigured"], true);
    assert_eq!(body["normalizerReady"], true);
    assert_eq!(body["tasksTracked"], 0);
    assert_eq!(body["tasks"]["processing"], 0);

    client.set_configured(false);
    let body = body_json(warp::test::request().path("/health").reply(&api).await.body());
    assert_eq!(body["apiKeyConfigured"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let api = routes(Arc::new(mock_service(Arc::new(MockRemoteClient::new()))));
    let response = warp::test::request().path("/metrics").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.body());
    assert!(body["tasks_submitted"].is_u64());
    assert!(body["failures_by_class"].is_object());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let api = routes(Arc::new(mock_service(Arc::new(MockRemoteClient::new()))));
    let response = warp::test::request().path("/nope").reply(&api).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
