//! End-to-end workflow tests over scripted collaborators
//!
//! Every test runs on tokio's paused clock, so the 60s polling scenarios
//! complete instantly while keeping exact poll counts.

mod test_helpers;

use bytes::Bytes;
use dermascore::error::ErrorClass;
use dermascore::remote::{ProtocolVersion, RemoteErrorKind, RemoteStep};
use dermascore::scoring::{CalibrationContext, Parameter, ScoreSource, ScoreSynthesizer};
use dermascore::service::PollOutcome;
use dermascore::testing::mocks::{
    bundle_with_entries, MockNormalizer, MockOutcome, MockRemoteClient, MockScoreSource,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use dermascore::imaging::JpegNormalizer;
use test_helpers::{mock_service, mock_service_with, png_bytes, wait_for_terminal};

fn image() -> Bytes {
    Bytes::from_static(b"jpeg-bytes")
}

#[tokio::test(start_paused = true)]
async fn test_pending_until_58s_then_success() {
    let client = Arc::new(
        MockRemoteClient::new()
            .pending_for(Duration::from_secs(58))
            .with_score_document(&json!({
                "hd_wrinkle": {"ui_score": 61, "raw_score": 40},
                "hd_pore": {"raw_score": 22.4},
                "hd_acne": 7,
            })),
    );
    let service = mock_service(client.clone());

    let receipt = service.submit(image(), None).unwrap();
    assert_eq!(receipt.status, "processing");
    assert_eq!(receipt.poll_path, format!("/analyze/{}", receipt.task_id));

    tokio::time::sleep(Duration::from_secs(10)).await;
    match service.poll(&receipt.task_id) {
        PollOutcome::Processing {
            sub_status,
            elapsed_seconds,
            recommended_poll_seconds,
            ..
        } => {
            assert_eq!(sub_status, "running");
            assert!(elapsed_seconds <= 10);
            assert_eq!(recommended_poll_seconds, 5);
        }
        other => panic!("expected processing, got {other:?}"),
    }

    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Success { scores, .. } => {
            assert_eq!(scores.wrinkles, 61);
            assert_eq!(scores.pores, 22);
            assert_eq!(scores.acne, 7);
            assert_eq!(scores.spots, 50);
        }
        other => panic!("expected success, got {other:?}"),
    }

    let record = service.store().get(&receipt.task_id.parse().unwrap()).unwrap();
    let raw = record.raw_scores.expect("remote document kept on success");
    assert_eq!(raw["hd_pore"]["raw_score"], 22.4);

    // Polls at t = 0, 2, ..., 58
    assert_eq!(client.poll_calls(), 30);
    assert_eq!(client.fetch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_finishing_remote_task_times_out() {
    let client = Arc::new(MockRemoteClient::new().with_outcome(MockOutcome::Never));
    let service = mock_service(client.clone());

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            classification,
            failed_step,
            ..
        } => {
            assert_eq!(classification, ErrorClass::Timeout);
            assert_eq!(failed_step.as_deref(), Some("poll"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // One final poll lands exactly on the deadline
    assert_eq!(client.poll_calls(), 31);
    assert_eq!(client.fetch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_reason_is_reported_verbatim() {
    let client = Arc::new(
        MockRemoteClient::new()
            .pending_for(Duration::from_secs(4))
            .with_outcome(MockOutcome::Fail("error_no_face".to_string())),
    );
    let service = mock_service(client);

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            error_message,
            classification,
            ..
        } => {
            assert_eq!(classification, ErrorClass::RemoteTask);
            assert_eq!(error_message, "error_no_face");
        }
        other => panic!("expected remote task failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_long_remote_reason_is_not_rewritten() {
    let reason = format!("error_src_face key: 7f3a landmark missing {}", "x".repeat(600));
    let client = Arc::new(MockRemoteClient::new().with_outcome(MockOutcome::Fail(reason.clone())));
    let service = mock_service(client);

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            error_message,
            classification,
            ..
        } => {
            assert_eq!(classification, ErrorClass::RemoteTask);
            assert_eq!(error_message, reason);
        }
        other => panic!("expected remote task failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_image_never_reaches_remote() {
    let client = Arc::new(MockRemoteClient::new());
    let normalizer = Arc::new(MockNormalizer::with_failure());
    let service = mock_service_with(client.clone(), normalizer.clone(), ScoreSynthesizer::new());

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            classification,
            failed_step,
            ..
        } => {
            assert_eq!(classification, ErrorClass::Input);
            assert_eq!(failed_step.as_deref(), Some("preparing_payload"));
        }
        other => panic!("expected input error, got {other:?}"),
    }
    assert_eq!(normalizer.calls(), 1);
    assert_eq!(client.upload_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_real_png_is_normalized_and_scored() {
    let client = Arc::new(
        MockRemoteClient::new().with_score_document(&json!({"hd_texture": {"ui_score": 41}})),
    );
    let service = mock_service_with(
        client.clone(),
        Arc::new(JpegNormalizer::new(1920, 480, 90)),
        ScoreSynthesizer::new(),
    );

    let receipt = service
        .submit(Bytes::from(png_bytes(320, 200)), None)
        .unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Success { scores, .. } => assert_eq!(scores.texture, Some(41)),
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(client.upload_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_body_is_input_error() {
    let service = mock_service(Arc::new(MockRemoteClient::new()));
    let receipt = service.submit(Bytes::new(), None).unwrap();
    assert!(matches!(
        wait_for_terminal(&service, &receipt.task_id).await,
        PollOutcome::Failed {
            classification: ErrorClass::Input,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_names_the_step() {
    let client = Arc::new(
        MockRemoteClient::new()
            .with_protocol(ProtocolVersion::V2)
            .failing_at(RemoteStep::UploadTransfer, RemoteErrorKind::Network),
    );
    let service = mock_service(client.clone());

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            error_message,
            classification,
            failed_step,
            ..
        } => {
            assert_eq!(classification, ErrorClass::Network);
            assert_eq!(failed_step.as_deref(), Some("upload-transfer"));
            assert!(error_message.contains("upload-transfer"));
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert_eq!(client.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bundle_without_score_file_is_parse_error() {
    let client = Arc::new(MockRemoteClient::new().with_bundle(bundle_with_entries(&[(
        "skinanalysis/mask.png",
        b"png".to_vec(),
    )])));
    let service = mock_service(client);

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Failed {
            error_message,
            classification,
            failed_step,
            ..
        } => {
            assert_eq!(classification, ErrorClass::Parse);
            assert_eq!(failed_step.as_deref(), Some("fetch-result"));
            assert!(error_message.contains("skinanalysis/mask.png"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_rejects_without_creating_task() {
    let client = Arc::new(MockRemoteClient::new().unconfigured());
    let service = mock_service(client.clone());

    let err = service.submit(image(), None).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert!(service.store().is_empty());
    assert_eq!(client.upload_calls(), 0);

    client.set_configured(true);
    assert!(service.submit(image(), None).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_delete_while_running_discards_result() {
    let client = Arc::new(MockRemoteClient::new().pending_for(Duration::from_secs(20)));
    let service = mock_service(client.clone());

    let receipt = service.submit(image(), None).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(service.delete(&receipt.task_id));
    assert!(service.poll(&receipt.task_id).is_not_found());

    // The executor keeps running and finishes against a missing record
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.fetch_calls(), 1);
    assert!(service.poll(&receipt.task_id).is_not_found());
    assert!(service.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_specialists_fill_extended_parameters() {
    let client = Arc::new(
        MockRemoteClient::new().with_score_document(&json!({"hd_wrinkle": {"ui_score": 30}})),
    );
    let radiance = Arc::new(MockScoreSource::new("radiance", vec![(Parameter::Radiance, 72.4)]));
    let broken = Arc::new(MockScoreSource::failing("redness", vec![Parameter::Redness]));
    let specialists: Vec<Arc<dyn ScoreSource>> = vec![radiance.clone(), broken];
    let service = mock_service_with(
        client,
        Arc::new(MockNormalizer::new()),
        ScoreSynthesizer::with_specialists(specialists),
    );

    let receipt = service.submit(image(), None).unwrap();
    match wait_for_terminal(&service, &receipt.task_id).await {
        PollOutcome::Success { scores, .. } => {
            assert_eq!(scores.wrinkles, 30);
            assert_eq!(scores.radiance, Some(72));
            assert_eq!(scores.redness, None);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(radiance.seeds_seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identical_submissions_yield_identical_scores() {
    let document = json!({
        "hd_wrinkle": {"ui_score": 44},
        "hd_dark_circle": {"ui_score": 63},
        "hd_moisture": {"raw_score": 18.5},
    });
    let context = CalibrationContext {
        age: Some(52),
        smoker: Some(true),
        ..Default::default()
    };

    let mut results = Vec::new();
    for _ in 0..2 {
        let client = Arc::new(MockRemoteClient::new().with_score_document(&document));
        let service = mock_service(client);
        let receipt = service.submit(image(), Some(context.clone())).unwrap();
        match wait_for_terminal(&service, &receipt.task_id).await {
            PollOutcome::Success { scores, .. } => {
                results.push(serde_json::to_string(&scores).unwrap())
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
    assert_eq!(results[0], results[1]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_in_flight_tasks() {
    let client = Arc::new(MockRemoteClient::new().with_outcome(MockOutcome::Never));
    let service = mock_service(client);

    service.submit(image(), None).unwrap();
    service.submit(image(), None).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(service.shutdown(), 2);
}
