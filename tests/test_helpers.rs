//! Test helpers and utilities for integration tests

use dermascore::imaging::ImageNormalizer;
use dermascore::scoring::ScoreSynthesizer;
use dermascore::service::{AnalysisService, PollOutcome};
use dermascore::task::TaskStore;
use dermascore::testing::mocks::{MockNormalizer, MockRemoteClient};
use dermascore::workflow::ExecutorSettings;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Settings matching the default configuration: poll every 2s, give up at 60s
#[allow(dead_code)]
pub fn test_settings() -> ExecutorSettings {
    ExecutorSettings {
        poll_interval: Duration::from_secs(2),
        poll_deadline: Duration::from_secs(60),
        score_file_suffix: "score_info.json".to_string(),
    }
}

/// Service over a scripted remote client and a passthrough normalizer
#[allow(dead_code)]
pub fn mock_service(client: Arc<MockRemoteClient>) -> AnalysisService {
    mock_service_with(client, Arc::new(MockNormalizer::new()), ScoreSynthesizer::new())
}

#[allow(dead_code)]
pub fn mock_service_with(
    client: Arc<MockRemoteClient>,
    normalizer: Arc<dyn ImageNormalizer>,
    synthesizer: ScoreSynthesizer,
) -> AnalysisService {
    AnalysisService::new(
        Arc::new(TaskStore::default()),
        client,
        normalizer,
        Arc::new(synthesizer),
        test_settings(),
    )
}

/// Poll until the task leaves Processing. Relies on tokio's paused clock.
#[allow(dead_code)]
pub async fn wait_for_terminal(service: &AnalysisService, task_id: &str) -> PollOutcome {
    for _ in 0..1000 {
        let outcome = service.poll(task_id);
        if !matches!(outcome, PollOutcome::Processing { .. }) {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

/// A small encoded PNG with a horizontal gradient
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
