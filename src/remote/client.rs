//! reqwest-backed implementation of [`RemoteAnalysisClient`]

use super::bundle::MAX_BUNDLE_BYTES;
use super::protocol::{ProtocolVersion, AUTH_SCHEME, FILE_ENDPOINT, TASK_ENDPOINT};
use super::{ApiKey, RemoteAnalysisClient, RemoteError, RemoteStatus, RemoteStep};
use crate::config::{ConfigError, RemoteSection};
use crate::imaging::NormalizedImage;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

/// Per-call timeouts, one per remote step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteTimeouts {
    pub upload_slot: Duration,
    pub upload_transfer: Duration,
    pub start_task: Duration,
    pub poll: Duration,
    pub fetch_result: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self::from_config(&RemoteSection::default())
    }
}

impl RemoteTimeouts {
    pub fn from_config(section: &RemoteSection) -> Self {
        Self {
            upload_slot: Duration::from_secs(section.upload_slot_timeout_secs),
            upload_transfer: Duration::from_secs(section.upload_transfer_timeout_secs),
            start_task: Duration::from_secs(section.start_task_timeout_secs),
            poll: Duration::from_secs(section.poll_timeout_secs),
            fetch_result: Duration::from_secs(section.fetch_timeout_secs),
        }
    }

    pub fn for_step(&self, step: RemoteStep) -> Duration {
        match step {
            RemoteStep::UploadSlot => self.upload_slot,
            RemoteStep::UploadTransfer => self.upload_transfer,
            RemoteStep::StartTask => self.start_task,
            RemoteStep::Poll => self.poll,
            RemoteStep::FetchResult => self.fetch_result,
        }
    }
}

pub struct HttpSkinClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    protocol: ProtocolVersion,
    features: Vec<String>,
    timeouts: RemoteTimeouts,
}

impl HttpSkinClient {
    pub fn new(
        base_url: &str,
        api_key: ApiKey,
        protocol: ProtocolVersion,
        features: Vec<String>,
        timeouts: RemoteTimeouts,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            protocol,
            features,
            timeouts,
        })
    }

    pub fn from_config(section: &RemoteSection) -> Result<Self, ConfigError> {
        Self::new(
            &section.base_url,
            ApiKey::FromEnv(section.api_key_env.clone()),
            section.protocol,
            section.features.clone(),
            RemoteTimeouts::from_config(section),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, step: RemoteStep) -> Result<RequestBuilder, RemoteError> {
        let key = self
            .api_key
            .resolve()
            .map_err(|e| RemoteError::configuration(step, e.to_string()))?;
        Ok(builder.header(AUTHORIZATION, format!("{AUTH_SCHEME} {key}")))
    }

    /// Run one remote call under the step's timeout
    async fn guarded<T, F>(&self, step: RemoteStep, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let limit = self.timeouts.for_step(step);
        let span = crate::remote_span!(step = %step, protocol = %self.protocol);
        match tokio::time::timeout(limit, call.instrument(span)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::network(
                step,
                format!("timed out after {limit:?}"),
            )),
        }
    }

    async fn send(&self, step: RemoteStep, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder
            .timeout(self.timeouts.for_step(step))
            .send()
            .await
            .map_err(|e| {
                warn!(step = %step, is_timeout = e.is_timeout(), is_connect = e.is_connect(), "Remote request failed");
                RemoteError::network(step, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::network(step, format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn send_json(&self, step: RemoteStep, builder: RequestBuilder) -> Result<Value, RemoteError> {
        self.guarded(step, async {
            let response = self.send(step, builder).await?;
            let text = response
                .text()
                .await
                .map_err(|e| RemoteError::network(step, e.to_string()))?;
            serde_json::from_str(&text)
                .map_err(|e| RemoteError::parse(step, format!("invalid JSON response: {e}")))
        })
        .await
    }

    async fn upload_multipart(&self, image: &NormalizedImage) -> Result<String, RemoteError> {
        let step = RemoteStep::UploadTransfer;
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name())
            .mime_str(image.content_type())
            .map_err(|e| RemoteError::network(step, e.to_string()))?;
        let form = Form::new().part("file", part);

        let request = self.authorized(self.client.post(self.url(FILE_ENDPOINT)), step)?;
        let body = self.send_json(step, request.multipart(form)).await?;
        self.protocol
            .parse_upload_response(&body)
            .map_err(|m| RemoteError::parse(step, m))
    }

    async fn upload_handshake(&self, image: &NormalizedImage) -> Result<String, RemoteError> {
        let slot_request = self.authorized(self.client.post(self.url(FILE_ENDPOINT)), RemoteStep::UploadSlot)?
            .json(&ProtocolVersion::upload_slot_request(image));
        let body = self.send_json(RemoteStep::UploadSlot, slot_request).await?;
        let slot = self
            .protocol
            .parse_upload_slot(&body)
            .map_err(|m| RemoteError::parse(RemoteStep::UploadSlot, m))?;
        debug!(content_id = %slot.content_id, "Upload slot granted");

        let mut transfer = self.client.put(&slot.url);
        let mut has_content_type = false;
        for (name, value) in &slot.headers {
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            transfer = transfer.header(name.as_str(), value.as_str());
        }
        if !has_content_type {
            transfer = transfer.header(CONTENT_TYPE, image.content_type());
        }
        let transfer = transfer.body(image.bytes.clone());

        self.guarded(RemoteStep::UploadTransfer, async {
            self.send(RemoteStep::UploadTransfer, transfer).await.map(|_| ())
        })
        .await?;

        Ok(slot.content_id)
    }
}

#[async_trait]
impl RemoteAnalysisClient for HttpSkinClient {
    fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    fn ensure_configured(&self) -> Result<(), ConfigError> {
        self.api_key.resolve().map(|_| ())
    }

    async fn upload(&self, image: &NormalizedImage) -> Result<String, RemoteError> {
        match self.protocol {
            ProtocolVersion::V1 => self.upload_multipart(image).await,
            ProtocolVersion::V2 => self.upload_handshake(image).await,
        }
    }

    async fn start_task(&self, content_id: &str) -> Result<String, RemoteError> {
        let step = RemoteStep::StartTask;
        let request = self
            .authorized(self.client.post(self.url(TASK_ENDPOINT)), step)?
            .json(&ProtocolVersion::start_task_request(content_id, &self.features));
        let body = self.send_json(step, request).await?;
        self.protocol
            .parse_start_response(&body)
            .map_err(|m| RemoteError::parse(step, m))
    }

    async fn poll_status(&self, remote_task_id: &str) -> Result<RemoteStatus, RemoteError> {
        let step = RemoteStep::Poll;
        let url = self.url(&format!("{TASK_ENDPOINT}/{remote_task_id}"));
        let request = self.authorized(self.client.get(url), step)?;
        let body = self.send_json(step, request).await?;
        self.protocol
            .parse_poll_response(&body)
            .map_err(|m| RemoteError::parse(step, m))
    }

    async fn fetch_bundle(&self, result_url: &str) -> Result<Bytes, RemoteError> {
        let step = RemoteStep::FetchResult;
        let too_large =
            || RemoteError::parse(step, format!("result bundle exceeds {MAX_BUNDLE_BYTES} bytes"));

        self.guarded(step, async {
            let mut response = self.send(step, self.client.get(result_url)).await?;
            if response.content_length().is_some_and(|len| len > MAX_BUNDLE_BYTES) {
                return Err(too_large());
            }

            let mut body = BytesMut::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| RemoteError::network(step, e.to_string()))?
            {
                if (body.len() + chunk.len()) as u64 > MAX_BUNDLE_BYTES {
                    return Err(too_large());
                }
                body.extend_from_slice(&chunk);
            }
            Ok(body.freeze())
        })
        .await
    }
}
