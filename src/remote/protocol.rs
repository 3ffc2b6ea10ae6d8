//! Wire shapes of the supported remote protocol versions
//!
//! `v1` uploads with a single multipart POST and wraps responses in `data`,
//! with terminal statuses `done` / `failed`. `v2` negotiates an upload slot
//! first, PUTs the bytes to the returned URL, wraps responses in `result`, and
//! reports `success` / `error`.

use super::RemoteStatus;
use crate::imaging::NormalizedImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

pub const FILE_ENDPOINT: &str = "/s2s/v2.0/file/skin-analysis";
pub const TASK_ENDPOINT: &str = "/s2s/v2.0/task/skin-analysis";
pub const AUTH_SCHEME: &str = "BearerAuthenticationV2";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    #[default]
    V1,
    V2,
}

/// Upload destination returned by the `v2` slot request
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSlot {
    pub content_id: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ProtocolVersion {
    /// Top-level object every response is wrapped in
    pub fn envelope(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "data",
            ProtocolVersion::V2 => "result",
        }
    }

    pub fn success_status(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "done",
            ProtocolVersion::V2 => "success",
        }
    }

    pub fn failure_status(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "failed",
            ProtocolVersion::V2 => "error",
        }
    }

    fn pointer<'a>(&self, body: &'a Value, path: &str) -> Option<&'a Value> {
        body.pointer(&format!("/{}{}", self.envelope(), path))
    }

    fn string_at(&self, body: &Value, path: &str) -> Result<String, String> {
        self.pointer(body, path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing {}{}", self.envelope(), path.replace('/', ".")))
    }

    /// Content id from a `v1` multipart upload response
    pub fn parse_upload_response(&self, body: &Value) -> Result<String, String> {
        self.string_at(body, "/files/0/file_id")
    }

    /// Slot request body for `v2`
    pub fn upload_slot_request(image: &NormalizedImage) -> Value {
        json!({
            "files": [{
                "content_type": image.content_type(),
                "file_name": image.file_name(),
                "file_size": image.len(),
            }]
        })
    }

    pub fn parse_upload_slot(&self, body: &Value) -> Result<UploadSlot, String> {
        let content_id = self.string_at(body, "/files/0/file_id")?;
        let url = self.string_at(body, "/files/0/requests/0/url")?;
        let headers = self
            .pointer(body, "/files/0/requests/0/headers")
            .and_then(Value::as_object)
            .map(|h| {
                h.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(UploadSlot {
            content_id,
            url,
            headers,
        })
    }

    pub fn start_task_request(content_id: &str, features: &[String]) -> Value {
        json!({
            "src_file_id": content_id,
            "dst_actions": features,
            "miniserver_args": { "enable_mask_overlay": false },
        })
    }

    pub fn parse_start_response(&self, body: &Value) -> Result<String, String> {
        self.string_at(body, "/task_id")
    }

    /// Classify a poll response strictly by this version's vocabulary
    pub fn parse_poll_response(&self, body: &Value) -> Result<RemoteStatus, String> {
        let status = self.string_at(body, "/status")?;

        if status == self.success_status() {
            let result_url = self.string_at(body, "/result_url")?;
            return Ok(RemoteStatus::Succeeded { result_url });
        }

        if status == self.failure_status() {
            let reason = match self.pointer(body, "/error") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "remote task failed without a reason".to_string(),
                Some(other) => other.to_string(),
            };
            return Ok(RemoteStatus::Failed { reason });
        }

        Ok(RemoteStatus::Pending(status))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => f.write_str("v1"),
            ProtocolVersion::V2 => f.write_str("v2"),
        }
    }
}
