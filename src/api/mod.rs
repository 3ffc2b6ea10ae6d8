//! HTTP surface over the analysis service
//!
//! Thin warp routes: every handler delegates to [`AnalysisService`] and maps
//! its outcome to a status code. No handler waits on the remote service.

use crate::error::{ErrorClass, ServiceError};
use crate::observability::metrics;
use crate::scoring::CalibrationContext;
use crate::service::AnalysisService;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: u64 = 15 * 1024 * 1024;

pub const CONTEXT_HEADER: &str = "x-calibration-context";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    classification: ErrorClass,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
}

/// All routes, ready for `warp::serve` or `warp::test`
pub fn routes(
    service: Arc<AnalysisService>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let submit_service = service.clone();
    let poll_service = service.clone();
    let delete_service = service.clone();
    let health_service = service;

    // POST /analyze - create a task from the raw image body
    let submit_route = warp::path("analyze")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_UPLOAD_BYTES))
        .and(warp::body::bytes())
        .and(warp::header::optional::<String>(CONTEXT_HEADER))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |body: Bytes, header: Option<String>, query: HashMap<String, String>| {
            let service = submit_service.clone();
            async move {
                let raw_context = header.or_else(|| query.get("context").cloned());
                let context = raw_context.as_deref().and_then(parse_context);
                Ok::<_, Infallible>(submit_reply(service.submit(body, context)))
            }
        });

    // GET /analyze/<id> - one of the four poll shapes
    let poll_route = warp::path!("analyze" / String)
        .and(warp::get())
        .and_then(move |id: String| {
            let service = poll_service.clone();
            async move {
                let outcome = service.poll(&id);
                let status = if outcome.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::OK
                };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&outcome),
                    status,
                ))
            }
        });

    // DELETE /analyze/<id> - always succeeds
    let delete_route = warp::path!("analyze" / String)
        .and(warp::delete())
        .and_then(move |id: String| {
            let service = delete_service.clone();
            async move {
                let removed = service.delete(&id);
                info!(task_id = %id, removed, "Delete requested");
                Ok::<_, Infallible>(warp::reply::json(&DeleteResponse { deleted: true }))
            }
        });

    // GET /health - diagnostic readiness booleans
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let service = health_service.clone();
            async move { Ok::<_, Infallible>(warp::reply::json(&service.health())) }
        });

    // GET /metrics - in-process counters
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(|| async move { Ok::<_, Infallible>(warp::reply::json(&metrics().snapshot())) });

    submit_route
        .or(poll_route)
        .or(delete_route)
        .or(health_route)
        .or(metrics_route)
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

/// Malformed context is ignored, not fatal
fn parse_context(raw: &str) -> Option<CalibrationContext> {
    match serde_json::from_str::<CalibrationContext>(raw) {
        Ok(context) if !context.is_empty() => Some(context),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed calibration context");
            None
        }
    }
}

fn submit_reply(result: Result<crate::service::SubmitReceipt, ServiceError>) -> warp::reply::Response {
    match result {
        Ok(receipt) => {
            warp::reply::with_status(warp::reply::json(&receipt), StatusCode::ACCEPTED)
                .into_response()
        }
        Err(e) => {
            let status = match e {
                ServiceError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, "Submission rejected");
            error_reply(e.to_string(), e.class(), status)
        }
    }
}

fn error_reply(error: String, classification: ErrorClass, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            error,
            classification,
        }),
        status,
    )
    .into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (status, message, class) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string(), ErrorClass::NotFound)
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Image exceeds {MAX_UPLOAD_BYTES} bytes"),
            ErrorClass::Input,
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
            ErrorClass::Input,
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            format!("Bad request: {rejection:?}"),
            ErrorClass::Input,
        )
    };
    Ok(error_reply(message, class, status))
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(
    service: Arc<AnalysisService>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(service)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(address = %bound, "HTTP API listening");
    server.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context() {
        let context = parse_context(r#"{"age": 41, "smoker": true}"#).unwrap();
        assert_eq!(context.age, Some(41));
        assert_eq!(context.smoker, Some(true));

        assert!(parse_context("{}").is_none());
        assert!(parse_context("not json").is_none());
        assert!(parse_context(r#"{"skinType": "scaly"}"#).is_none());
    }
}
