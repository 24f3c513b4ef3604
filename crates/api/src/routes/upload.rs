//! Upload relay route.
//!
//! `POST /service/upload` with the tenant's API key in `X-Api-Key` (or the
//! legacy `API_KEY` header) and the payload in multipart field `file`.

use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::{MultipartError, MultipartRejection}},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::{Bytes, BytesMut};
use ferry_core::relay::{RelayOutcome, RelayRequest};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{AppState, error::ApiError};

/// Header carrying the tenant API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header name accepted for older clients.
pub const LEGACY_API_KEY_HEADER: &str = "api_key";

/// Multipart field holding the payload.
const FILE_FIELD: &str = "file";

/// Creates the upload routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/service/upload", post(upload))
}

/// Successful relay response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Public URL of the stored file.
    pub url: String,
}

/// File read from the multipart body.
#[derive(Debug)]
struct FilePart {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

/// Reads the API key from the request headers.
fn api_key_from_headers(headers: &HeaderMap) -> Option<String> {
    [API_KEY_HEADER, LEGACY_API_KEY_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
}

fn multipart_error(err: &MultipartError, max: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(max)
    } else {
        ApiError::invalid_input(format!("invalid multipart body: {}", err.body_text()))
    }
}

/// Reads the `file` field, enforcing the size cap while streaming.
async fn read_file(mut multipart: Multipart, max: u64) -> Result<FilePart, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, max))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let mut buf = BytesMut::new();

        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(&e, max))? {
            if (buf.len() + chunk.len()) as u64 > max {
                return Err(ApiError::payload_too_large(max));
            }
            buf.extend_from_slice(&chunk);
        }

        if buf.is_empty() {
            return Err(ApiError::invalid_input("file is empty"));
        }

        return Ok(FilePart {
            bytes: buf.freeze(),
            filename,
            content_type,
        });
    }

    Err(ApiError::invalid_input("multipart field `file` is required"))
}

/// Maps a relay outcome to the HTTP response.
fn relay_response(outcome: RelayOutcome) -> Response {
    let code = match &outcome {
        RelayOutcome::Success { .. } => "",
        RelayOutcome::CredentialNotFound => "credential_not_found",
        RelayOutcome::StagingFailed { .. } => "staging_failed",
        RelayOutcome::UploadFailed { .. } => "upload_failed",
        RelayOutcome::TimedOut => "timeout",
        RelayOutcome::AccountingFailed { .. } => "accounting_failed",
    };

    match outcome.into_result() {
        Ok(url) => (StatusCode::OK, Json(UploadResponse { url })).into_response(),
        Err(err) => ApiError::from(err).with_code(code).into_response(),
    }
}

/// Relays one uploaded file to the caller's destination.
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let deadline = Instant::now() + state.relay_config.deadline();

    let Some(api_key) = api_key_from_headers(&headers) else {
        return ApiError::unauthorized("missing_api_key", "X-Api-Key header is required")
            .into_response();
    };

    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => return ApiError::invalid_input(e.body_text()).into_response(),
    };

    let file = match read_file(multipart, state.relay_config.max_payload_bytes).await {
        Ok(file) => file,
        Err(e) => return e.into_response(),
    };

    let size = file.bytes.len();
    let request = RelayRequest {
        api_key,
        payload: file.bytes,
        filename: file.filename,
        content_type: file.content_type,
    };

    // Detached so a dropped connection cannot cancel the relay midway.
    let relay = state.relay.clone();
    let outcome = match tokio::spawn(async move { relay.relay(request, deadline).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Relay task failed");
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
            .into_response();
        }
    };

    info!(outcome = outcome.label(), size, "Relay request finished");
    relay_response(outcome)
}
