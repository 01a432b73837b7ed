//! ==============================================================================
//! server.rs - http surface
//! ==============================================================================
//!
//! routes:
//!     GET  /                      health
//!     POST /api/audio             device upload (multipart or json+base64)
//!     GET  /api/audio2[?lang=]    prompt download (raw wav)
//!     POST /api/database          append one sensor record
//!     GET  /api/database2?count=  last N sensor records
//!     GET  /api/selection         current language for the device
//!     POST /api/selection?lang=   set the language (browser)
//!     GET  /ws                    websocket event surface (ws.rs)
//!
//! every handler is a thin adapter: pull the payload out of the request,
//! call the dispatcher, turn the result into a response. failures are
//! always `{"error": "..."}` with the status from GatewayError.
//!
//! ==============================================================================

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{multipart::Multipart, DefaultBodyLimit, FromRequest, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::dispatcher::GatewayDispatcher;
use crate::domain::{FetchResponse, Language, SelectResponse, UploadAudio};
use crate::error::GatewayError;
use crate::ws;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, GatewayError>;

pub fn router(dispatcher: GatewayDispatcher, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/api/audio", post(upload_handler))
        .route("/api/audio2", get(download_handler))
        .route("/api/database", post(log_sensor_handler))
        .route("/api/database2", get(fetch_sensor_handler))
        .route("/api/selection", get(current_selection_handler).post(select_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

async fn health_handler(State(dispatcher): State<GatewayDispatcher>) -> impl IntoResponse {
    Json(dispatcher.health())
}

/// POST /api/audio
///
/// multipart form with an `audio` file part (and optional `lang` field), or
/// a json body `{audio: <base64>, filename, lang?}`
async fn upload_handler(
    State(dispatcher): State<GatewayDispatcher>,
    request: Request,
) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let result = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &dispatcher).await {
            Ok(multipart) => match read_multipart(multipart).await {
                Ok(upload) => dispatcher.upload_audio(upload).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(read_failure(e.status(), format!("Invalid multipart body: {}", e))),
        }
    } else if content_type.starts_with("application/json") {
        match Bytes::from_request(request, &dispatcher).await {
            Ok(body) => match serde_json::from_slice::<Value>(&body) {
                Ok(payload) => dispatcher.upload_audio_envelope(payload).await,
                Err(_) => Err(GatewayError::validation("Request must be JSON")),
            },
            Err(e) => Err(read_failure(e.status(), format!("Could not read body: {}", e))),
        }
    } else {
        Err(GatewayError::validation("No audio file part in the request"))
    };

    respond(result)
}

/// buffer the whole form before anything reaches the store
async fn read_multipart(mut multipart: Multipart) -> Result<UploadAudio, GatewayError> {
    let mut audio = None;
    let mut filename = String::new();
    let mut lang = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(read_failure(e.status(), format!("Invalid multipart body: {}", e))),
        };
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("audio") => {
                filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| read_failure(e.status(), format!("Upload interrupted: {}", e)))?;
                audio = Some(bytes.to_vec());
            }
            Some("lang") => {
                let code = field.text().await.map_err(|e| {
                    GatewayError::validation(format!("Invalid lang field: {}", e))
                })?;
                if !code.trim().is_empty() {
                    lang = Some(code.parse::<Language>()?);
                }
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| GatewayError::validation("No audio file part in the request"))?;
    if filename.is_empty() && lang.is_none() {
        return Err(GatewayError::validation("No selected file"));
    }
    Ok(UploadAudio { filename, lang, audio })
}

/// a body cut off by DefaultBodyLimit is 413; any other read failure is
/// the client's malformed request
fn read_failure(status: StatusCode, message: String) -> GatewayError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::TooLarge
    } else {
        GatewayError::validation(message)
    }
}

/// GET /api/audio2[?lang=code]
async fn download_handler(
    State(dispatcher): State<GatewayDispatcher>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match dispatcher.request_audio(params.get("lang").map(String::as_str)).await {
        Ok(blob) => (
            [
                (header::CONTENT_TYPE, blob.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{}\"", blob.filename),
                ),
            ],
            blob.bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/database
async fn log_sensor_handler(
    State(dispatcher): State<GatewayDispatcher>,
    request: Request,
) -> Response {
    let payload = match Json::<Value>::from_request(request, &dispatcher).await {
        Ok(Json(payload)) => payload,
        Err(_) => return GatewayError::validation("Request must be JSON").into_response(),
    };
    respond(dispatcher.log_sensor_data(payload).await)
}

/// GET /api/database2?count=N
async fn fetch_sensor_handler(
    State(dispatcher): State<GatewayDispatcher>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<FetchResponse> {
    let count = params.get("count").map(|c| Value::String(c.clone()));
    Ok(Json(dispatcher.fetch_sensor_data(count.as_ref()).await?))
}

/// GET /api/selection
async fn current_selection_handler(
    State(dispatcher): State<GatewayDispatcher>,
) -> impl IntoResponse {
    Json(dispatcher.current_selection())
}

/// POST /api/selection?lang=code
async fn select_handler(
    State(dispatcher): State<GatewayDispatcher>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<SelectResponse> {
    let code = params.get("lang").map(String::as_str).unwrap_or("");
    Ok(Json(dispatcher.select_language(code)?))
}

fn respond<T: Serialize>(result: Result<T, GatewayError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            tracing::debug!("[HTTP] request rejected: {}", e);
            e.into_response()
        }
    }
}
