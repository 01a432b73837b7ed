use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use field_gateway::config::GatewayConfig;
use field_gateway::{server, GatewayDispatcher};

async fn app() -> (TempDir, Router) {
    app_with_limit(GatewayConfig::default().server.max_upload_bytes).await
}

async fn app_with_limit(max_upload_bytes: usize) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GatewayConfig::default();
    config.storage.telemetry_log = dir.path().join("sensor_logs.txt");
    config.storage.audio_send_dir = dir.path().join("audio/send");
    config.storage.audio_received_dir = dir.path().join("audio/received");
    config.logging.show_sensor_data = false;

    let dispatcher = GatewayDispatcher::open(&config).await.unwrap();
    (dir, server::router(dispatcher, max_upload_bytes))
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn call_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = call(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn reading(id: &str) -> Value {
    json!({"device_id": id, "timestamp": "2025-03-01T10:00:00", "light_value": 320, "moisture_value": 690})
}

#[tokio::test]
async fn health_is_always_ok() {
    let (_dir, app) = app().await;
    assert_eq!(call_json(&app, get("/")).await, (StatusCode::OK, json!({"status": "ok"})));
}

#[tokio::test]
async fn telemetry_append_and_clamped_fetch() {
    let (_dir, app) = app().await;
    for id in ["A", "B", "C"] {
        let (status, body) = call_json(&app, post_json("/api/database", reading(id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "saved"}));
    }

    let (status, body) = call_json(&app, get("/api/database2?count=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries_returned"], 2);
    assert_eq!(body["data"][0]["device_id"], "B");
    assert_eq!(body["data"][1]["device_id"], "C");
    assert!(body.get("message").is_none());

    let (_, body) = call_json(&app, get("/api/database2?count=10")).await;
    assert_eq!(body["entries_returned"], 3);
    assert_eq!(body["message"], "max data in DB is 3");
}

#[tokio::test]
async fn telemetry_rejections() {
    let (_dir, app) = app().await;

    let not_json = Request::post("/api/database")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("light=3"))
        .unwrap();
    assert_eq!(
        call_json(&app, not_json).await,
        (StatusCode::BAD_REQUEST, json!({"error": "Request must be JSON"}))
    );

    let (status, body) = call_json(&app, post_json("/api/database", json!({"device_id": "A"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing required sensor fields"}));

    let (status, _) = call_json(&app, get("/api/database2?count=1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call_json(&app, get("/api/database2?count=-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "count must be a positive integer"}));
}

#[tokio::test]
async fn selection_handoff() {
    let (_dir, app) = app().await;

    assert_eq!(
        call_json(&app, get("/api/selection")).await,
        (StatusCode::OK, json!({"cmd": null, "audio_url": null}))
    );

    let set = Request::post("/api/selection?lang=sw").body(Body::empty()).unwrap();
    assert_eq!(call_json(&app, set).await, (StatusCode::OK, json!({"lang": "sw"})));

    let bad = Request::post("/api/selection?lang=fr").body(Body::empty()).unwrap();
    assert_eq!(
        call_json(&app, bad).await,
        (StatusCode::BAD_REQUEST, json!({"error": "Invalid language"}))
    );

    let (_, body) = call_json(&app, get("/api/selection")).await;
    assert_eq!(body, json!({"cmd": "sw", "audio_url": "/api/audio2?lang=sw"}));
}

#[tokio::test]
async fn json_upload_then_raw_download() {
    let (_dir, app) = app().await;
    let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();

    let upload = json!({"audio": STANDARD.encode(&wav), "filename": "x.wav", "lang": "en"});
    assert_eq!(
        call_json(&app, post_json("/api/audio", upload)).await,
        (StatusCode::OK, json!({"status": "received", "filename": "English.wav"}))
    );

    let response = app.clone().oneshot(get("/api/audio2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.to_vec(), wav);
}

#[tokio::test]
async fn multipart_device_upload() {
    let (dir, app) = app().await;
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"rec 7.wav\"\r\n\
         Content-Type: audio/wav\r\n\r\nPCMDATA\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::post("/api/audio")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();

    assert_eq!(
        call_json(&app, request).await,
        (StatusCode::OK, json!({"status": "received", "filename": "rec_7.wav"}))
    );
    let saved = std::fs::read(dir.path().join("audio/received/rec_7.wav")).unwrap();
    assert_eq!(saved, b"PCMDATA");
}

#[tokio::test]
async fn upload_without_audio_part() {
    let (_dir, app) = app().await;
    let request = Request::post("/api/audio").body(Body::from("nothing")).unwrap();
    assert_eq!(
        call_json(&app, request).await,
        (StatusCode::BAD_REQUEST, json!({"error": "No audio file part in the request"}))
    );
}

#[tokio::test]
async fn missing_prompt_is_404() {
    let (_dir, app) = app().await;
    assert_eq!(
        call_json(&app, get("/api/audio2?lang=ha")).await,
        (StatusCode::NOT_FOUND, json!({"error": "File Hausa.wav not found"}))
    );
}

#[tokio::test]
async fn failed_prompt_write_is_500_and_gateway_keeps_serving() {
    let (dir, app) = app().await;
    std::fs::create_dir(dir.path().join("audio/send/English.wav")).unwrap();

    let upload = json!({"audio": STANDARD.encode(b"RIFF"), "filename": "x.wav", "lang": "en"});
    let (status, body) = call_json(&app, post_json("/api/audio", upload)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Failed to save file English.wav"}));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("audio/send"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    assert_eq!(call_json(&app, get("/")).await.0, StatusCode::OK);
    let (status, _) = call_json(&app, post_json("/api/database", reading("A"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_uploads_are_413() {
    let (_dir, app) = app_with_limit(1024).await;

    let mut body = b"--XBOUNDARYX\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"big.wav\"\r\nContent-Type: audio/wav\r\n\r\n".to_vec();
    body.extend(std::iter::repeat(0u8).take(4096));
    body.extend_from_slice(b"\r\n--XBOUNDARYX--\r\n");
    let request = Request::post("/api/audio")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARYX")
        .body(Body::from(body))
        .unwrap();
    let (status, body) = call_json(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, json!({"error": "Upload exceeds the size limit"}));

    let upload = json!({"audio": STANDARD.encode(vec![0u8; 4096]), "filename": "big.wav"});
    let (status, body) = call_json(&app, post_json("/api/audio", upload)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, json!({"error": "Upload exceeds the size limit"}));

    let small = json!({"audio": STANDARD.encode(b"RIFF"), "filename": "small.wav"});
    assert_eq!(call_json(&app, post_json("/api/audio", small)).await.0, StatusCode::OK);
}
