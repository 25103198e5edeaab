//! HTTP-level tests driving the router with an untrained classifier and a
//! stub face locator.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use approx::assert_relative_eq;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use candle_core::Device;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tower::ServiceExt;

use emoface::api::{create_rest_router, AppState};
use emoface::engine::{EmotionClassifier, FaceLocator, FaceRegion, FaceSelection, ModelPool, TopologyVariant};
use emoface::service::EmotionService;
use emoface::storage::FsUploadStore;

const BOUNDARY: &str = "emofaceboundary";
const LABELS: [&str; 5] = ["Angry", "Happy", "Neutral", "Sad", "Surprise"];

/// Reports the central half of every frame as a face, or nothing
struct StubLocator {
    finds_face: bool,
}

impl FaceLocator for StubLocator {
    fn locate(&self, frame: &image::GrayImage) -> Vec<FaceRegion> {
        if !self.finds_face {
            return Vec::new();
        }
        let (w, h) = frame.dimensions();
        FaceRegion::clamped((w / 4) as i32, (h / 4) as i32, w / 2, h / 2, 5.0, w, h)
            .into_iter()
            .collect()
    }
}

async fn app(finds_face: bool, upload_dir: &Path) -> Router {
    let classifier = EmotionClassifier::untrained(TopologyVariant::LittleVgg, &Device::Cpu).unwrap();
    let pool = ModelPool::from_parts(
        Arc::new(StubLocator { finds_face }),
        Arc::new(classifier),
        FaceSelection::First,
    );
    let storage = FsUploadStore::new(upload_dir).await.unwrap();
    let service = EmotionService::new(Arc::new(pool), Arc::new(storage), true);

    create_rest_router(Arc::new(AppState {
        service: Arc::new(service),
        start_time: Instant::now(),
        max_upload_bytes: 1024 * 1024,
    }))
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_fn(120, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&read_body(response).await).unwrap()
}

async fn read_text(response: axum::response::Response) -> String {
    String::from_utf8(read_body(response).await).unwrap()
}

#[tokio::test]
async fn test_api_predicts_label() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion/", multipart_body("file", "face.png", &png_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    let emotion = json["emotion"].as_str().unwrap();
    assert!(LABELS.contains(&emotion));

    let confidence = json["confidence"].as_f64().unwrap();
    assert!((0.2..=1.0).contains(&confidence));
    // three decimal places
    assert_relative_eq!(confidence * 1000.0, (confidence * 1000.0).round(), epsilon = 1e-3);
}

#[tokio::test]
async fn test_api_no_face() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(false, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion/", multipart_body("file", "face.png", &png_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, serde_json::json!({ "error": "No face detected" }));
}

#[tokio::test]
async fn test_api_invalid_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion/", multipart_body("file", "notes.txt", b"hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = read_json(response).await;
    assert_eq!(json["error"], "Invalid image file");
    assert_eq!(json["code"], "INVALID_IMAGE");
}

/// Twice the 1 MiB limit the test router is built with
fn oversized_upload() -> Vec<u8> {
    vec![0u8; 2 * 1024 * 1024]
}

#[tokio::test]
async fn test_api_rejects_oversized_upload() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion/", multipart_body("file", "huge.png", &oversized_upload())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json = read_json(response).await;
    assert_eq!(json["error"], "File too large");
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    // nothing reached storage
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_web_rejects_oversized_upload() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion-web", multipart_body("file", "huge.png", &oversized_upload())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(read_text(response).await.contains("File too large"));
}

#[tokio::test]
async fn test_api_missing_file_field() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion/", multipart_body("image", "face.png", &png_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_web_prediction_page() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion-web", multipart_body("file", "face.png", &png_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = read_text(response).await;
    assert!(LABELS.iter().any(|label| page.contains(&format!("Emotion: {label}"))));
    assert!(page.contains("Confidence: "));
    assert!(page.contains('%'));
}

#[tokio::test]
async fn test_web_no_face_page() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(false, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion-web", multipart_body("file", "face.png", &png_bytes())))
        .await
        .unwrap();
    let page = read_text(response).await;
    assert!(page.contains("No face detected"));
    assert!(!page.contains("Emotion:"));
}

#[tokio::test]
async fn test_web_invalid_image_page() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(upload_request("/predict-emotion-web", multipart_body("file", "face.png", b"\x89PNG broken")))
        .await
        .unwrap();
    assert!(read_text(response).await.contains("Invalid image file"));
}

#[tokio::test]
async fn test_static_pages() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response).await.contains("/predict-emotion-web"));

    let response = app
        .oneshot(Request::get("/predict-emotion-web").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_text(response).await.contains("href='/'"));
}

#[tokio::test]
async fn test_same_filename_uploads_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(false, dir.path()).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(upload_request("/predict-emotion/", multipart_body("file", "same.png", &png_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stored: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["healthy"], true);
    assert_eq!(json["topology"], "little_vgg");
    assert_eq!(json["models_loaded"]["emotion"], true);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(true, dir.path()).await;

    let response = app
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "https://example.org")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
