//! End-to-end tests of the HTTP surface with a deterministic stub detector.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use yolo_detect_server::{
    adapters::{
        fs::image_store::FsImageStore,
        http::{router, state::HttpState},
    },
    application::{
        ports::{DetectionOutput, DetectorPort, ImageStorePort, ModelHandle},
        services::DetectionService,
    },
    domain::{
        errors::{DomainError, DomainResult},
        frame::PixelBuffer,
        model::ClassLabels,
    },
};

const BOUNDARY: &str = "----yolo-detect-test-boundary";

/// Returns the same detections for every image and renders the source as is.
#[derive(Clone, Default)]
struct StubDetector {
    boxes: Vec<[f32; 4]>,
    classes: Vec<usize>,
    confidences: Vec<f32>,
}

struct StubOutput {
    stub: StubDetector,
    source: RgbImage,
}

impl DetectionOutput for StubOutput {
    fn boxes(&self) -> Vec<[f32; 4]> {
        self.stub.boxes.clone()
    }

    fn classes(&self) -> Vec<usize> {
        self.stub.classes.clone()
    }

    fn confidences(&self) -> Vec<f32> {
        self.stub.confidences.clone()
    }

    fn render(&self) -> DomainResult<PixelBuffer> {
        Ok(PixelBuffer::from_rgb(self.source.clone()))
    }
}

impl DetectorPort for StubDetector {
    fn predict(&self, image_path: &Path) -> DomainResult<Vec<Box<dyn DetectionOutput>>> {
        let source = image::open(image_path)
            .map_err(|e| DomainError::Inference(e.to_string()))?
            .to_rgb8();
        Ok(vec![Box::new(StubOutput { stub: self.clone(), source })])
    }
}

struct TestApp {
    _dir: TempDir,
    uploads: PathBuf,
    outputs: PathBuf,
    app: Router,
}

fn test_app(model: ModelHandle) -> TestApp {
    test_app_with_limit(model, None)
}

fn test_app_with_limit(model: ModelHandle, max_upload_bytes: Option<usize>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let outputs = dir.path().join("static");

    let upload_store = Arc::new(FsImageStore::new(&uploads));
    let output_store = Arc::new(FsImageStore::new(&outputs));
    upload_store.ensure().unwrap();
    output_store.ensure().unwrap();

    let detection = Arc::new(DetectionService::new(
        model,
        ClassLabels::new(["crop", "weed"]),
        upload_store,
        output_store,
    ));
    let app = router(HttpState { detection }, max_upload_bytes);

    TestApp { _dir: dir, uploads, outputs, app }
}

fn ready(stub: StubDetector) -> ModelHandle {
    ModelHandle::Ready(Arc::new(stub))
}

fn unavailable() -> ModelHandle {
    ModelHandle::Unavailable { reason: "weights not found".into() }
}

fn solid_jpeg(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

fn multipart_request(field: &str, bytes: &[u8]) -> Request<Body> {
    multipart_part(field, Some("upload.jpg"), bytes)
}

/// Single part; without `filename` it is a plain text field.
fn multipart_part(field: &str, filename: Option<&str>, bytes: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: image/jpeg"),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn health_is_ok_when_model_is_loaded() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn health_reports_error_without_model() {
    let t = test_app(unavailable());
    let (status, body) = send_json(&t.app, get("/health")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Model not loaded");
}

#[tokio::test]
async fn predict_without_model_fails_and_writes_nothing() {
    let t = test_app(unavailable());
    let (status, body) = send_json(&t.app, multipart_request("image", &solid_jpeg(10, 10, [0, 0, 0]))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model not loaded");
    assert_eq!(file_count(&t.uploads), 0);
    assert_eq!(file_count(&t.outputs), 0);
}

#[tokio::test]
async fn predict_without_image_field_is_bad_request() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, multipart_request("picture", &solid_jpeg(10, 10, [0, 0, 0]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image uploaded");
    assert_eq!(file_count(&t.uploads), 0);
    assert_eq!(file_count(&t.outputs), 0);
}

#[tokio::test]
async fn predict_with_non_multipart_body_is_bad_request() {
    let t = test_app(ready(StubDetector::default()));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "abc"}"#))
        .unwrap();

    let (status, body) = send_json(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn undecodable_upload_is_a_processing_error() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, multipart_request("image", b"GIF89a but not really")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to process image:"));
    assert_eq!(file_count(&t.uploads), 0);
    assert_eq!(file_count(&t.outputs), 0);
}

#[tokio::test]
async fn solid_image_without_objects_round_trips() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, multipart_request("image", &solid_jpeg(100, 100, [30, 160, 60]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detections"], serde_json::json!([]));
    assert_eq!(body["detection_count"], 0);

    let url = body["image_url"].as_str().unwrap();
    let token = url
        .strip_prefix("/static/detected_")
        .and_then(|rest| rest.strip_suffix(".jpg"))
        .unwrap();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    let stored = t.outputs.join(format!("detected_{token}.jpg"));
    assert_eq!(image::image_dimensions(&stored).unwrap(), (100, 100));
    assert!(t.uploads.join(format!("{token}.jpg")).exists());

    let (status, content_type, bytes) = send(&t.app, get(url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
}

#[tokio::test]
async fn detections_satisfy_response_invariants() {
    let stub = StubDetector {
        boxes: vec![[4.0, 5.0, 30.0, 40.0], [60.0, 10.0, 90.0, 20.0], [0.0, 0.0, 100.0, 100.0]],
        classes: vec![0, 1, 1],
        confidences: vec![0.91, 0.42, 0.27],
    };
    let t = test_app(ready(stub));
    let (status, body) = send_json(&t.app, multipart_request("image", &solid_jpeg(100, 100, [0, 0, 0]))).await;

    assert_eq!(status, StatusCode::OK);
    let detections = body["detections"].as_array().unwrap();
    assert_eq!(body["detection_count"].as_u64().unwrap() as usize, detections.len());
    assert_eq!(detections.len(), 3);
    assert_eq!(detections[0]["class"], "crop");
    assert_eq!(detections[1]["class"], "weed");

    for det in detections {
        let conf = det["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&conf));
        let bbox: Vec<f64> = det["bbox"].as_array().unwrap().iter().map(|v| v.as_f64().unwrap()).collect();
        assert_eq!(bbox.len(), 4);
        assert!(bbox[0] <= bbox[2] && bbox[1] <= bbox[3]);
    }

    let (status, _, _) = send(&t.app, get(body["image_url"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn identical_uploads_get_distinct_outputs() {
    let t = test_app(ready(StubDetector::default()));
    let bytes = solid_jpeg(20, 20, [9, 9, 9]);

    let (a, b) = tokio::join!(
        send_json(&t.app, multipart_request("image", &bytes)),
        send_json(&t.app, multipart_request("image", &bytes)),
    );

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_ne!(a.1["image_url"], b.1["image_url"]);
    assert_eq!(file_count(&t.uploads), 2);
    assert_eq!(file_count(&t.outputs), 2);
}

#[tokio::test]
async fn out_of_range_class_is_a_server_error() {
    let stub = StubDetector { boxes: vec![[0.0, 0.0, 5.0, 5.0]], classes: vec![2], confidences: vec![0.8] };
    let t = test_app(ready(stub));
    let (status, body) = send_json(&t.app, multipart_request("image", &solid_jpeg(10, 10, [0, 0, 0]))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("class index 2"));
}

#[tokio::test]
async fn missing_static_file_is_not_found() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, get("/static/detected_missing.jpg")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn text_field_named_image_is_not_an_upload() {
    let t = test_app(ready(StubDetector::default()));
    let (status, body) = send_json(&t.app, multipart_part("image", None, b"just some text")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image uploaded");
    assert_eq!(file_count(&t.uploads), 0);
}

#[tokio::test]
async fn upload_over_the_configured_limit_is_payload_too_large() {
    let t = test_app_with_limit(ready(StubDetector::default()), Some(1024));
    let (status, body) = send_json(&t.app, multipart_request("image", &vec![0xAB; 8 * 1024])).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().starts_with("Upload too large"));
    assert_eq!(file_count(&t.uploads), 0);
    assert_eq!(file_count(&t.outputs), 0);
}

#[tokio::test]
async fn upload_under_the_configured_limit_is_served() {
    let t = test_app_with_limit(ready(StubDetector::default()), Some(1024 * 1024));
    let (status, body) = send_json(&t.app, multipart_request("image", &solid_jpeg(32, 32, [200, 30, 30]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detection_count"], 0);
    assert_eq!(file_count(&t.outputs), 1);
}
