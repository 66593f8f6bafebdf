//! Router-level tests against a fake CLIP backend.

use std::io::Cursor;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use glimpse_core::{
    Embedding, ImageTensor, JointScorer, PresenceClassifier, ScoreVector, ScorerError,
};
use glimpsed::{create_router, spawn_engine, AppState, ClipBackend, Config, ImageFetcher};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Scores for the reference prompts, keyed by what the fake "sees".
const PERSON: [f32; 10] = [0.70, 0.10, 0.05, 0.03, 0.02, 0.04, 0.03, 0.01, 0.01, 0.01];
const LANDSCAPE: [f32; 10] = [0.02, 0.03, 0.02, 0.02, 0.01, 0.30, 0.40, 0.10, 0.05, 0.05];

#[derive(Clone, Copy)]
enum Scene {
    Person,
    Landscape,
    Broken,
}

struct FakeClip {
    scene: Scene,
}

impl JointScorer for FakeClip {
    fn score(&mut self, _image: &ImageTensor, prompts: &[String]) -> Result<ScoreVector, ScorerError> {
        let canned = match self.scene {
            Scene::Person => PERSON,
            Scene::Landscape => LANDSCAPE,
            Scene::Broken => return Err(ScorerError::Inference("session poisoned".into())),
        };
        if prompts.len() == canned.len() {
            Ok(ScoreVector::new(canned.to_vec()))
        } else {
            Ok(ScoreVector::from_logits(&vec![0.0; prompts.len()]))
        }
    }
}

impl ClipBackend for FakeClip {
    fn encode_image(&mut self, _image: &ImageTensor) -> Result<Embedding, ScorerError> {
        if let Scene::Broken = self.scene {
            return Err(ScorerError::Inference("session poisoned".into()));
        }
        Ok(Embedding::new(vec![0.5; 512], "fake"))
    }

    fn encode_text(&mut self, text: &str) -> Result<Embedding, ScorerError> {
        if let Scene::Broken = self.scene {
            return Err(ScorerError::Inference("session poisoned".into()));
        }
        Ok(Embedding::new(vec![text.len() as f32; 512], "fake"))
    }
}

fn app(scene: Scene) -> Router {
    let config = Config::from_lookup(|_| None).unwrap();
    let engine = spawn_engine(FakeClip { scene }, PresenceClassifier::default()).unwrap();
    let fetcher = ImageFetcher::new(config.fetch_timeout(), config.max_body_bytes).unwrap();
    create_router(AppState::new(config, engine, fetcher))
}

fn png_base64() -> String {
    let img = RgbImage::from_pixel(32, 24, Rgb([90, 140, 200]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    STANDARD.encode(bytes)
}

async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_config() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(Scene::Person), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "ViT-B/32");
    assert_eq!(body["device"], "cpu");
    assert_eq!(body["config"]["port"], 5000);
    assert_eq!(body["config"]["debug"], false);
    assert_eq!(body["config"]["model_cache_dir"], "models");
}

#[tokio::test]
async fn detect_humans_person() {
    let (status, body) = post(
        app(Scene::Person),
        "/detect_humans",
        json!({ "image_base64": png_base64() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_human"], true);
    let ratio = body["scores"]["ratio"].as_f64().unwrap();
    assert!((ratio - 9.0).abs() < 1e-3, "ratio = {ratio}");
    assert_eq!(body["human_prompts"].as_array().unwrap().len(), 5);
    assert_eq!(body["human_prompts"][0]["prompt"], "a clear photo of a human person");
    assert_eq!(body["nature_prompts"][4]["prompt"], "an uninhabited beach");
}

#[tokio::test]
async fn detect_humans_landscape() {
    let (status, body) = post(
        app(Scene::Landscape),
        "/detect_humans",
        json!({ "image_base64": png_base64() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_human"], false);
    assert!(body["scores"]["max_nature"].as_f64().unwrap() > 0.39);
}

#[tokio::test]
async fn detect_humans_requires_image() {
    let (status, body) = post(app(Scene::Person), "/detect_humans", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn detect_humans_scorer_failure_is_500() {
    let (status, body) = post(
        app(Scene::Broken),
        "/detect_humans",
        json!({ "image_base64": png_base64() }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let msg = body["error"].as_str().unwrap();
    assert!(msg.starts_with("Failed to detect humans:"), "{msg}");
    assert!(body.get("has_human").is_none());
}

#[tokio::test]
async fn detect_humans_bad_payload_is_500() {
    let (status, body) = post(
        app(Scene::Person),
        "/detect_humans",
        json!({ "image_base64": STANDARD.encode(b"not an image") }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to detect humans:"));
}

#[tokio::test]
async fn detect_humans_unreachable_url_is_500() {
    let (status, body) = post(
        app(Scene::Person),
        "/detect_humans",
        json!({ "image_url": "http://127.0.0.1:1/photo.jpg" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to detect humans:"));
}

#[tokio::test]
async fn encode_image_base64() {
    let (status, body) = post(
        app(Scene::Person),
        "/encode_image",
        json!({ "image_base64": png_base64() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dimensions"], 512);
    assert_eq!(body["embedding"].as_array().unwrap().len(), 512);
    assert!(body.get("has_human").is_none());
}

#[tokio::test]
async fn encode_image_with_detection() {
    let (status, body) = post(
        app(Scene::Person),
        "/encode_image",
        json!({ "image_base64": png_base64(), "detect_humans": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dimensions"], 512);
    assert_eq!(body["has_human"], true);
    assert!(body["scores"]["avg_human"].is_number());
}

#[tokio::test]
async fn encode_image_requires_image() {
    let (status, body) = post(app(Scene::Person), "/encode_image", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "No image provided. Send either image_url or image_base64"
    );
}

#[tokio::test]
async fn encode_image_undecodable_is_400() {
    let (status, body) = post(
        app(Scene::Person),
        "/encode_image",
        json!({ "image_base64": "%%%%" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to decode image:"));
}

#[tokio::test]
async fn encode_image_unreachable_url_is_400() {
    let (status, body) = post(
        app(Scene::Person),
        "/encode_image",
        json!({ "image_url": "http://127.0.0.1:1/photo.jpg" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to download image:"));
}

#[tokio::test]
async fn encode_image_backend_failure_is_500() {
    let (status, body) = post(
        app(Scene::Broken),
        "/encode_image",
        json!({ "image_base64": png_base64() }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to process image:"));
}

#[tokio::test]
async fn encode_text_ok() {
    let (status, body) = post(
        app(Scene::Person),
        "/encode_text",
        json!({ "text": "a beautiful sunset over mountains" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dimensions"], 512);
    assert!(body.get("has_human").is_none());
}

#[tokio::test]
async fn encode_text_requires_text() {
    let (status, body) = post(app(Scene::Person), "/encode_text", json!({ "txt": "typo" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No text provided");
}

#[tokio::test]
async fn encode_text_backend_failure_is_500() {
    let (status, body) = post(app(Scene::Broken), "/encode_text", json!({ "text": "a dog" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to process text:"));
}

#[tokio::test]
async fn similarity_single_text() {
    let (status, body) = post(
        app(Scene::Person),
        "/similarity",
        json!({ "image_base64": png_base64(), "text": "mountains with snow" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "mountains with snow");
    assert!((body["similarity"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert!((body["cosine"].as_f64().unwrap() - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn similarity_validates_inputs() {
    let (status, body) = post(app(Scene::Person), "/similarity", json!({ "text": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image provided");

    let (status, body) = post(
        app(Scene::Person),
        "/similarity",
        json!({ "image_base64": png_base64() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No text provided");
}

#[tokio::test]
async fn similarity_backend_failure_is_500() {
    let (status, body) = post(
        app(Scene::Broken),
        "/similarity",
        json!({ "image_base64": png_base64(), "text": "a dog" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let msg = body["error"].as_str().unwrap();
    assert!(msg.starts_with("Failed to calculate similarity:"), "{msg}");
    assert!(body.get("similarity").is_none());
}

#[tokio::test]
async fn similarity_undecodable_image_is_500() {
    let (status, body) = post(
        app(Scene::Person),
        "/similarity",
        json!({ "image_base64": STANDARD.encode(b"not an image"), "text": "a dog" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to calculate similarity:"));
}

#[tokio::test]
async fn malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/detect_humans")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(Scene::Person), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
}
