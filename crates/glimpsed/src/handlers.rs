//! HTTP handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use glimpse_core::DetectionResult;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::source::ImageSource;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EncodeImageRequest {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    /// Attach a human presence check to the embedding response.
    #[serde(default)]
    pub detect_humans: bool,
}

#[derive(Debug, Deserialize)]
pub struct EncodeTextRequest {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub dimensions: usize,
    #[serde(flatten)]
    pub detection: Option<DetectionResult>,
}

#[derive(Debug, Serialize)]
pub struct SimilarityResponse {
    pub similarity: f32,
    pub cosine: f32,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
    pub version: String,
    pub config: HealthConfig,
}

#[derive(Debug, Serialize)]
pub struct HealthConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub model_cache_dir: String,
}

/// Liveness check with the effective configuration.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let cfg = &state.config;
    Json(HealthResponse {
        status: "ok".to_string(),
        model: cfg.model_name.clone(),
        device: "cpu".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config: HealthConfig {
            host: cfg.host.clone(),
            port: cfg.port,
            debug: cfg.debug,
            model_cache_dir: cfg.model_cache_dir.display().to_string(),
        },
    })
}

/// Encode an image into a CLIP embedding.
pub async fn encode_image(
    State(state): State<AppState>,
    payload: Result<Json<EncodeImageRequest>, JsonRejection>,
) -> ApiResult<Json<EmbeddingResponse>> {
    let Json(req) = payload?;
    let source = ImageSource::from_fields(req.image_url, req.image_base64).ok_or_else(|| {
        ApiError::bad_request("No image provided. Send either image_url or image_base64")
    })?;

    let image = state.fetcher.load(&source).await.map_err(|e| {
        if source.is_url() {
            ApiError::bad_request(format!("Failed to download image: {e}"))
        } else {
            ApiError::bad_request(format!("Failed to decode image: {e}"))
        }
    })?;

    let encoding = state
        .engine
        .encode_image(image, req.detect_humans)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to process image: {e}")))?;

    Ok(Json(EmbeddingResponse {
        dimensions: encoding.embedding.dimensions(),
        embedding: encoding.embedding.values,
        detection: encoding.detection,
    }))
}

/// Encode text into a CLIP embedding.
pub async fn encode_text(
    State(state): State<AppState>,
    payload: Result<Json<EncodeTextRequest>, JsonRejection>,
) -> ApiResult<Json<EmbeddingResponse>> {
    let Json(req) = payload?;
    let text = req.text.ok_or_else(|| ApiError::bad_request("No text provided"))?;

    let embedding = state
        .engine
        .encode_text(text)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to process text: {e}")))?;

    Ok(Json(EmbeddingResponse {
        dimensions: embedding.dimensions(),
        embedding: embedding.values,
        detection: None,
    }))
}

/// Score one image against one text.
pub async fn similarity(
    State(state): State<AppState>,
    payload: Result<Json<SimilarityRequest>, JsonRejection>,
) -> ApiResult<Json<SimilarityResponse>> {
    let Json(req) = payload?;
    let source = ImageSource::from_fields(req.image_url, req.image_base64)
        .ok_or_else(|| ApiError::bad_request("No image provided"))?;
    let text = req.text.ok_or_else(|| ApiError::bad_request("No text provided"))?;

    let image = state
        .fetcher
        .load(&source)
        .await
        .map_err(|e| failure("Failed to calculate similarity", e))?;
    let result = state
        .engine
        .similarity(image, text.clone())
        .await
        .map_err(|e| failure("Failed to calculate similarity", e))?;

    Ok(Json(SimilarityResponse {
        similarity: result.similarity,
        cosine: result.cosine,
        text,
    }))
}

/// Decide whether the image contains people.
pub async fn detect_humans(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<Json<DetectionResult>> {
    let Json(req) = payload?;
    let source = ImageSource::from_fields(req.image_url, req.image_base64)
        .ok_or_else(|| ApiError::bad_request("No image provided"))?;

    // Acquisition and scoring failures alike surface as one processing error.
    let image = state
        .fetcher
        .load(&source)
        .await
        .map_err(|e| failure("Failed to detect humans", e))?;
    let result = state
        .engine
        .detect_humans(image)
        .await
        .map_err(|e| failure("Failed to detect humans", e))?;

    Ok(Json(result))
}

fn failure(context: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::internal(format!("{context}: {err}"))
}
