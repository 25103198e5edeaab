//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
    extract::{State, Multipart, DefaultBodyLimit},
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, Json},
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::EmotionError;
use crate::service::{EmotionService, PredictionOutcome, Upload};
use crate::storage::UploadStore;

use super::dto::*;
use super::html;

/// Application state shared across handlers
pub struct AppState<S: UploadStore> {
    pub service: Arc<EmotionService<S>>,
    pub start_time: Instant,
    pub max_upload_bytes: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Create the REST API router
pub fn create_rest_router<S: UploadStore>(state: Arc<AppState<S>>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        // Browser flow
        .route("/", get(home_handler))
        .route(
            "/predict-emotion-web",
            get(upload_prompt_handler).post(predict_web_handler::<S>),
        )
        // JSON API
        .route("/predict-emotion/", post(predict_api_handler::<S>))
        // System endpoints
        .route("/health", get(health_handler::<S>))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Pull the `file` field out of a multipart body, ignoring other fields
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await?.to_vec();
            return Ok(Some(Upload { file_name, data }));
        }
    }
    Ok(None)
}

/// Status and body for an unreadable multipart request
fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    warn!("Rejected upload ({}): {}", status, e);
    let body = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorResponse::new("File too large", "PAYLOAD_TOO_LARGE")
    } else {
        ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")
    };
    (status, Json(body))
}

/// Upload form
async fn home_handler() -> Html<String> {
    Html(html::home_page())
}

/// Prompt shown when the web route is opened directly
async fn upload_prompt_handler() -> Html<&'static str> {
    Html(html::upload_prompt_page())
}

/// Predict emotion, answering with an HTML page
async fn predict_web_handler<S: UploadStore>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> (StatusCode, Html<String>) {
    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(html::missing_file_page().to_string()),
            )
        }
        Err(e) => {
            let status = e.status();
            warn!("Rejected upload ({}): {}", status, e);
            let page = if status == StatusCode::PAYLOAD_TOO_LARGE {
                html::file_too_large_page()
            } else {
                html::invalid_image_page()
            };
            return (status, Html(page.to_string()));
        }
    };

    match state.service.predict(upload).await {
        Ok(PredictionOutcome::Detected(result)) => (
            StatusCode::OK,
            Html(html::prediction_page(result.emotion, result.confidence_percent())),
        ),
        Ok(PredictionOutcome::NoFace) => (StatusCode::OK, Html(html::no_face_page().to_string())),
        Err(EmotionError::InvalidImage(reason)) => {
            warn!("Invalid image upload: {}", reason);
            (StatusCode::OK, Html(html::invalid_image_page().to_string()))
        }
        Err(e) => {
            error!("Prediction failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(html::error_page().to_string()))
        }
    }
}

/// Predict emotion, answering with JSON
async fn predict_api_handler<S: UploadStore>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> Result<Json<PredictBody>, ApiError> {
    let upload = read_upload(&mut multipart)
        .await
        .map_err(multipart_error)?
        .ok_or_else(|| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::new("Missing file field", "MISSING_FILE")),
            )
        })?;

    let outcome = state.service.predict(upload).await.map_err(|e| match e {
        EmotionError::InvalidImage(reason) => {
            warn!("Invalid image upload: {}", reason);
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Invalid image file", "INVALID_IMAGE")))
        }
        e => {
            error!("Prediction failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "PREDICTION_FAILED")))
        }
    })?;

    Ok(Json(match outcome {
        PredictionOutcome::Detected(result) => PredictBody::Emotion(PredictResponse {
            emotion: result.emotion.as_str().to_string(),
            confidence: result.confidence,
        }),
        PredictionOutcome::NoFace => PredictBody::NoFace(ErrorResponse::message(NO_FACE_MESSAGE)),
    }))
}

/// Health check
async fn health_handler<S: UploadStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        healthy: health.healthy,
        version: health.version,
        topology: health.topology,
        models_loaded: health.models_loaded,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
