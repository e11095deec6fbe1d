//! HTTP surface of the analysis proxy.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::acquisition::{self, ImageFile};
use crate::analysis::{AnalysisResult, ErrorDocument};
use crate::model::{Model, ModelError};

pub struct AppState {
    pub model: Model,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image: Option<String>,
}

/// Any failure is answered with a 500 and the zeroed error document.
#[derive(Debug)]
pub struct ApiError(String);

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Error in analyze-camouflage: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorDocument::new(self.0)),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/analyze-camouflage", post(analyze_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let image = match body {
        Ok(Json(AnalyzeRequest { image: Some(image) })) if !image.trim().is_empty() => image,
        Ok(_) => return Err(ModelError::NoImage.into()),
        Err(rejection) => {
            warn!("Rejected analyze request body: {}", rejection);
            return Err(ApiError(rejection.body_text()));
        }
    };

    Ok(Json(state.model.predict(&image).await?))
}

/// Multipart variant: the image arrives as a `file` field.
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError(format!("Failed to read upload: {}", e)))?;
            upload = Some(ImageFile::new(name, mime_type, bytes.to_vec()));
            break;
        }
    }

    let file = upload.ok_or(ModelError::NoImage)?;
    let image = acquisition::select(file).map_err(|e| ApiError(e.to_string()))?;

    Ok(Json(state.model.predict(&image.preview).await?))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
