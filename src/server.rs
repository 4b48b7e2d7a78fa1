use axum::{
    Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::Method,
    response::Json,
    routing::{get, post},
};
use metrics::counter;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::ApiError;
use crate::types::{HealthResponse, PredictRequest, PredictResponse};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<dyn Engine + Send + Sync>,
}

impl AppState {
    pub fn new(engine: Arc<dyn Engine + Send + Sync>) -> Self {
        Self { engine }
    }
}

/// Prediction routes with tracing and an open CORS policy. Request bodies
/// are not size-limited.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::disable())
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tracing::instrument(skip_all)]
async fn predict_handler(
    State(state): State<AppState>,
    request: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    counter!("prediction_requests_total").increment(1);

    let Json(request) = request.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::from(rejection)
    })?;

    let text = request.into_text();
    if text.trim().is_empty() {
        tracing::debug!("Empty text provided");
        return Err(ApiError::EmptyText);
    }

    let sentiment = state.engine.predict(text).await.map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "Prediction failed");
        ApiError::from(e)
    })?;

    counter!("predictions_total", "sentiment" => sentiment.clone()).increment(1);
    Ok(Json(PredictResponse { sentiment }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        labels: state.engine.labels(),
    })
}
