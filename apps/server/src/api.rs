use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use vantage_engine::registry::ProviderStatus;
use vantage_engine::{AnalysisResult, CacheStats, EngineRequest};

use crate::{config::Config, error::ApiResult, main_lib::AppState};

pub async fn healthz() -> &'static str {
    "ok"
}

async fn create_analysis(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EngineRequest>, JsonRejection>,
) -> ApiResult<Json<AnalysisResult>> {
    let Json(request) = payload?;
    let result = state.engine.analyze(request).await?;
    tracing::info!(
        subject = %result.overview.subject,
        cache_hit = result.metadata.cache_hit,
        partial = result.metadata.partial,
        processing_time_ms = result.metadata.processing_time_ms,
        "analysis served"
    );
    Ok(Json(result))
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderStatus>> {
    Json(state.engine.providers())
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.engine.cache_stats())
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };

    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/analyses", post(create_analysis))
        .route("/providers", get(list_providers))
        .route("/cache/stats", get(cache_stats));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
