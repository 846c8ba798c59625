use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use vantage_engine::{EngineError, RejectCode};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Engine(#[from] EngineError),
    /// The body was not a well-formed request document.
    #[error("{0}")]
    MalformedBody(#[from] JsonRejection),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Engine(e) => match e.code() {
                RejectCode::ValidationError => (StatusCode::BAD_REQUEST, e.code().as_str()),
                RejectCode::NoProvidersForCapability => {
                    (StatusCode::UNPROCESSABLE_ENTITY, e.code().as_str())
                }
            },
            ApiError::MalformedBody(_) => {
                (StatusCode::BAD_REQUEST, RejectCode::ValidationError.as_str())
            }
        };
        let body = Json(ErrorBody {
            code,
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
