use crate::state::TaskError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, info};
use serde_json::json;
use trading::EngineError;

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    Task(TaskError),
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Task(TaskError::Engine(err)) => match err {
                EngineError::ConfigurationMissing(_) => StatusCode::CONFLICT,
                EngineError::InvalidSettings(_) | EngineError::InvalidPlan(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Task(TaskError::Join(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError::Task(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Task(err) => err.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        };
        if status.is_server_error() {
            error!("API error: {}", message);
        } else {
            info!("API request refused ({}): {}", status, message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
