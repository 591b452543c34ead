//! HTTP request handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use taskhub_core::{CoreError, WorkId, WorkSpec};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// Maps dispatcher errors onto status codes.
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DispatchError::WorkNotFound(_) | DispatchError::WorkerNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::Core(CoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            DispatchError::WorkerBusy { .. }
            | DispatchError::DuplicateWorker(_)
            | DispatchError::Core(CoreError::InvalidTransition { .. })
            | DispatchError::NotAssigned { .. } => StatusCode::CONFLICT,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    let body = crate::metrics::collect_metrics(&dispatcher).await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn get_status(State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    Json(dispatcher.get_status().await)
}

pub async fn get_work(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = dispatcher.get_work(&WorkId::new(id)).await?;
    Ok(Json(record))
}

/// Submit work; responds with the new id once assignment has been attempted.
pub async fn submit_work(
    State(dispatcher): State<Dispatcher>,
    Json(spec): Json<WorkSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let id = dispatcher.submit_work(spec).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}
