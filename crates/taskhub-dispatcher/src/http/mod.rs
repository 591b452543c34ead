//! HTTP surface for the dispatcher.
//!
//! Provides endpoints for:
//! - Queue and worker status (`/v1/status`)
//! - Work lookup and submission (`/v1/work`, `/v1/work/:id`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;

mod handlers;

/// Create the HTTP router.
pub fn create_router(dispatcher: Dispatcher) -> Router {
    // Dashboards are served from elsewhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/v1/status", get(handlers::get_status))
        .route("/v1/work", post(handlers::submit_work))
        .route("/v1/work/:id", get(handlers::get_work))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(Dispatcher::new(DispatcherConfig::default()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_submit_then_fetch() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let app = create_router(dispatcher.clone());

        let request = Request::post("/v1/work")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "name": "Process Reports",
                    "command": "generate_report",
                    "priority": "urgent",
                    "params": { "type": "comprehensive" }
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/v1/work/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record = body_json(response).await;
        assert_eq!(record["status"], "pending");
        assert_eq!(record["priority"], "normal");
        assert_eq!(record["params"]["type"], "comprehensive");

        let response = app
            .oneshot(Request::get("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = body_json(response).await;
        assert_eq!(status["pendingCount"], 1);
        assert_eq!(status["perWorkerStatus"], json!([]));
        assert!(status.get("workers").is_none());
    }

    #[tokio::test]
    async fn test_blank_name_is_400() {
        let app = create_router(Dispatcher::new(DispatcherConfig::default()));
        let request = Request::post("/v1/work")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "name": "" }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_work_is_404() {
        let app = create_router(Dispatcher::new(DispatcherConfig::default()));
        let response = app
            .oneshot(
                Request::get("/v1/work/work_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
