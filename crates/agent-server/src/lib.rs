// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The local HTTP API: a thin axum router over the spooler, reachable only
// on loopback, consumed by the desktop UI and other local processes.

pub mod routes;

use std::sync::Arc;

use agent_spooler::Spooler;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Body size cap for `/api/print`, matching the agent's own limit on how
/// large a directly-uploaded PDF may be.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn router(spooler: Arc<Spooler>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/print", post(routes::print))
        .route("/api/jobs", get(routes::list_jobs))
        .route("/api/jobs/{job_id}", get(routes::get_job))
        .route("/api/jobs/{job_id}/cancel", post(routes::cancel_job))
        .route("/api/status", get(routes::status))
        .route("/api/printers", get(routes::printers))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(spooler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::config::ConfigStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_spooler() -> Arc<Spooler> {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")));
        std::mem::forget(dir);
        Spooler::new(config, std::env::temp_dir())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(test_spooler());
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn print_with_no_payload_is_bad_request() {
        let app = router(test_spooler());
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/print")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn print_with_pdf_base64_enqueues_a_job() {
        let app = router(test_spooler());
        let body = serde_json::json!({
            "pdfBase64": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"%PDF-1.4"),
            "printerName": "Office_Laser",
        });
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/print")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn print_response_carries_job_id_and_status() {
        let app = router(test_spooler());
        let body = serde_json::json!({
            "pdfBase64": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"%PDF-1.4"),
        });
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/print")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "queued");
        assert!(json["jobId"].is_string());
    }

    #[tokio::test]
    async fn status_response_reports_queue_shape() {
        let app = router(test_spooler());
        let res = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["isProcessing"], false);
        assert_eq!(json["queueLength"], 0);
        assert_eq!(json["maxQueueSize"], 100);
    }

    #[tokio::test]
    async fn print_accepts_a_data_uri_prefixed_base64_payload() {
        let app = router(test_spooler());
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"%PDF-1.4");
        let body = serde_json::json!({
            "pdfBase64": format!("data:application/pdf;base64,{encoded}"),
        });
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/print")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn print_accepts_the_documented_url_alias_for_html_url() {
        let app = router(test_spooler());
        let body = serde_json::json!({ "url": "https://example.com/invoice.html" });
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/print")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_job_is_not_found() {
        let app = router(test_spooler());
        let res = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/jobs/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
