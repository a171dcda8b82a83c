//! HTTP server for the document pipeline

pub mod routes;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::service::FileService;

/// Document pipeline HTTP server
pub struct DocpipeServer {
    config: AppConfig,
    service: FileService,
}

impl DocpipeServer {
    /// Open the record store and start the job runner
    pub fn new(config: AppConfig) -> Result<Self> {
        let service = FileService::open(config.clone())?;
        Ok(Self { config, service })
    }

    /// Serve an existing service
    pub fn with_service(service: FileService) -> Self {
        Self {
            config: service.config().clone(),
            service,
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes(self.config.server.max_upload_size))
            .with_state(self.service.clone())
            // Middleware layers (order matters - applied bottom to top)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new());

        if self.config.server.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router.layer(cors)
        } else {
            router
        }
    }

    /// Serve until Ctrl+C, then let running jobs finish
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting docpipe server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Waiting for running jobs to finish");
        self.service.shutdown().await;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{test_service, wait_for};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "docpipe-test-boundary";

    fn multipart_request(filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/files/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = DocpipeServer::with_service(test_service()).build_router();
        let response = router.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_upload_progress_content_delete() {
        let service = test_service();
        let router = DocpipeServer::with_service(service.clone()).build_router();

        let response = router
            .clone()
            .oneshot(multipart_request("data.csv", "text/csv", b"a,b\n1,2\n3,4\n5,6"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        assert_eq!(body["filename"], "data.csv");
        assert_eq!(body["status"], "uploading");
        assert_eq!(body["message"], "File uploaded successfully and processing started");

        let id: Uuid = body["file_id"].as_str().unwrap().parse().unwrap();
        wait_for(&service, id).await;

        let response = router
            .clone()
            .oneshot(get(&format!("/api/files/{}/progress", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["progress"], 100);

        let response = router
            .clone()
            .oneshot(get(&format!("/api/files/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["filename"], "data.csv");
        assert_eq!(body["parsed_content"]["content_type"], "csv");
        assert_eq!(body["parsed_content"]["row_count"], 3);

        let response = router
            .clone()
            .oneshot(get("/api/files"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["files"][0]["original_filename"], "data.csv");

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/files/{}/delete", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "File \"data.csv\" deleted successfully");

        let response = router
            .oneshot(get(&format!("/api/files/{}/progress", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_file_content_is_accepted() {
        let service = test_service();
        let router = DocpipeServer::with_service(service.clone()).build_router();

        let response = router
            .clone()
            .oneshot(multipart_request("notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        let id: Uuid = json_body(response).await["file_id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        wait_for(&service, id).await;

        let response = router
            .oneshot(get(&format!("/api/files/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(
            body["message"],
            "File upload or processing in progress. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let router = DocpipeServer::with_service(test_service()).build_router();

        let response = router
            .clone()
            .oneshot(multipart_request("big.csv", "text/csv", &vec![b'a'; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "File too large. Maximum size is 0MB");

        let request = Request::builder()
            .method("POST")
            .uri("/api/files/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{b}--\r\n",
                b = BOUNDARY
            )))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let router = DocpipeServer::with_service(test_service()).build_router();

        for uri in [
            format!("/api/files/{}", Uuid::new_v4()),
            format!("/api/files/{}/progress", Uuid::new_v4()),
            "/api/files/not-a-uuid".to_string(),
        ] {
            let response = router.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }
}
