//! Liveness endpoint

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// `GET /health` answers `OK`; every other path is 404
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Bind the liveness listener and serve it in the background
pub async fn spawn(port: u16) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Health endpoint listening on {}", listener.local_addr()?);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            error!("Health server error: {}", e);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get(path: &str) -> (StatusCode, Vec<u8>) {
        let response = router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_ok() {
        let (status, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_other_paths_not_found() {
        for path in ["/", "/metrics", "/health/extra"] {
            let (status, _) = get(path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_spawned_listener() {
        let handle = spawn(0).await.unwrap();
        assert!(!handle.is_finished());
        handle.abort();
    }
}
