//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{LimiterRegistry, Quota};

/// HTTP server for the admission controller.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared per-client counters
    registry: Arc<LimiterRegistry>,
    /// Quota applied to every client
    quota: Quota,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, registry: Arc<LimiterRegistry>, quota: Quota) -> Self {
        Self {
            addr,
            registry,
            quota,
        }
    }

    /// Build the router served by this server.
    pub fn router(&self) -> Router {
        router(AppState::new(Arc::clone(&self.registry), self.quota))
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            limit = self.quota.limit,
            window_secs = self.quota.window.as_secs_f64(),
            "Starting HTTP server"
        );

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn raw_get(addr: SocketAddr, extra_headers: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\n{extra_headers}Connection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let registry = Arc::new(LimiterRegistry::new());
        let _server = HttpServer::new(addr, registry, Quota::new(60, Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_serves_peer_address_over_tcp() {
        let registry = Arc::new(LimiterRegistry::new());
        let server = HttpServer::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&registry),
            Quota::new(2, Duration::from_secs(60)),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_on(listener, async move {
            let _ = shutdown_rx.await;
        }));

        let first = raw_get(addr, "").await;
        assert!(first.starts_with("HTTP/1.1 200"));
        assert!(first.ends_with("Current request: 1"));

        let second = raw_get(addr, "").await;
        assert!(second.ends_with("Current request: 2"));

        let third = raw_get(addr, "").await;
        assert!(third.starts_with("HTTP/1.1 429"));

        // A proxied client has its own quota
        let proxied = raw_get(addr, "X-Forwarded-For: 203.0.113.9\r\n").await;
        assert!(proxied.ends_with("Current request: 1"));

        assert_eq!(
            registry.count("127.0.0.1", Duration::from_secs(60)),
            Some(2)
        );

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
