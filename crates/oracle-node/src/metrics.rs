//! Prometheus metrics server
//!
//! Plain HTTP over TCP: `GET /metrics` returns the text exposition format,
//! `GET /health` a small JSON status document.

use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Metrics server
pub struct MetricsServer {
    address: String,
    registry: Registry,
}

impl MetricsServer {
    pub fn new(address: impl Into<String>, registry: Registry) -> Self {
        Self {
            address: address.into(),
            registry,
        }
    }

    /// Serve until `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let addr: SocketAddr = self.address.parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Starting metrics server on {}", addr);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    let (mut stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                            continue;
                        }
                    };
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let n = match stream.read(&mut buf).await {
                            Ok(n) => n,
                            Err(e) => {
                                tracing::debug!("Metrics read from {} failed: {}", peer, e);
                                return;
                            }
                        };
                        let request = String::from_utf8_lossy(&buf[..n]);
                        let response = respond(&request, &registry);
                        let _ = stream.write_all(response.as_bytes()).await;
                    });
                }
            }
        }
        tracing::info!("Metrics server stopped");
        Ok(())
    }
}

/// Encode every registered metric in the text format
pub fn render(registry: &Registry) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// HTTP response for a raw request
pub fn respond(request: &str, registry: &Registry) -> String {
    if request.starts_with("GET /metrics") {
        match render(registry) {
            Ok(body) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                "HTTP/1.1 500 Internal Server Error\r\n\r\n".to_string()
            }
        }
    } else if request.starts_with("GET /health") {
        let body = serde_json::json!({ "status": "healthy" }).to_string();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        "HTTP/1.1 404 Not Found\r\n\r\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntGauge;

    fn registry() -> Registry {
        let registry = Registry::new();
        let gauge = IntGauge::new("oracle_test_gauge", "test").unwrap();
        gauge.set(7);
        registry.register(Box::new(gauge)).unwrap();
        registry
    }

    #[test]
    fn test_metrics_response() {
        let response = respond("GET /metrics HTTP/1.1\r\n\r\n", &registry());
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("oracle_test_gauge 7"));
    }

    #[test]
    fn test_health_and_not_found() {
        let health = respond("GET /health HTTP/1.1\r\n\r\n", &registry());
        assert!(health.ends_with("{\"status\":\"healthy\"}"));

        let missing = respond("GET /other HTTP/1.1\r\n\r\n", &registry());
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (stop_tx, stop_rx) = watch::channel(false);
        let server = MetricsServer::new(addr.to_string(), registry());
        let handle = tokio::spawn(server.run(stop_rx));

        let mut stream = None;
        for _ in 0..50 {
            match tokio::net::TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
        let mut stream = stream.unwrap();
        stream.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.contains("healthy"));

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
