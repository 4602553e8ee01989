//! Minimal HTTP server for market list endpoints.
//!
//! Each connection serves a single request and closes. Routes match on a
//! path prefix; unknown paths get a 404.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: String,
}

impl Route {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub struct MockHttpServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, u32>>>,
}

impl MockHttpServer {
    pub async fn start(routes: Vec<(&'static str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let routes = Arc::new(routes);

        let hits_clone = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let hits = hits_clone.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let route = routes
                        .iter()
                        .find(|(prefix, _)| path.starts_with(prefix))
                        .map(|(prefix, route)| (*prefix, route.clone()));
                    let (status, body) = match route {
                        Some((prefix, route)) => {
                            *hits.lock().await.entry(prefix.to_string()).or_insert(0) += 1;
                            (route.status, route.body)
                        }
                        None => (404, "{}".to_string()),
                    };

                    let response = format!(
                        "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        reason(status),
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests served for a route prefix.
    pub async fn hits(&self, prefix: &str) -> u32 {
        self.hits.lock().await.get(prefix).copied().unwrap_or(0)
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
