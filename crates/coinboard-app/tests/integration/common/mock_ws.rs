//! Mock depth stream server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Accept connections and count them
//! - Send a scripted list of frames to each new connection
//! - Optionally close the connection once the script is sent
//! - Record received messages

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Behaviour applied to every accepted connection.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub frames: Vec<String>,
    /// Pause between frames.
    pub gap: Duration,
    /// Close the socket after the last frame instead of idling.
    pub close_after: bool,
}

/// A mock depth stream server.
pub struct MockDepthServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockDepthServer {
    /// Start a server on an available port.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let paths_clone = paths.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            messages_clone.clone(),
                            paths_clone.clone(),
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            paths,
            connections,
        }
    }

    /// Base URL; clients append their stream path.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Request paths seen during the handshake.
    pub async fn request_paths(&self) -> Vec<String> {
        self.paths.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Script,
    messages: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    // Peek the request line to record the stream path.
    let mut buf = [0u8; 512];
    if let Ok(n) = stream.peek(&mut buf).await {
        let head = String::from_utf8_lossy(&buf[..n]);
        if let Some(path) = head.split_whitespace().nth(1) {
            paths.lock().await.push(path.to_string());
        }
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    for frame in &script.frames {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
        if !script.gap.is_zero() {
            tokio::time::sleep(script.gap).await;
        }
    }

    if script.close_after {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                messages.lock().await.push(text);
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}

/// Partial depth payload as sent on `<symbol>@depth20@100ms`.
pub fn depth_frame(last_update_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> String {
    let side = |levels: &[(&str, &str)]| {
        levels
            .iter()
            .map(|(p, q)| serde_json::json!([p, q]))
            .collect::<Vec<_>>()
    };
    serde_json::json!({
        "lastUpdateId": last_update_id,
        "bids": side(bids),
        "asks": side(asks),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockDepthServer::start(Script::default()).await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
