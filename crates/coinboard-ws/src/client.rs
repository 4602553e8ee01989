//! Reconnecting feed client.
//!
//! Owns at most one connection at a time. Frames are decoded as they arrive
//! but only the latest decoded update is emitted once per frame interval.
//! After `max_retries` consecutive failed reconnects the client enters the
//! terminal `GaveUp` state and `run` returns an error.

use crate::backoff::backoff_delay;
use crate::config::FeedConfig;
use crate::decoder::MessageDecoder;
use crate::error::{WsError, WsResult};
use crate::watchdog::IdleWatchdog;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the retry budget is spent.
    GaveUp,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::GaveUp => "gave-up",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent<T> {
    StateChanged(ConnectionState),
    Update(T),
    GaveUp { attempts: u32 },
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub frames: u64,
    pub decoded: u64,
    pub decode_errors: u64,
    /// Updates superseded within a frame.
    pub coalesced: u64,
    pub emitted: u64,
    pub connects: u64,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    decoded: AtomicU64,
    decode_errors: AtomicU64,
    coalesced: AtomicU64,
    emitted: AtomicU64,
    connects: AtomicU64,
}

/// Clears the running flag when `run` exits by any path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Reconnecting WebSocket feed client.
pub struct FeedClient<D: MessageDecoder> {
    config: FeedConfig,
    decoder: Mutex<D>,
    state: RwLock<ConnectionState>,
    retry_count: AtomicU32,
    running: AtomicBool,
    watchdog: IdleWatchdog,
    counters: Counters,
    event_tx: mpsc::Sender<FeedEvent<D::Output>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl<D: MessageDecoder> FeedClient<D> {
    /// Create a client and the receiver for its events.
    pub fn new(
        config: FeedConfig,
        decoder: D,
    ) -> WsResult<(Self, mpsc::Receiver<FeedEvent<D::Output>>)> {
        Self::with_token(config, decoder, CancellationToken::new())
    }

    /// Create a client that also stops when `token` is cancelled.
    pub fn with_token(
        config: FeedConfig,
        decoder: D,
        token: CancellationToken,
    ) -> WsResult<(Self, mpsc::Receiver<FeedEvent<D::Output>>)> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let client = Self {
            watchdog: IdleWatchdog::new(config.idle_timeout_ms),
            config,
            decoder: Mutex::new(decoder),
            state: RwLock::new(ConnectionState::Disconnected),
            retry_count: AtomicU32::new(0),
            running: AtomicBool::new(false),
            counters: Counters::default(),
            event_tx,
            shutdown_token: token,
        };
        Ok((client, event_rx))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn stats(&self) -> FeedStats {
        let c = &self.counters;
        FeedStats {
            frames: c.frames.load(Ordering::Relaxed),
            decoded: c.decoded.load(Ordering::Relaxed),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            emitted: c.emitted.load(Ordering::Relaxed),
            connects: c.connects.load(Ordering::Relaxed),
        }
    }

    /// Signal graceful shutdown.
    ///
    /// The live socket is sent a Close frame, a pending reconnect sleep or
    /// frame flush is abandoned, and no further events are published.
    pub fn shutdown(&self) {
        info!(url = %self.config.url, "Feed client shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and keep the feed running until shutdown or give-up.
    ///
    /// Returns `Ok(())` after shutdown, `Err(WsError::GaveUp)` once the retry
    /// budget is spent, and `Err(WsError::AlreadyRunning)` if another `run`
    /// on this client has not returned yet.
    pub async fn run(&self) -> WsResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(WsError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        self.connect_with_retry().await
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting).await;

            match self.try_connect().await {
                Ok(()) => info!(url = %self.config.url, "WebSocket connection closed"),
                Err(e) => warn!(url = %self.config.url, error = %e, "WebSocket connection error"),
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            self.set_state(ConnectionState::Disconnected).await;

            let attempt = self.retry_count.load(Ordering::SeqCst);
            if attempt >= self.config.max_retries {
                error!(attempts = attempt, url = %self.config.url, "Max reconnect attempts reached");
                self.set_state(ConnectionState::GaveUp).await;
                self.emit(FeedEvent::GaveUp { attempts: attempt }).await;
                return Err(WsError::GaveUp { attempts: attempt });
            }

            let delay = backoff_delay(
                attempt,
                self.config.base_delay_ms,
                self.config.max_delay_ms,
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            // Wait for delay OR shutdown signal
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }

            self.retry_count.store(attempt + 1, Ordering::SeqCst);
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let connect = tokio::time::timeout(
            self.config.connect_timeout(),
            connect_async_tls_with_config(&self.config.url, None, true, None),
        );
        let (ws_stream, _response) = tokio::select! {
            () = self.shutdown_token.cancelled() => return Ok(()),
            result = connect => match result {
                Ok(connected) => connected?,
                Err(_) => return Err(WsError::ConnectTimeout(self.config.connect_timeout_ms)),
            },
        };
        let (mut write, mut read) = ws_stream.split();

        self.retry_count.store(0, Ordering::SeqCst);
        self.counters.connects.fetch_add(1, Ordering::Relaxed);
        self.watchdog.reset();
        self.set_state(ConnectionState::Connected).await;
        info!(url = %self.config.url, "WebSocket connected");

        if let Some(subscribe) = &self.config.subscribe_message {
            write.send(Message::Text(subscribe.clone())).await?;
            debug!("Subscribe message sent");
        }

        // First flush one frame after connect, so the opening burst coalesces too.
        let frame_interval = self.config.frame_interval();
        let mut frame =
            tokio::time::interval_at(tokio::time::Instant::now() + frame_interval, frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Option<D::Output> = None;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.watchdog.record_message();
                            if let Some(update) = self.decode(&text) {
                                if pending.replace(update).is_some() {
                                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.watchdog.record_message();
                            trace!("Received ping, sending pong");
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                self.flush(&mut pending).await;
                                return Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            self.flush(&mut pending).await;
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {
                            self.watchdog.record_message();
                        }
                        Some(Err(e)) => {
                            self.flush(&mut pending).await;
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            self.flush(&mut pending).await;
                            return Ok(());
                        }
                    }
                }

                _ = frame.tick(), if pending.is_some() => {
                    self.flush(&mut pending).await;
                }

                () = self.watchdog.wait_for_check() => {
                    if self.watchdog.is_idle() {
                        error!(
                            idle_ms = self.watchdog.time_since_last_message_ms(),
                            "Feed idle timeout"
                        );
                        self.flush(&mut pending).await;
                        return Err(WsError::IdleTimeout(self.watchdog.timeout_ms()));
                    }
                }
            }
        }
    }

    fn decode(&self, text: &str) -> Option<D::Output> {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        match self.decoder.lock().decode(text) {
            Ok(Some(update)) => {
                self.counters.decoded.fetch_add(1, Ordering::Relaxed);
                Some(update)
            }
            Ok(None) => None,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Dropping undecodable frame");
                None
            }
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        {
            let mut current = self.state.write();
            if *current == state {
                return;
            }
            *current = state;
        }
        debug!(%state, "Connection state changed");
        self.emit(FeedEvent::StateChanged(state)).await;
    }

    /// Publish an event unless shutdown has been requested.
    /// Emit the held update, if any. Dropped once shutdown has begun.
    async fn flush(&self, pending: &mut Option<D::Output>) {
        if let Some(update) = pending.take() {
            if self.emit(FeedEvent::Update(update)).await {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn emit(&self, event: FeedEvent<D::Output>) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.shutdown_token.cancelled() => false,
            sent = self.event_tx.send(event) => {
                if sent.is_err() {
                    trace!("Event receiver dropped");
                }
                sent.is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::JsonDecoder;
    use std::sync::Arc;
    use std::time::Duration;

    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    fn fast_config(url: String, max_retries: u32) -> FeedConfig {
        FeedConfig {
            url,
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            connect_timeout_ms: 500,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let url = closed_port_url().await;
        let (client, mut rx) = FeedClient::new(fast_config(url, 3), JsonDecoder).unwrap();

        let result = client.run().await;
        assert!(matches!(result, Err(WsError::GaveUp { attempts: 3 })));
        assert_eq!(client.state(), ConnectionState::GaveUp);
        assert!(!client.is_running());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.last(), Some(&FeedEvent::GaveUp { attempts: 3 }));
        assert!(events.contains(&FeedEvent::StateChanged(ConnectionState::GaveUp)));
        assert!(!events.contains(&FeedEvent::StateChanged(ConnectionState::Connected)));
    }

    #[tokio::test]
    async fn test_second_run_rejected() {
        let url = closed_port_url().await;
        let config = FeedConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 10_000,
            ..fast_config(url, 10)
        };
        let (client, _rx) = FeedClient::new(config, JsonDecoder).unwrap();
        let client = Arc::new(client);

        let runner = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.run().await })
        };
        while !client.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(client.run().await, Err(WsError::AlreadyRunning)));

        client.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();
        tokio_test::assert_ok!(result);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_no_events_after_shutdown() {
        let url = closed_port_url().await;
        let (client, mut rx) = FeedClient::new(fast_config(url, 10), JsonDecoder).unwrap();

        client.shutdown();
        assert!(client.run().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_is_silent() {
        let url = closed_port_url().await;
        let config = FeedConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 10_000,
            ..fast_config(url, 10)
        };
        let (client, mut rx) = FeedClient::new(config, JsonDecoder).unwrap();
        let client = Arc::new(client);
        let runner = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.run().await })
        };

        // The first attempt fails at once; the client then sleeps in backoff.
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = rx.recv().await {
                if event == FeedEvent::StateChanged(ConnectionState::Disconnected) {
                    break;
                }
            }
        })
        .await
        .expect("client enters backoff");

        client.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("backoff sleep is cancelled")
            .unwrap();
        tokio_test::assert_ok!(result);
        assert!(rx.try_recv().is_err());
        assert_eq!(client.stats().connects, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FeedConfig {
            frame_interval_ms: 0,
            ..Default::default()
        };
        assert!(FeedClient::new(config, JsonDecoder).is_err());
    }
}
