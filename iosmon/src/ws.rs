//! WebSocket client for the monitoring server.
//!
//! One background task per `connect()` owns the socket. It answers the caller once
//! the socket opens (or fails), then keeps reading frames, writing queued commands
//! and heartbeats until the socket closes. Unexpected closes are retried with a
//! linear backoff; `disconnect()` exhausts the retry budget and stops the task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, tungstenite::Message, Connector,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::state::ConnectionStatus;
use crate::types::{Inbound, Outbound, StartOptions};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MESSAGE_BUFFER: usize = 1024;
const STATUS_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat_every: Duration,
    /// Extra CA (PEM) trusted for `wss://` endpoints.
    pub tls_ca: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_millis(2000),
            max_reconnect_attempts: 5,
            heartbeat_every: Duration::from_millis(15000),
            tls_ca: None,
        }
    }
}

/// Linear backoff: attempt `n` waits `base * n`, up to `max` attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    max: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: u32) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max {
            return None;
        }
        self.attempts += 1;
        Some(self.base * self.attempts)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn exhaust(&mut self) {
        self.attempts = self.max;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct Shared {
    config: ClientConfig,
    status: Mutex<ConnectionStatus>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    msg_tx: broadcast::Sender<Inbound>,
    policy: Mutex<ReconnectPolicy>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        *lock(&self.status) = status;
        // Err only means nobody is listening.
        let _ = self.status_tx.send(status);
    }

    fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    fn dispatch(&self, text: &str) {
        match Inbound::decode(text) {
            Ok(msg) => {
                let _ = self.msg_tx.send(msg);
            }
            Err(e) => warn!("dropping malformed message: {e}"),
        }
    }

    fn next_delay(&self) -> Option<Duration> {
        lock(&self.policy).next_delay()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Failed,
    Stopped,
}

/// Cloneable handle; all clones drive the same connection.
#[derive(Clone)]
pub struct WsClient {
    shared: Arc<Shared>,
}

impl Default for WsClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl WsClient {
    pub fn new(config: ClientConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_BUFFER);
        let (msg_tx, _) = broadcast::channel(MESSAGE_BUFFER);
        let policy = ReconnectPolicy::new(config.reconnect_base, config.max_reconnect_attempts);
        Self {
            shared: Arc::new(Shared {
                config,
                status: Mutex::new(ConnectionStatus::Disconnected),
                status_tx,
                msg_tx,
                policy: Mutex::new(policy),
                outbound: Mutex::new(None),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Every decoded message, to every subscriber. Drop the receiver to unsubscribe.
    pub fn on_message(&self) -> broadcast::Receiver<Inbound> {
        self.shared.msg_tx.subscribe()
    }

    pub fn on_status_change(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Resolves once the socket is open; errors if the first open fails. A failed
    /// open still goes through the normal reconnect schedule in the background.
    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        if self.status() == ConnectionStatus::Connected {
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        if let Some(previous) = lock(&self.shared.shutdown).replace(stop_tx) {
            // A loop still waiting to reconnect to an older URL.
            let _ = previous.send(true);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(run(self.shared.clone(), url.to_string(), stop_rx, ready_tx));
        ready_rx.await.unwrap_or(Err(ClientError::Cancelled))
    }

    /// Close now and suppress any further reconnect.
    pub fn disconnect(&self) {
        lock(&self.shared.policy).exhaust();
        if let Some(stop) = lock(&self.shared.shutdown).take() {
            let _ = stop.send(true);
        }
        lock(&self.shared.outbound).take();
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Fire-and-forget. Dropped with a warning when the socket is not open.
    pub fn send(&self, msg: &Outbound) {
        let tx = lock(&self.shared.outbound).clone();
        let Some(tx) = tx.filter(|_| self.status() == ConnectionStatus::Connected) else {
            warn!("websocket not connected, dropping {}", msg.action());
            return;
        };
        match serde_json::to_string(msg) {
            Ok(text) => {
                if tx.send(text).is_err() {
                    warn!("websocket closing, dropping {}", msg.action());
                }
            }
            Err(e) => warn!("failed to encode {}: {e}", msg.action()),
        }
    }

    pub fn start_monitoring(&self, opts: StartOptions) {
        self.send(&opts.into_message());
    }

    pub fn stop_monitoring(&self) {
        self.send(&Outbound::StopMonitoring);
    }

    pub fn get_stats(&self) {
        self.send(&Outbound::GetStats);
    }

    pub fn trigger_stackshot(&self, udid: &str) {
        self.send(&Outbound::TriggerCoreprofileStackshot {
            udid: udid.to_string(),
        });
    }

    pub fn list_devices(&self) {
        self.send(&Outbound::ListDevices);
    }

    pub fn list_focused_processes(&self) {
        self.send(&Outbound::ListFocusedProcesses);
    }
}

async fn run(
    shared: Arc<Shared>,
    url: String,
    mut stop: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<(), ClientError>>,
) {
    let mut ready = Some(ready);
    loop {
        shared.set_status(ConnectionStatus::Connecting);
        info!("connecting to {url}");

        let opened = tokio::select! {
            r = open(&url, shared.config.tls_ca.as_deref()) => r,
            _ = stop.changed() => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(ClientError::Cancelled));
                }
                return;
            }
        };

        match opened {
            Ok(ws) => {
                let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
                *lock(&shared.outbound) = Some(out_tx);
                lock(&shared.policy).reset();
                shared.set_status(ConnectionStatus::Connected);
                info!("websocket connected");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }

                let end = session(&shared, ws, out_rx, &mut stop).await;
                lock(&shared.outbound).take();
                if end == SessionEnd::Stopped || *stop.borrow() {
                    return;
                }
                if end == SessionEnd::Failed {
                    shared.set_status(ConnectionStatus::Error);
                }
                info!("websocket closed");
                shared.set_status(ConnectionStatus::Disconnected);
            }
            Err(e) => {
                warn!("websocket error: {e}");
                shared.set_status(ConnectionStatus::Error);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e));
                }
                shared.set_status(ConnectionStatus::Disconnected);
            }
        }

        if *stop.borrow() {
            return;
        }
        let Some(delay) = shared.next_delay() else {
            warn!(
                "giving up after {} reconnect attempts",
                shared.config.max_reconnect_attempts
            );
            return;
        };
        info!("reconnecting in {}ms", delay.as_millis());
        tokio::select! {
            _ = sleep(delay) => {}
            _ = stop.changed() => return,
        }
    }
}

async fn session(
    shared: &Shared,
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    let period = shared.config.heartbeat_every;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    let heartbeat_json = serde_json::to_string(&Outbound::Heartbeat).unwrap_or_default();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch(&text),
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("websocket error: {e}");
                    return SessionEnd::Failed;
                }
            },
            Some(text) = out_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("websocket send failed: {e}");
                    return SessionEnd::Failed;
                }
            }
            _ = heartbeat.tick() => {
                debug!("heartbeat");
                if let Err(e) = sink.send(Message::Text(heartbeat_json.clone().into())).await {
                    warn!("heartbeat failed: {e}");
                    return SessionEnd::Failed;
                }
            }
            _ = stop.changed() => {
                // flush commands queued just before disconnect (e.g. stop_monitoring)
                while let Ok(text) = out_rx.try_recv() {
                    let _ = sink.send(Message::Text(text.into())).await;
                }
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Stopped;
            }
        }
    }
}

async fn open(url: &str, tls_ca: Option<&Path>) -> Result<WsStream, ClientError> {
    if let (true, Some(ca)) = (url.starts_with("wss://"), tls_ca) {
        let cfg = tls_config(ca)?;
        let (ws, _) =
            connect_async_tls_with_config(url, None, false, Some(Connector::Rustls(Arc::new(cfg))))
                .await?;
        return Ok(ws);
    }
    let (ws, _) = connect_async(url).await?;
    Ok(ws)
}

fn tls_config(ca: &Path) -> Result<rustls::ClientConfig, ClientError> {
    let mut roots = rustls::RootCertStore::empty();
    let mut reader = std::io::BufReader::new(std::fs::File::open(ca)?);
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert?)
            .map_err(|e| ClientError::Tls(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(ClientError::Tls(format!(
            "no certificates found in {}",
            ca.display()
        )));
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_and_bounded() {
        let base = Duration::from_millis(2000);
        let mut p = ReconnectPolicy::new(base, 5);
        let delays: Vec<Duration> = std::iter::from_fn(|| p.next_delay()).collect();
        assert_eq!(
            delays,
            (1..=5).map(|n| base * n).collect::<Vec<_>>()
        );
        assert_eq!(p.next_delay(), None);
    }

    #[test]
    fn fourth_delay_after_three_closes() {
        let base = Duration::from_millis(2000);
        let mut p = ReconnectPolicy::new(base, 5);
        for _ in 0..3 {
            p.next_delay();
        }
        assert_eq!(p.next_delay(), Some(base * 4));
    }

    #[test]
    fn reset_and_exhaust() {
        let mut p = ReconnectPolicy::new(Duration::from_millis(10), 5);
        p.next_delay();
        p.next_delay();
        p.reset();
        assert_eq!(p.attempts(), 0);
        assert_eq!(p.next_delay(), Some(Duration::from_millis(10)));
        p.exhaust();
        assert_eq!(p.next_delay(), None);
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let client = WsClient::default();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        client.send(&Outbound::GetStats);
        client.stop_monitoring();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn failed_open_reports_error_then_disconnected() {
        let client = WsClient::new(ClientConfig {
            max_reconnect_attempts: 0,
            ..ClientConfig::default()
        });
        let mut status = client.on_status_change();
        // Port 9 (discard) on loopback is essentially never listening.
        let res = client.connect("ws://127.0.0.1:9").await;
        assert!(res.is_err());
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Connecting);
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Error);
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Disconnected);
    }
}
