//! End-to-end transport tests against an in-process WebSocket server.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, timeout};

use iosmon::history::last_value;
use iosmon::state::{ConnectionStatus, PerfState};
use iosmon::types::Inbound;
use iosmon::ws::{ClientConfig, WsClient};

async fn send_json(socket: &mut WebSocket, v: Value) {
    let _ = socket.send(Message::Text(v.to_string())).await;
}

// Minimal stand-in for the monitoring server: greets, answers start_monitoring
// with a garbage frame followed by one sysmontap snapshot, and acks heartbeats.
async fn fake_server(mut socket: WebSocket) {
    send_json(&mut socket, json!({"action": "welcome", "message": "hello"})).await;
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(v) = serde_json::from_str::<Value>(&text) else { continue };
        match v["action"].as_str() {
            Some("start_monitoring") => {
                send_json(
                    &mut socket,
                    json!({
                        "action": "monitoring_started",
                        "session_id": v["session_id"],
                        "device_id": v["udid"],
                        "protocols": v["protocols"]
                    }),
                )
                .await;
                let _ = socket.send(Message::Text("{not json".to_string())).await;
                send_json(
                    &mut socket,
                    json!({
                        "action": "sysmontap_metrics",
                        "subtype": "sysmontap",
                        "timestamp": 1000,
                        "system": {"CPU": 42.5},
                        "processes": [{"Pid": 100, "Name": "Test", "CPU": 5}]
                    }),
                )
                .await;
            }
            Some("heartbeat") => {
                send_json(&mut socket, json!({"action": "heartbeat_ack"})).await;
            }
            _ => {}
        }
    }
}

async fn serve() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/",
        get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(fake_server) }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

// Greets and hangs up straight away, counting every upgrade it accepts.
async fn serve_and_hang_up() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let upgrades = Arc::new(AtomicUsize::new(0));
    let counter = upgrades.clone();
    let app = Router::new().route(
        "/",
        get(move |ws: WebSocketUpgrade| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ws.on_upgrade(|mut socket: WebSocket| async move {
                    send_json(&mut socket, json!({"action": "welcome"})).await;
                    let _ = socket.send(Message::Close(None)).await;
                })
            }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, upgrades)
}

async fn wait_for_status(
    rx: &mut broadcast::Receiver<ConnectionStatus>,
    want: ConnectionStatus,
) {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(s) if s == want => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("status channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {want:?} within timeout"));
}

#[tokio::test]
async fn server_close_is_followed_by_a_reconnect() {
    let (addr, upgrades) = serve_and_hang_up().await;
    let client = WsClient::new(ClientConfig {
        reconnect_base: Duration::from_millis(50),
        ..ClientConfig::default()
    });
    let mut status = client.on_status_change();
    client.connect(&format!("ws://{addr}/")).await.expect("connect");

    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    wait_for_status(&mut status, ConnectionStatus::Disconnected).await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    assert!(upgrades.load(Ordering::SeqCst) >= 2);
    client.disconnect();
}

#[tokio::test]
async fn disconnect_during_backoff_cancels_the_retry() {
    let (addr, upgrades) = serve_and_hang_up().await;
    let client = WsClient::new(ClientConfig {
        reconnect_base: Duration::from_millis(400),
        ..ClientConfig::default()
    });
    let mut status = client.on_status_change();
    client.connect(&format!("ws://{addr}/")).await.expect("connect");

    // the server hung up, so the loop is now sleeping before its next attempt
    wait_for_status(&mut status, ConnectionStatus::Disconnected).await;
    client.disconnect();
    let seen = upgrades.load(Ordering::SeqCst);
    assert_eq!(seen, 1);

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(upgrades.load(Ordering::SeqCst), seen);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn start_monitoring_feeds_the_store() {
    let addr = serve().await;
    let client = WsClient::default();
    let mut rx = client.on_message();
    client
        .connect(&format!("ws://{addr}/"))
        .await
        .expect("connect");
    assert_eq!(client.status(), ConnectionStatus::Connected);

    let mut st = PerfState::new(format!("ws://{addr}/"));
    let start = st.begin_monitoring("test-udid", None);
    client.send(&start);

    timeout(Duration::from_secs(5), async {
        loop {
            let msg = rx.recv().await.expect("message");
            st.apply(&msg);
            if matches!(msg, Inbound::Sysmontap(_)) {
                break;
            }
        }
    })
    .await
    .expect("snapshot within timeout");

    assert!(st.is_monitoring);
    assert!(st.session_id.as_deref().is_some_and(|s| s.starts_with("session_")));
    assert_eq!(last_value(&st.system_cpu), Some(42.5));
    assert_eq!(st.processes[&100].cpu, 5.0);
    // the malformed frame before the snapshot did not cost us the connection
    assert_eq!(client.status(), ConnectionStatus::Connected);

    client.disconnect();
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn every_subscriber_sees_every_message() {
    let addr = serve().await;
    let client = WsClient::default();
    let mut a = client.on_message();
    let mut b = client.on_message();
    client.connect(&format!("ws://{addr}/")).await.expect("connect");

    for rx in [&mut a, &mut b] {
        let msg = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("welcome within timeout")
            .expect("message");
        assert_eq!(
            msg,
            Inbound::Welcome {
                message: Some("hello".into())
            }
        );
    }
    client.disconnect();
}

#[tokio::test]
async fn heartbeats_are_sent_while_connected() {
    let addr = serve().await;
    let client = WsClient::new(ClientConfig {
        heartbeat_every: Duration::from_millis(50),
        ..ClientConfig::default()
    });
    let mut rx = client.on_message();
    client.connect(&format!("ws://{addr}/")).await.expect("connect");

    timeout(Duration::from_secs(5), async {
        loop {
            if rx.recv().await.expect("message") == Inbound::HeartbeatAck {
                break;
            }
        }
    })
    .await
    .expect("heartbeat ack within timeout");
    client.disconnect();
}

#[tokio::test]
async fn connect_when_connected_is_a_no_op() {
    let addr = serve().await;
    let client = WsClient::default();
    let url = format!("ws://{addr}/");
    client.connect(&url).await.expect("connect");
    let mut status = client.on_status_change();
    client.connect(&url).await.expect("second connect");
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(status.try_recv().is_err());
    client.disconnect();
}
