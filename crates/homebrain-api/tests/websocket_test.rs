// Event stream tests against an in-process tokio-tungstenite server.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use homebrain_api::{BridgeEvent, EventStream, ReconnectConfig, StreamMessage, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const STEP: Duration = Duration::from_secs(5);

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
    }
}

async fn listener() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, Url::parse(&format!("ws://{addr}/ws")).unwrap())
}

async fn next(rx: &mut mpsc::Receiver<StreamMessage>) -> StreamMessage {
    tokio::time::timeout(STEP, rx.recv())
        .await
        .expect("stream message in time")
        .expect("stream still open")
}

fn frame(value: &serde_json::Value) -> Message {
    Message::text(value.to_string())
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_arrive_in_order_and_garbage_is_dropped() {
    let (listener, url) = listener().await;
    let (auth_tx, auth_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            let auth = req
                .headers()
                .get("authorization")
                .map(|v| v.to_str().unwrap().to_owned());
            auth_tx.send(auth).unwrap();
            Ok(resp)
        })
        .await
        .unwrap();

        ws.send(frame(&json!({ "type": "bridge_status", "connected": true })))
            .await
            .unwrap();
        ws.send(Message::text("{not json")).await.unwrap();
        ws.send(frame(&json!({ "type": "telemetry", "rssi": -40 })))
            .await
            .unwrap();
        ws.send(frame(&json!({ "type": "device_removed", "device_id": "4abc01" })))
            .await
            .unwrap();
        // Hold the socket open until the client goes away.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let transport =
        TransportConfig::default().with_auth_token(Some(SecretString::from("ws-token".to_string())));
    let (handle, mut rx) =
        EventStream::spawn(url, transport, fast_reconnect(), CancellationToken::new());

    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 1 });
    assert_eq!(next(&mut rx).await, StreamMessage::Connected);

    let StreamMessage::Event(BridgeEvent::BridgeStatus(status)) = next(&mut rx).await else {
        panic!("expected bridge status first");
    };
    assert!(status.is_online());
    assert_eq!(
        next(&mut rx).await,
        StreamMessage::Event(BridgeEvent::Unknown {
            kind: "telemetry".into()
        })
    );
    assert_eq!(
        next(&mut rx).await,
        StreamMessage::Event(BridgeEvent::DeviceRemoved {
            device_id: Some("4abc01".into())
        })
    );

    assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer ws-token"));

    handle.close().await;
    tokio::time::timeout(STEP, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnects_after_bridge_closes() {
    let (listener, url) = listener().await;

    let server = tokio::spawn(async move {
        // First session: close straight away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second session: greet and wait.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(frame(&json!({
            "type": "ws_connected",
            "status": { "connected": true, "mode": "mock" }
        })))
        .await
        .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let (handle, mut rx) = EventStream::spawn(
        url,
        TransportConfig::default(),
        fast_reconnect(),
        CancellationToken::new(),
    );

    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 1 });
    assert_eq!(next(&mut rx).await, StreamMessage::Connected);

    let StreamMessage::Disconnected { retry_in, .. } = next(&mut rx).await else {
        panic!("expected disconnect after server close");
    };
    // Backoff was reset by the successful connect.
    assert_eq!(retry_in, Duration::from_millis(50));

    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 2 });
    assert_eq!(next(&mut rx).await, StreamMessage::Connected);
    let StreamMessage::Event(BridgeEvent::BridgeStatus(status)) = next(&mut rx).await else {
        panic!("expected greeting status");
    };
    assert!(status.is_mock());

    handle.close().await;
    tokio::time::timeout(STEP, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_connects_back_off_exponentially() {
    // Nothing listens on this port.
    let (listener, url) = listener().await;
    drop(listener);

    let (handle, mut rx) = EventStream::spawn(
        url,
        TransportConfig::default(),
        fast_reconnect(),
        CancellationToken::new(),
    );

    let mut delays = Vec::new();
    for expected_attempt in 1..=4 {
        assert_eq!(
            next(&mut rx).await,
            StreamMessage::Connecting {
                attempt: expected_attempt
            }
        );
        let StreamMessage::Disconnected { retry_in, .. } = next(&mut rx).await else {
            panic!("expected connect failure");
        };
        delays.push(retry_in.as_millis());
    }
    assert_eq!(delays, vec![50, 100, 200, 400]);

    handle.close().await;
}

#[tokio::test]
async fn test_cancel_closes_socket_and_stops_reconnecting() {
    let (listener, url) = listener().await;
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut saw_close = false;
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                saw_close = true;
                break;
            }
        }
        closed_tx.send(saw_close).unwrap();
        // A reconnect would block here forever; the test asserts it never comes.
        let _ = listener.accept().await;
    });

    let cancel = CancellationToken::new();
    let (handle, mut rx) = EventStream::spawn(
        url,
        TransportConfig::default(),
        fast_reconnect(),
        cancel.clone(),
    );
    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 1 });
    assert_eq!(next(&mut rx).await, StreamMessage::Connected);

    cancel.cancel();
    tokio::time::timeout(STEP, handle.close()).await.unwrap();

    assert!(tokio::time::timeout(STEP, closed_rx).await.unwrap().unwrap());
    // The task exited, so the channel drains and closes without a reconnect.
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_cancel_during_backoff_wait() {
    let (listener, url) = listener().await;
    drop(listener);

    let slow = ReconnectConfig {
        initial_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(60),
    };
    let (handle, mut rx) =
        EventStream::spawn(url, TransportConfig::default(), slow, CancellationToken::new());

    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 1 });
    assert!(matches!(
        next(&mut rx).await,
        StreamMessage::Disconnected { .. }
    ));

    // The 30s timer is pending; closing must not wait for it.
    tokio::time::timeout(Duration::from_secs(2), handle.close())
        .await
        .unwrap();
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_rejected_handshake_reports_credentials() {
    let (listener, url) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let rejected = tokio_tungstenite::accept_hdr_async(stream, |_: &Request, _: Response| {
            let mut denied = ErrorResponse::new(None);
            *denied.status_mut() = StatusCode::UNAUTHORIZED;
            Err(denied)
        })
        .await;
        assert!(rejected.is_err());
    });

    let transport =
        TransportConfig::default().with_auth_token(Some(SecretString::from("stale".to_string())));
    let (handle, mut rx) =
        EventStream::spawn(url, transport, fast_reconnect(), CancellationToken::new());

    assert_eq!(next(&mut rx).await, StreamMessage::Connecting { attempt: 1 });
    let StreamMessage::Disconnected { reason, .. } = next(&mut rx).await else {
        panic!("expected a disconnect after the rejected upgrade");
    };
    assert_eq!(reason, "Bridge rejected credentials (HTTP 401)");

    handle.close().await;
    tokio::time::timeout(STEP, server).await.unwrap().unwrap();
}
