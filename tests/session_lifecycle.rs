//! End-to-end session behaviour over real TCP sockets.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::ORIGIN};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use wshub::{Bytes, Message, Server, ServerConfig, handler_fn};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn any_port() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

async fn connect(addr: SocketAddr) -> Result<Client> {
    let (ws, _) = connect_async(format!("ws://{addr}")).await?;
    Ok(ws)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Echoes every payload and tags the session with the first payload seen.
fn echo_server(config: ServerConfig) -> Result<Server> {
    let server = Server::builder()
        .handler(handler_fn(|message: Message| async move {
            let Some(session) = message.session() else {
                return;
            };
            if session.mn().is_empty() {
                session.set_mn(String::from_utf8_lossy(message.payload()).into_owned());
            }
            let _ = session.send(message.payload().clone()).await;
        }))
        .config(config)
        .build()?;
    Ok(server)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn echo_round_trip_uses_binary_frames() -> Result<()> {
    let server = echo_server(ServerConfig::default())?;
    let addr = server.listen(any_port()).await?;

    let mut client = connect(addr).await?;
    client.send(WsMessage::Binary(Bytes::from_static(b"node-A"))).await?;

    let reply = timeout(WAIT, client.next()).await?.expect("reply")?;
    assert_eq!(reply, WsMessage::Binary(Bytes::from_static(b"node-A")));

    let tagged = server.get_sessions_by_mn("node-A");
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].mn(), "node-A");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn lookup_by_logical_name() -> Result<()> {
    let server = echo_server(ServerConfig::default())?;
    let addr = server.listen(any_port()).await?;

    let mut clients = Vec::new();
    for name in ["A", "B", "A"] {
        let mut client = connect(addr).await?;
        client.send(WsMessage::Binary(Bytes::from(name))).await?;
        timeout(WAIT, client.next()).await?.expect("echo")?;
        clients.push(client);
    }

    assert_eq!(server.get_all_sessions().len(), 3);
    assert_eq!(server.get_sessions_by_mn("A").len(), 2);
    assert_eq!(server.get_sessions_by_mn("B").len(), 1);
    assert!(server.get_sessions_by_mn("C").is_empty());

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn client_disconnect_after_five_messages() -> Result<()> {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let server = Server::builder()
        .handler(handler_fn(move |_message: Message| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .build()?;
    let addr = server.listen(any_port()).await?;

    let mut client = connect(addr).await?;
    wait_until(|| server.session_count() == 1).await;
    let session = server.get_all_sessions().remove(0);

    for i in 0..5u8 {
        client.send(WsMessage::Binary(Bytes::from(vec![i + 1]))).await?;
    }
    client.send(WsMessage::Binary(Bytes::new())).await?;
    drop(client);

    timeout(WAIT, session.closed()).await?;
    wait_until(|| handled.load(Ordering::SeqCst) == 5).await;

    assert!(server.get_session(&session.id()).is_none());
    assert!(session.send("late").await.expect_err("closed").is_session_closed());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handled.load(Ordering::SeqCst), 5);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn stop_from_server_side_closes_client() -> Result<()> {
    let server = echo_server(ServerConfig::default())?;
    let addr = server.listen(any_port()).await?;

    let mut client = connect(addr).await?;
    wait_until(|| server.session_count() == 1).await;
    let session = server.get_all_sessions().remove(0);

    assert!(session.stop());
    assert!(server.get_session(&session.id()).is_none());

    let frame = timeout(WAIT, client.next()).await?;
    assert!(matches!(frame, Some(Ok(WsMessage::Close(_))) | None));

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn origin_allow_list_is_enforced() -> Result<()> {
    let config = ServerConfig::new().with_allowed_origins(["https://app.example"]);
    let server = echo_server(config)?;
    let addr = server.listen(any_port()).await?;

    let mut good = format!("ws://{addr}").into_client_request()?;
    good.headers_mut()
        .insert(ORIGIN, HeaderValue::from_static("https://app.example"));
    let (_client, _) = connect_async(good).await?;
    wait_until(|| server.session_count() == 1).await;

    let mut bad = format!("ws://{addr}").into_client_request()?;
    bad.headers_mut()
        .insert(ORIGIN, HeaderValue::from_static("https://evil.example"));
    match connect_async(bad).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("expected 403, got {other:?}"),
    }

    // No Origin header at all
    match connect_async(format!("ws://{addr}")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("expected 403, got {other:?}"),
    }

    assert_eq!(server.session_count(), 1);
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_accepting() -> Result<()> {
    let server = echo_server(ServerConfig::default())?;
    let addr = server.listen(any_port()).await?;

    let _client = connect(addr).await?;
    wait_until(|| server.session_count() == 1).await;

    server.shutdown();
    assert_eq!(server.session_count(), 0);

    // Give the accept loop a moment to drop the listener
    tokio::time::sleep(Duration::from_millis(50)).await;
    let late = timeout(WAIT, connect(addr)).await?;
    assert!(late.is_err());
    Ok(())
}
