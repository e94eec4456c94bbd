//! End-to-end tests using a real WebSocket client against a live server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use bookcast::config::ServerConfig;
use bookcast::server::{BroadcastServer, ServerError};
use bookcast::websocket::ConnectionHub;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<ConnectionHub>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Boot a server on an ephemeral port
async fn boot_server() -> TestServer {
    let hub = Arc::new(ConnectionHub::new());
    let server = BroadcastServer::bind(ServerConfig::new("127.0.0.1", 0), Arc::clone(&hub))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run(async move {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        hub,
        shutdown: Some(tx),
        handle,
    }
}

async fn connect(server: &TestServer) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(server.ws_url()))
        .await
        .expect("connect timeout")
        .expect("connect failed");
    ws
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Next text frame, skipping control frames
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");

        match msg {
            Message::Text(_) => return msg.to_text().unwrap().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Next binary frame, skipping control frames
async fn next_binary(ws: &mut WsStream) -> Vec<u8> {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");

        match msg {
            Message::Binary(bytes) => return bytes.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    send_text(ws, &format!("subscribe:{}", topic)).await;
    assert_eq!(
        next_text(ws).await,
        format!("Acknowledged: subscribe:{}", topic)
    );
}

/// Assert no data frame arrives for a short while
async fn assert_quiet(ws: &mut WsStream) {
    if let Ok(Some(Ok(msg))) = timeout(QUIET, ws.next()).await {
        assert!(
            !msg.is_text() && !msg.is_binary(),
            "unexpected frame: {:?}",
            msg
        );
    }
}

async fn wait_for_connections(hub: &ConnectionHub, expected: usize) {
    timeout(TIMEOUT, async {
        while hub.connection_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn subscriber_receives_published_payload() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    subscribe(&mut a, "BTC-PERP").await;

    let book = r#"{"bids":[[100.0,1.5]],"asks":[[101.0,2.0]]}"#;
    let report = server.hub.publish("BTC-PERP", book).await;
    assert_eq!(report.delivered, 1);

    assert_eq!(next_text(&mut a).await, book);

    server.stop().await;
}

#[tokio::test]
async fn publish_after_disconnect_is_silent() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    subscribe(&mut a, "BTC-PERP").await;

    a.close(None).await.unwrap();
    drop(a);
    wait_for_connections(&server.hub, 0).await;

    assert_eq!(server.hub.subscriber_count("BTC-PERP").await, 0);
    let report = server.hub.publish("BTC-PERP", "X").await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 0);

    server.stop().await;
}

#[tokio::test]
async fn fan_out_reaches_only_topic_subscribers() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let mut c = connect(&server).await;

    subscribe(&mut a, "ETH-PERP").await;
    subscribe(&mut b, "ETH-PERP").await;
    subscribe(&mut c, "BTC-PERP").await;

    let report = server.hub.publish("ETH-PERP", "Y").await;
    assert_eq!(report.delivered, 2);

    assert_eq!(next_text(&mut a).await, "Y");
    assert_eq!(next_text(&mut b).await, "Y");
    assert_quiet(&mut c).await;

    server.stop().await;
}

#[tokio::test]
async fn arbitrary_frame_is_acknowledged_only() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    send_text(&mut a, "ping").await;
    assert_eq!(next_text(&mut a).await, "Acknowledged: ping");
    assert_eq!(server.hub.topic_count().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn binary_frame_is_acknowledged_verbatim() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    a.send(Message::Binary(b"subscribe:SOL-PERP".to_vec().into()))
        .await
        .unwrap();
    assert_eq!(
        next_binary(&mut a).await,
        b"Acknowledged: subscribe:SOL-PERP".to_vec()
    );
    assert_eq!(server.hub.subscriber_count("SOL-PERP").await, 1);

    // Not UTF-8: echoed byte for byte, no subscription
    a.send(Message::Binary(vec![b'p', 0xff, 0xfe, b'q'].into()))
        .await
        .unwrap();
    assert_eq!(next_binary(&mut a).await, b"Acknowledged: p\xff\xfeq".to_vec());
    assert_eq!(server.hub.topic_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn duplicate_subscribe_delivers_once() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    subscribe(&mut a, "BTC-PERP").await;
    subscribe(&mut a, "BTC-PERP").await;

    let report = server.hub.publish("BTC-PERP", "once").await;
    assert_eq!(report.delivered, 1);
    assert_eq!(next_text(&mut a).await, "once");
    assert_quiet(&mut a).await;

    server.stop().await;
}

#[tokio::test]
async fn sequential_publishes_arrive_in_order() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    subscribe(&mut a, "BTC-PERP").await;

    for i in 0..50 {
        server.hub.publish("BTC-PERP", i.to_string()).await;
    }

    for i in 0..50 {
        assert_eq!(next_text(&mut a).await, i.to_string());
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn acks_and_broadcasts_never_interleave() {
    const FRAMES: usize = 200;
    const PAYLOADS: usize = 200;

    let server = boot_server().await;
    let mut a = connect(&server).await;
    subscribe(&mut a, "BTC-PERP").await;

    // Large enough that a torn write would show up as a corrupted frame
    let filler = "x".repeat(4096);

    let hub = Arc::clone(&server.hub);
    let payload_filler = filler.clone();
    let producer = tokio::spawn(async move {
        for i in 0..PAYLOADS {
            hub.publish("BTC-PERP", format!("pub-{}-{}", i, payload_filler)).await;
            tokio::task::yield_now().await;
        }
    });

    for i in 0..FRAMES {
        send_text(&mut a, &format!("msg-{}-{}", i, filler)).await;
    }
    producer.await.unwrap();

    let mut acks = Vec::new();
    let mut broadcasts = Vec::new();
    for _ in 0..FRAMES + PAYLOADS {
        let text = next_text(&mut a).await;
        match text.strip_prefix("Acknowledged: ") {
            Some(original) => acks.push(original.to_string()),
            None => broadcasts.push(text),
        }
    }

    let expected_acks: Vec<String> = (0..FRAMES).map(|i| format!("msg-{}-{}", i, filler)).collect();
    let expected_broadcasts: Vec<String> =
        (0..PAYLOADS).map(|i| format!("pub-{}-{}", i, filler)).collect();
    assert_eq!(acks, expected_acks);
    assert_eq!(broadcasts, expected_broadcasts);
    assert_quiet(&mut a).await;

    server.stop().await;
}

#[tokio::test]
async fn subscribing_to_several_topics() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    subscribe(&mut a, "BTC-PERP").await;
    subscribe(&mut a, "ETH-PERP").await;

    server.hub.publish("ETH-PERP", "eth").await;
    server.hub.publish("BTC-PERP", "btc").await;

    assert_eq!(next_text(&mut a).await, "eth");
    assert_eq!(next_text(&mut a).await, "btc");

    server.stop().await;
}

#[tokio::test]
async fn http_publish_reaches_websocket_subscriber() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    subscribe(&mut a, "BTC-PERP").await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/v1/publish", server.addr))
        .json(&serde_json::json!({ "topic": "BTC-PERP", "payload": "from-http" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["delivered"], 1);

    assert_eq!(next_text(&mut a).await, "from-http");

    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_every_connection() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    subscribe(&mut a, "BTC-PERP").await;
    subscribe(&mut b, "ETH-PERP").await;
    assert_eq!(server.hub.connection_count().await, 2);

    let hub = Arc::clone(&server.hub);
    server.stop().await;

    assert_eq!(hub.connection_count().await, 0);
    assert_eq!(hub.topic_count().await, 0);

    // Each client sees the socket close
    for ws in [&mut a, &mut b] {
        let closed = timeout(TIMEOUT, async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "connection was not closed");
    }
}
