mod common;

use std::{net::SocketAddr, time::Duration};

use common::{sample_state, FakeBackend};
use futures_util::{SinkExt, StreamExt};
use padrelay::config::{BackendKind, ControllerIdPolicy};
use padrelay::relay::{WRONG_LENGTH_ADVISORY, WRONG_OPCODE_ADVISORY};
use padrelay::server::PLACEHOLDER_BODY;
use padrelay::{start_server, RelayConfig, ServerHandle};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(backend: &FakeBackend, max_controllers: u8) -> ServerHandle {
    let config = RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_controllers,
        controller_ids: ControllerIdPolicy::LowestFree,
        backend: BackendKind::DryRun,
    };
    start_server(&config, Box::new(backend.clone())).await.unwrap()
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .unwrap();
    ws
}

async fn next_text(ws: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a reply")
        .expect("stream ended")
        .unwrap();
    msg.to_text().unwrap().to_string()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controller_endpoint_relays_packets() {
    let backend = FakeBackend::new();
    let server = start(&backend, 4).await;
    let mut ws = connect(server.local_addr(), "/controller").await;
    eventually(|| backend.live() == 1).await;

    ws.send(Message::text("not a packet")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, WRONG_OPCODE_ADVISORY);

    ws.send(Message::binary(vec![0u8; 11])).await.unwrap();
    assert_eq!(next_text(&mut ws).await, WRONG_LENGTH_ADVISORY);
    assert!(backend.updates().is_empty());

    ws.send(Message::binary(sample_state(1).to_bytes().to_vec()))
        .await
        .unwrap();
    ws.send(Message::binary(sample_state(2).to_bytes().to_vec()))
        .await
        .unwrap();

    // Frames are handled in order, so the advisory means both packets went through
    ws.send(Message::text("sync")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, WRONG_OPCODE_ADVISORY);
    assert_eq!(
        backend.updates(),
        vec![(0, sample_state(1)), (0, sample_state(2))]
    );

    ws.close(None).await.unwrap();
    eventually(|| backend.live() == 0).await;

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connections_get_separate_controllers() {
    let backend = FakeBackend::new();
    let server = start(&backend, 4).await;

    let mut first = connect(server.local_addr(), "/controller").await;
    eventually(|| backend.live() == 1).await;
    let mut second = connect(server.local_addr(), "/controller").await;
    eventually(|| backend.live() == 2).await;

    second
        .send(Message::binary(sample_state(8).to_bytes().to_vec()))
        .await
        .unwrap();
    second.send(Message::text("sync")).await.unwrap();
    next_text(&mut second).await;

    assert_eq!(backend.recording().plugged, vec![0, 1]);
    assert_eq!(backend.updates(), vec![(1, sample_state(8))]);

    drop(second);
    eventually(|| backend.live() == 1).await;
    first.close(None).await.unwrap();
    eventually(|| backend.live() == 0).await;

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_server_closes_the_extra_connection() {
    let backend = FakeBackend::new();
    let server = start(&backend, 1).await;

    let _first = connect(server.local_addr(), "/controller").await;
    eventually(|| backend.live() == 1).await;

    let mut second = connect(server.local_addr(), "/controller").await;
    let msg = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Error),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(backend.live(), 1);

    drop(server);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_get_serves_placeholder() {
    let backend = FakeBackend::new();
    let server = start(&backend, 4).await;

    let body = reqwest::get(format!("http://{}/", server.local_addr()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, PLACEHOLDER_BODY);
    assert_eq!(backend.live(), 0);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panel_endpoint_ignores_frames() {
    let backend = FakeBackend::new();
    let server = start(&backend, 4).await;

    let mut panel = connect(server.local_addr(), "/panel").await;
    panel
        .send(Message::binary(sample_state(1).to_bytes().to_vec()))
        .await
        .unwrap();
    panel.send(Message::text("telemetry?")).await.unwrap();
    panel.close(None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.live(), 0);
    assert!(backend.updates().is_empty());

    server.shutdown().await;
}
