use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use crossbeam_channel::Sender;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    config::RelayConfig,
    registry::{ConnectionId, SessionRegistry},
    relay::{self, Frame, RelayEvent, RelayService, Reply},
    virtual_controller::VirtualControllerBackend,
};

pub const PLACEHOLDER_BODY: &str = "Hello world!";

// Close frame reasons are capped at 123 bytes
const MAX_CLOSE_REASON: usize = 123;

#[derive(Clone)]
struct AppState {
    relay: Sender<RelayEvent>,
    next_conn: Arc<AtomicU64>,
}

impl AppState {
    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait on the server. It is never supposed to stop, so whatever ends the wait is an error.
    pub async fn run_until_stopped(mut self) -> anyhow::Error {
        let Some(task) = self.task.take() else {
            return anyhow::anyhow!("relay server was already stopped");
        };
        match task.await {
            Ok(Ok(())) => anyhow::anyhow!("relay server stopped accepting connections"),
            Ok(Err(e)) => anyhow::Error::new(e).context("relay server failed"),
            Err(e) => anyhow::anyhow!("relay server task died: {}", e),
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bind the listener and start relaying.
///
/// Sessions live on the relay thread, which exits once the server and every connection are
/// gone.
pub async fn start_server(
    config: &RelayConfig,
    backend: Box<dyn VirtualControllerBackend>,
) -> std::io::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    let registry = SessionRegistry::new(backend, config.controller_ids, config.max_controllers);
    let (events, _relay_thread) = relay::spawn(RelayService::new(registry))?;

    let state = AppState {
        relay: events,
        next_conn: Arc::new(AtomicU64::new(1)),
    };
    let app = build_app(state);

    log::info!("Listening on {}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/controller", get(controller_ws_handler))
        .route("/panel", get(panel_ws_handler))
        .fallback(index)
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    PLACEHOLDER_BODY
}

async fn controller_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_connection(socket, state))
}

async fn relay_connection(mut socket: WebSocket, state: AppState) {
    let conn = state.next_connection_id();
    let (replies_tx, mut replies) = mpsc::unbounded_channel();

    if state
        .relay
        .send(RelayEvent::Open {
            conn,
            replies: replies_tx,
        })
        .is_err()
    {
        log::error!("Relay thread is gone, dropping connection {}", conn);
        return;
    }

    loop {
        tokio::select! {
            reply = replies.recv() => match reply {
                Some(Reply::Text(text)) => {
                    if socket.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Reply::Close(reason)) => {
                    let frame = CloseFrame {
                        code: close_code::ERROR,
                        reason: truncate_reason(reason).into(),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            msg = socket.recv() => {
                let frame = match msg {
                    Some(Ok(Message::Binary(payload))) => Frame::Binary(payload),
                    Some(Ok(Message::Text(text))) => Frame::Text(text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::debug!("Connection {} read error: {}", conn, e);
                        break;
                    }
                };
                if state.relay.send(RelayEvent::Frame { conn, frame }).is_err() {
                    break;
                }
            }
        }
    }

    let _ = state.relay.send(RelayEvent::Close { conn });
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

async fn panel_ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(panel_connection)
}

// No panel protocol exists yet; keep the socket open and ignore what arrives
async fn panel_connection(mut socket: WebSocket) {
    log::info!("Control panel connected");
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Close(_) = msg {
            break;
        }
        log::trace!("Ignoring panel frame: {:?}", msg);
    }
    log::info!("Control panel disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_close_reasons_are_cut_on_a_char_boundary() {
        let reason = "é".repeat(100);
        let cut = truncate_reason(reason);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert!(cut.chars().all(|c| c == 'é'));

        assert_eq!(truncate_reason("short".to_string()), "short");
    }
}
