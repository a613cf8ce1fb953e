use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use maze_escape_server::broadcast::Subscription;
use maze_escape_server::config::ServerConfig;
use maze_escape_server::error::{ConfigError, Rejection, SessionError};
use maze_escape_server::protocol::{parse_intent, Intent, ServerMessage};
use maze_escape_server::session::GameSession;
use maze_escape_server::types::Role;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const OUTBOUND_QUEUE: usize = 256;

type SharedSession = Arc<GameSession>;

#[derive(Debug, Error)]
enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server runtime failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error(transparent)]
    Scheduler(#[from] SessionError),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let (session, mut faults) = GameSession::new(config.session.clone());
    session.start().await;

    let app = router(session.clone(), config.static_dir.as_deref());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    info!(port = config.port, "listening");

    let outcome = tokio::select! {
        served = axum::serve(listener, app).into_future() => served.map_err(ServerError::Serve),
        Some(fault) = faults.recv() => {
            error!(%fault, "scheduler fault, shutting down");
            Err(ServerError::Scheduler(fault))
        }
    };
    session.shutdown().await;
    outcome
}

fn router(session: SharedSession, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .route("/websocket", get(ws_handler))
        .with_state(session);

    match static_dir {
        Some(static_dir) => {
            info!(root = %static_dir.display(), "serving static files");
            app.fallback_service(
                ServeDir::new(static_dir)
                    .not_found_service(ServeFile::new(static_dir.join("index.html"))),
            )
        }
        None => {
            warn!("STATIC_DIR not set or missing index.html; static files disabled");
            app
        }
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn state_handler(State(session): State<SharedSession>) -> impl IntoResponse {
    Json(session.snapshot().await)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(session): State<SharedSession>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(session, socket))
}

async fn handle_socket(session: SharedSession, socket: WebSocket) {
    let Subscription {
        id: subscriber,
        receiver: mut snapshots,
    } = session.subscribe().await;
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            if ws_sender
                .send(Message::Text(outbound.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let initial = Arc::new(session.snapshot().await);
    send(&tx, ServerMessage::GameState { state: initial }).await;

    let forward_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(state) = snapshots.recv().await {
            if forward_tx.send(ServerMessage::GameState { state }).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => handle_client_message(&session, &tx, raw.as_str()).await,
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&session, &tx, text).await,
                Err(_) => send_error(&tx, "invalid utf8 message").await,
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.unsubscribe(subscriber).await;
    forwarder.abort();
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(
    session: &SharedSession,
    tx: &mpsc::Sender<ServerMessage>,
    raw: &str,
) {
    let Some(intent) = parse_intent(raw) else {
        debug!(raw, "unparseable client message");
        send_error(tx, "invalid message").await;
        return;
    };

    match intent {
        Intent::Register { name, role, avatar } => {
            // The ack is queued before the forced snapshot reaches the forwarder.
            session
                .register_acked(&name, role, &avatar, |accepted| {
                    if tx.try_send(register_reply(role, accepted)).is_err() {
                        warn!(player = %name, "register ack dropped");
                    }
                })
                .await;
        }
        Intent::Move {
            name,
            position,
            rotation,
        } => {
            session.move_player(&name, position, rotation).await;
        }
        Intent::CollectKey { name, key_id } => {
            session.collect_key(&name, key_id).await;
        }
        Intent::Escape { name, position } => {
            session.escape(&name, position).await;
        }
        Intent::Reset => {
            session.reset().await;
        }
    }
}

fn register_reply(role: Role, accepted: bool) -> ServerMessage {
    if accepted {
        ServerMessage::RegisterSuccess { role }
    } else {
        ServerMessage::RegisterFailed {
            reason: Rejection::NameTaken.to_string(),
        }
    }
}

async fn send(tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    let _ = tx.send(message).await;
}

async fn send_error(tx: &mpsc::Sender<ServerMessage>, message: &str) {
    send(
        tx,
        ServerMessage::Error {
            message: message.to_string(),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use maze_escape_server::session::SessionConfig;

    fn session() -> SharedSession {
        let (session, _faults) = GameSession::new(SessionConfig {
            seed: Some(99),
            ..SessionConfig::default()
        });
        session
    }

    #[test]
    fn register_reply_carries_role_or_reason() {
        assert!(matches!(
            register_reply(Role::Hunter, true),
            ServerMessage::RegisterSuccess { role: Role::Hunter }
        ));
        match register_reply(Role::Survivor, false) {
            ServerMessage::RegisterFailed { reason } => assert_eq!(reason, "name already taken"),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_message_gets_an_error_reply() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        handle_client_message(&session, &tx, "{not json").await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn duplicate_registration_is_acknowledged_as_failure() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let raw = r#"{"type":"register","name":"alice","role":"survivor","avatar":"a"}"#;

        handle_client_message(&session, &tx, raw).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::RegisterSuccess {
                role: Role::Survivor
            })
        ));

        handle_client_message(&session, &tx, raw).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::RegisterFailed { .. })
        ));
        assert_eq!(session.snapshot().await.players.len(), 1);
    }

    #[tokio::test]
    async fn only_a_taken_name_fails_registration() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        let long = "n".repeat(40);
        let long_raw = format!(r#"{{"type":"register","name":"{long}","role":"hunter"}}"#);
        let blank_raw = r#"{"type":"register","name":"","role":"survivor"}"#;

        handle_client_message(&session, &tx, &long_raw).await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::RegisterSuccess { .. })));
        handle_client_message(&session, &tx, blank_raw).await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::RegisterSuccess { .. })));
        handle_client_message(&session, &tx, blank_raw).await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::RegisterFailed { .. })));

        let players = session.snapshot().await.players;
        assert!(players.contains_key(&long));
        assert!(players.contains_key(""));
    }

    #[tokio::test]
    async fn reset_intent_clears_players_without_a_reply() {
        let session = session();
        let (tx, mut rx) = mpsc::channel(8);
        handle_client_message(
            &session,
            &tx,
            r#"{"type":"register","name":"hank","role":"hunter"}"#,
        )
        .await;
        let _ack = rx.try_recv();

        handle_client_message(&session, &tx, r#"{"type":"reset"}"#).await;
        assert!(rx.try_recv().is_err());
        assert!(session.snapshot().await.players.is_empty());
    }
}
