//! Participant-facing WebSocket gateway.
//!
//! axum serves a single `/ws` route. Per connection:
//!
//! 1. First text frame announces the role: `{"role":"A"}` or `{"role":"B"}`
//! 2. Binary frames are raw PCM microphone chunks → speaker's channel
//! 3. `{"type":"stop"}` text frames mark end of utterance
//! 4. Outbound: binary frames carry translated PCM, text frames carry
//!    `{"caption": ...}`
//!
//! Malformed frames are ignored and the connection stays open; a close
//! clears the registry entry (exact-handle guarded) but never cancels an
//! in-flight engine response — its output just stops being deliverable.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::relay::registry::{ParticipantFrame, ParticipantHandle};
use crate::relay::router::RelayRouter;
use crate::relay::session::Session;
use crate::relay::{CaptionFrame, ControlFrame, JoinFrame, Role};

#[derive(Clone)]
struct AppState {
    router: Arc<RelayRouter>,
}

/// Run the gateway until ctrl-c.
pub async fn serve(listen: SocketAddr, session: &Session) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(AppState {
            router: session.router(),
        });

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr = %listen, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_participant(socket, state.router))
}

/// Parse a role announcement frame.
fn parse_join(text: &str) -> Option<Role> {
    serde_json::from_str::<JoinFrame>(text).ok().map(|f| f.role)
}

/// Parse a post-join control frame.
fn parse_control(text: &str) -> Option<ControlFrame> {
    serde_json::from_str::<ControlFrame>(text).ok()
}

async fn handle_participant(socket: WebSocket, router: Arc<RelayRouter>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Join phase: wait for the role announcement. Anything else before it
    // is dropped, the connection stays open.
    let role = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match parse_join(&text) {
                Some(role) => break role,
                None => tracing::debug!("Malformed join frame, ignored"),
            },
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!("Audio before role announcement, dropped");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => return,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Participant socket error before join");
                return;
            }
        }
    };

    let (tx, mut rx) = mpsc::channel::<ParticipantFrame>(256);
    let handle = ParticipantHandle::new(tx);
    let connection_id = handle.id();
    router.join(role, handle);

    // Writer task: registry-addressed output → this participant's socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                ParticipantFrame::Audio(pcm) => ws_sender.send(Message::Binary(pcm.into())).await,
                ParticipantFrame::Caption(caption) => {
                    match serde_json::to_string(&CaptionFrame { caption }) {
                        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
                        Err(_) => Ok(()),
                    }
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Read loop: microphone audio and control frames → router.
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Binary(pcm) => router.on_audio_frame(role, pcm.to_vec()).await,
            Message::Text(text) => match parse_control(&text) {
                Some(ControlFrame::Stop) => router.on_end_of_utterance(role).await,
                None => tracing::debug!(role = %role, "Malformed control frame, ignored"),
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Stale-guarded: a replaced connection's close does not evict the
    // current holder of the role.
    router.leave(role, connection_id);
    writer.abort();
    tracing::debug!(role = %role, "Participant connection closed");
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frames_parse_to_roles() {
        assert_eq!(parse_join(r#"{"role":"A"}"#), Some(Role::A));
        assert_eq!(parse_join(r#"{"role":"B"}"#), Some(Role::B));
        assert_eq!(parse_join(r#"{"role":"carol"}"#), None);
        assert_eq!(parse_join("pcm-bytes-as-text"), None);
    }

    #[test]
    fn stop_is_the_only_control_frame() {
        assert!(matches!(
            parse_control(r#"{"type":"stop"}"#),
            Some(ControlFrame::Stop)
        ));
        assert!(parse_control(r#"{"type":"start"}"#).is_none());
        assert!(parse_control(r#"{"role":"A"}"#).is_none());
    }
}
