//! Per-direction translation channel.
//!
//! Each channel owns exactly one WebSocket to the remote engine and drives
//! the utterance protocol:
//!
//! ```text
//! Disconnected → Connecting → Ready ⇄ Buffering → AwaitingCommitAck
//!                                ▲                       │ committed
//!                                └── Responding ◂────────┘
//! ```
//!
//! Any state falls back to `Disconnected` on connection loss; the
//! supervisor task reconnects under [`ReconnectPolicy`] and re-sends the
//! system prompt before accepting forwarded audio. Audio appended while the
//! channel cannot forward (disconnected, or a commit is in flight) is queued
//! and flushed in order on return to `Ready` — never dropped, never
//! interleaved with the utterance being committed.
//!
//! The protocol logic lives in [`UtteranceMachine`], a synchronous state
//! machine that turns inputs into a list of [`Action`]s; the tokio task
//! around it only does transport.

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::backoff::{ReconnectConfig, ReconnectPolicy};
use super::protocol::{self, EngineCommand, EngineEvent, ProtocolError};
use super::ChannelOutput;
use crate::config::EngineConfig;
use crate::relay::Direction;

// ── State machine ──────────────────────────────────────────────────

/// State of a translation channel. A channel is in exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No engine connection.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Connected, prompt sent, no audio buffered for the current utterance.
    Ready,
    /// Audio forwarded for the current utterance, no commit yet.
    Buffering,
    /// Commit sent, waiting for the engine's acknowledgment.
    AwaitingCommitAck,
    /// Response requested, engine is streaming deltas.
    Responding,
}

/// One effect produced by a state-machine step, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a command frame to the engine.
    Send(EngineCommand),
    /// Deliver streamed output toward the opposite participant.
    Deliver(ChannelOutput),
}

/// The utterance protocol state machine. Synchronous and transport-free:
/// every input returns the ordered actions the transport must perform.
#[derive(Debug)]
pub struct UtteranceMachine {
    direction: Direction,
    state: ChannelState,
    system_prompt: String,
    pending_audio: VecDeque<Vec<u8>>,
    pending_commit: bool,
}

impl UtteranceMachine {
    pub fn new(direction: Direction, system_prompt: String) -> Self {
        Self {
            direction,
            state: ChannelState::Disconnected,
            system_prompt,
            pending_audio: VecDeque::new(),
            pending_commit: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// A connection attempt has started.
    pub fn begin_connect(&mut self) {
        self.state = ChannelState::Connecting;
    }

    /// The engine handshake completed: send the per-direction prompt, then
    /// flush whatever queued up while disconnected, in original order.
    pub fn connection_opened(&mut self) -> Vec<Action> {
        self.state = ChannelState::Ready;
        let mut actions = vec![Action::Send(EngineCommand::SystemMessage {
            content: self.system_prompt.clone(),
        })];
        actions.extend(self.flush_pending());
        actions
    }

    /// The engine connection dropped. Queued audio survives for the next
    /// connection; an utterance already committed is lost engine-side.
    pub fn connection_lost(&mut self) {
        self.state = ChannelState::Disconnected;
    }

    /// One chunk of participant audio. Forwarded immediately when the
    /// channel is accepting; queued otherwise.
    pub fn append(&mut self, pcm: Vec<u8>) -> Vec<Action> {
        match self.state {
            ChannelState::Ready | ChannelState::Buffering => {
                self.state = ChannelState::Buffering;
                vec![Action::Send(EngineCommand::append_pcm(&pcm))]
            }
            _ => {
                self.pending_audio.push_back(pcm);
                vec![]
            }
        }
    }

    /// End-of-utterance signal from the participant.
    pub fn end_of_utterance(&mut self) -> Vec<Action> {
        match self.state {
            ChannelState::Buffering => {
                self.state = ChannelState::AwaitingCommitAck;
                vec![Action::Send(EngineCommand::Commit)]
            }
            // Nothing buffered for this utterance; an empty commit is an
            // engine-side error.
            ChannelState::Ready => {
                tracing::debug!(direction = %self.direction, "end-of-utterance with empty buffer, ignored");
                vec![]
            }
            // A commit is outstanding or we are offline: remember the
            // boundary and replay it when the queued audio flushes.
            _ => {
                self.pending_commit = true;
                vec![]
            }
        }
    }

    /// One decoded engine event.
    pub fn engine_event(&mut self, event: EngineEvent) -> Vec<Action> {
        match event {
            EngineEvent::Committed => {
                if self.state == ChannelState::AwaitingCommitAck {
                    self.state = ChannelState::Responding;
                    vec![Action::Send(EngineCommand::CreateResponse)]
                } else {
                    self.log_unsolicited("input_audio_buffer.committed");
                    vec![]
                }
            }
            EngineEvent::AudioDelta { delta } => {
                if self.state != ChannelState::Responding {
                    self.log_unsolicited("response.audio.delta");
                    return vec![];
                }
                match EngineEvent::decode_audio(&delta) {
                    Ok(pcm) => vec![Action::Deliver(ChannelOutput::Audio(pcm))],
                    Err(e) => {
                        tracing::warn!(direction = %self.direction, error = %e, "dropping audio delta");
                        vec![]
                    }
                }
            }
            EngineEvent::TextDelta { delta } => {
                if self.state == ChannelState::Responding {
                    vec![Action::Deliver(ChannelOutput::Caption(delta))]
                } else {
                    self.log_unsolicited("response.text.delta");
                    vec![]
                }
            }
            EngineEvent::Done => {
                if self.state != ChannelState::Responding {
                    self.log_unsolicited("response.done");
                    return vec![];
                }
                self.state = ChannelState::Ready;
                let mut actions = vec![Action::Send(EngineCommand::ClearBuffer)];
                actions.extend(self.flush_pending());
                actions
            }
            EngineEvent::Ping => {
                tracing::debug!(direction = %self.direction, "Engine heartbeat");
                vec![]
            }
            EngineEvent::Error { error } => {
                tracing::warn!(
                    direction = %self.direction,
                    message = %error.message,
                    "engine reported an error"
                );
                vec![]
            }
        }
    }

    /// Replay queued audio in receipt order, and the remembered utterance
    /// boundary if one was signalled while the queue was building.
    fn flush_pending(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Some(pcm) = self.pending_audio.pop_front() {
            self.state = ChannelState::Buffering;
            actions.push(Action::Send(EngineCommand::append_pcm(&pcm)));
        }
        if self.pending_commit {
            self.pending_commit = false;
            if self.state == ChannelState::Buffering {
                self.state = ChannelState::AwaitingCommitAck;
                actions.push(Action::Send(EngineCommand::Commit));
            } else {
                tracing::debug!(direction = %self.direction, "pending end-of-utterance had no audio, dropped");
            }
        }
        actions
    }

    fn log_unsolicited(&self, kind: &str) {
        tracing::debug!(
            direction = %self.direction,
            state = ?self.state,
            kind = kind,
            "unsolicited engine event, ignored"
        );
    }
}

// ── Channel task ───────────────────────────────────────────────────

/// Input accepted by a running channel task.
#[derive(Debug)]
enum ChannelCommand {
    Append(Vec<u8>),
    EndOfUtterance,
}

/// Why a connection's serve loop ended.
enum RunOutcome {
    /// Socket closed or errored; the supervisor reconnects.
    ConnectionLost,
    /// All handles or the output consumer dropped; the task exits.
    Shutdown,
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Handle to a per-direction translation channel.
///
/// Created by [`TranslationChannel::spawn`]; the background task lives for
/// the session's lifetime and recreates its engine connection on failure
/// without recreating the channel.
#[derive(Debug, Clone)]
pub struct TranslationChannel {
    direction: Direction,
    cmd_tx: mpsc::Sender<ChannelCommand>,
}

impl TranslationChannel {
    /// Spawn the channel task. Returns the handle and the stream of
    /// translated output for the opposite participant.
    pub fn spawn(
        direction: Direction,
        engine: EngineConfig,
        reconnect: ReconnectConfig,
        system_prompt: String,
    ) -> (Self, mpsc::Receiver<ChannelOutput>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ChannelCommand>(256);
        let (output_tx, output_rx) = mpsc::channel::<ChannelOutput>(256);

        tokio::spawn(supervise(direction, engine, reconnect, system_prompt, cmd_rx, output_tx));

        (Self { direction, cmd_tx }, output_rx)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Forward one chunk of participant audio.
    pub async fn append(&self, pcm: Vec<u8>) -> anyhow::Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        self.cmd_tx
            .send(ChannelCommand::Append(pcm))
            .await
            .map_err(|_| anyhow::anyhow!("channel task gone"))
    }

    /// Signal end of the current utterance.
    pub async fn end_of_utterance(&self) -> anyhow::Result<()> {
        self.cmd_tx
            .send(ChannelCommand::EndOfUtterance)
            .await
            .map_err(|_| anyhow::anyhow!("channel task gone"))
    }
}

/// Supervisor: connect, serve, reconnect under the backoff policy.
///
/// Commands keep flowing (and queueing inside the machine) during the
/// backoff window, so no participant audio is dropped while offline.
async fn supervise(
    direction: Direction,
    engine: EngineConfig,
    reconnect: ReconnectConfig,
    system_prompt: String,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    output_tx: mpsc::Sender<ChannelOutput>,
) {
    let mut machine = UtteranceMachine::new(direction, system_prompt);
    let mut policy = ReconnectPolicy::new(reconnect);

    loop {
        machine.begin_connect();
        match connect_engine(&engine).await {
            Ok(ws) => {
                tracing::info!(direction = %direction, url = %engine.url, "Engine connection ready");
                let opening = machine.connection_opened();
                policy.mark_success();
                match serve_connection(&mut machine, ws, opening, &mut cmd_rx, &output_tx).await {
                    RunOutcome::ConnectionLost => {}
                    RunOutcome::Shutdown => {
                        tracing::debug!(direction = %direction, "Channel task shutting down");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(direction = %direction, error = %e, "Engine connection failed");
            }
        }

        machine.connection_lost();
        let delay = policy.next_delay();
        if policy.breaker_open() {
            tracing::error!(
                direction = %direction,
                consecutive_failures = policy.attempt(),
                cool_down_ms = delay.as_millis() as u64,
                "Engine circuit breaker open, holding reconnect attempts"
            );
        } else {
            tracing::info!(
                direction = %direction,
                attempt = policy.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling engine reconnect"
            );
        }

        // Keep accepting participant input during the backoff window; the
        // machine queues it for the flush after reconnect.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Append(pcm)) => {
                        let _ = machine.append(pcm);
                    }
                    Some(ChannelCommand::EndOfUtterance) => {
                        let _ = machine.end_of_utterance();
                    }
                    None => return,
                },
            }
        }
    }
}

/// Serve one live engine connection until it drops or the session ends.
async fn serve_connection(
    machine: &mut UtteranceMachine,
    ws: WsStream,
    opening: Vec<Action>,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    output_tx: &mpsc::Sender<ChannelOutput>,
) -> RunOutcome {
    let direction = machine.direction;
    let (mut sink, mut stream) = ws.split();
    let mut appends_sent: u64 = 0;

    if let Some(outcome) =
        apply_actions(direction, opening, &mut sink, output_tx, &mut appends_sent).await
    {
        return outcome;
    }

    loop {
        let actions = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Append(pcm)) => machine.append(pcm),
                Some(ChannelCommand::EndOfUtterance) => machine.end_of_utterance(),
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return RunOutcome::Shutdown;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match protocol::decode_event(&text) {
                    Ok(event) => machine.engine_event(event),
                    Err(ProtocolError::Unrecognized(kind)) => {
                        tracing::debug!(direction = %direction, kind = %kind, "Unrecognized engine event, ignored");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(direction = %direction, error = %e, "Dropping malformed engine frame");
                        continue;
                    }
                },
                // Ping/pong is handled by tungstenite; binary frames are not
                // part of the engine protocol.
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) | WsMessage::Frame(_))) => continue,
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::warn!(direction = %direction, close_frame = ?frame, "Engine closed the connection");
                    return RunOutcome::ConnectionLost;
                }
                Some(Err(e)) => {
                    tracing::warn!(direction = %direction, error = %e, "Engine connection error");
                    return RunOutcome::ConnectionLost;
                }
                None => {
                    tracing::warn!(direction = %direction, "Engine stream ended");
                    return RunOutcome::ConnectionLost;
                }
            },
        };

        if let Some(outcome) =
            apply_actions(direction, actions, &mut sink, output_tx, &mut appends_sent).await
        {
            return outcome;
        }
    }
}

/// Perform a step's effects in order. Returns `Some` when the serve loop
/// must end.
async fn apply_actions(
    direction: Direction,
    actions: Vec<Action>,
    sink: &mut (impl SinkExt<WsMessage> + Unpin),
    output_tx: &mpsc::Sender<ChannelOutput>,
    appends_sent: &mut u64,
) -> Option<RunOutcome> {
    for action in actions {
        match action {
            Action::Send(cmd) => {
                if let EngineCommand::AppendAudio { .. } = &cmd {
                    *appends_sent += 1;
                    if *appends_sent == 1 || *appends_sent % 50 == 0 {
                        tracing::info!(
                            direction = %direction,
                            chunk = *appends_sent,
                            "Forwarding audio chunk to engine"
                        );
                    }
                }
                let json = match cmd.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(direction = %direction, error = %e, "Failed to encode engine command, dropped");
                        continue;
                    }
                };
                if sink.send(WsMessage::text(json)).await.is_err() {
                    tracing::warn!(direction = %direction, "Engine send failed");
                    return Some(RunOutcome::ConnectionLost);
                }
            }
            Action::Deliver(output) => {
                if output_tx.send(output).await.is_err() {
                    // Output pump gone means the session is tearing down.
                    return Some(RunOutcome::Shutdown);
                }
            }
        }
    }
    None
}

/// Open the engine WebSocket with the configured credential.
async fn connect_engine(engine: &EngineConfig) -> anyhow::Result<WsStream> {
    let url = format!("{}?model={}", engine.url, engine.model);
    let mut request = url
        .into_client_request()
        .map_err(|e| anyhow::anyhow!("Failed to build engine request: {e}"))?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", engine.api_key)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid auth header: {e}"))?,
    );
    request.headers_mut().insert(
        "OpenAI-Beta",
        "realtime=v1"
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid header: {e}"))?,
    );

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to engine: {e}"))?;
    Ok(ws_stream)
}

// ── Tests ──────────────────────────────────────────────────────────
