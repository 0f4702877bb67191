//! Translation engine client.
//!
//! One [`channel::TranslationChannel`] per direction owns a persistent
//! WebSocket to the remote realtime translation engine, drives the
//! append → commit → response cycle, and supervises its own reconnection.
//!
//! ## Design
//! - Closed `type`-tagged message enums (`protocol`) — unhandled engine
//!   event kinds are a visible gap in a `match`, not a silent default
//! - Sans-IO utterance state machine (`channel::UtteranceMachine`) driven
//!   by a single tokio task per channel
//! - Exponential backoff with a circuit breaker (`backoff`) — connection
//!   loss is retried forever, never surfaced to participants

pub mod backoff;
pub mod channel;
pub mod protocol;

// ── Shared output type ─────────────────────────────────────────────

/// Streamed result produced by a channel for the opposite participant.
///
/// Both delta kinds are forwarded the moment they arrive; the router
/// decides delivery, the channel never knows who is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutput {
    /// Translated audio chunk (raw PCM, already base64-decoded).
    Audio(Vec<u8>),
    /// Caption text fragment.
    Caption(String),
}

pub use backoff::{ReconnectConfig, ReconnectPolicy};
pub use channel::{ChannelState, TranslationChannel, UtteranceMachine};
pub use protocol::{EngineCommand, EngineEvent, ProtocolError};
