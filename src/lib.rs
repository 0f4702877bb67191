//! voicebridge — two-party live speech translation relay.
//!
//! Two participants (roles A and B) connect over WebSocket; each one's
//! microphone audio is forwarded through a per-direction translation
//! channel to a remote realtime engine, and the translated audio plus
//! captions stream back to the opposite participant.
//!
//! ## Layout
//! - [`engine`] — engine wire protocol, per-direction channel state
//!   machine, supervised reconnection
//! - [`relay`] — roles, participant registry, relay router, session wiring
//! - [`gateway`] — axum WebSocket endpoint for participants
//! - [`config`] — startup configuration; the only fatal error surface

pub mod config;
pub mod engine;
pub mod gateway;
pub mod relay;
