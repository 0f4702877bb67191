//! Session wiring: one registry, two channels, two output pumps.
//!
//! A session pairs the participant registry with the two translation
//! channels for a room. Channels are created once at session start and live
//! for the session's lifetime; their engine connections come and go
//! underneath them. One pump task per direction moves channel output into
//! the router, so a stall on one direction never stalls the other.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::{ChannelOutput, TranslationChannel};

use super::registry::ParticipantRegistry;
use super::router::RelayRouter;
use super::Direction;

pub struct Session {
    registry: Arc<ParticipantRegistry>,
    router: Arc<RelayRouter>,
}

impl Session {
    /// Create the registry and both channels, and start the output pumps.
    pub fn start(config: &Config) -> Self {
        let registry = Arc::new(ParticipantRegistry::new());

        let (a_to_b, a_rx) = TranslationChannel::spawn(
            Direction::AToB,
            config.engine.clone(),
            config.reconnect.clone(),
            config.system_prompt(Direction::AToB),
        );
        let (b_to_a, b_rx) = TranslationChannel::spawn(
            Direction::BToA,
            config.engine.clone(),
            config.reconnect.clone(),
            config.system_prompt(Direction::BToA),
        );

        let router = Arc::new(RelayRouter::new(Arc::clone(&registry), a_to_b, b_to_a));

        for (direction, rx) in [(Direction::AToB, a_rx), (Direction::BToA, b_rx)] {
            tokio::spawn(pump_output(direction, rx, Arc::clone(&router)));
        }

        Self { registry, router }
    }

    pub fn router(&self) -> Arc<RelayRouter> {
        Arc::clone(&self.router)
    }

    pub fn registry(&self) -> Arc<ParticipantRegistry> {
        Arc::clone(&self.registry)
    }
}

/// Move one direction's translated output into the router until the
/// channel task ends.
async fn pump_output(
    direction: Direction,
    mut rx: mpsc::Receiver<ChannelOutput>,
    router: Arc<RelayRouter>,
) {
    while let Some(output) = rx.recv().await {
        router.deliver(direction, output);
    }
    tracing::debug!(direction = %direction, "Output pump ended");
}
