//! Audio relay router.
//!
//! Pure role→direction plumbing: participant frames go to the channel for
//! the speaker's direction, channel output goes to the participant opposite
//! the channel's input role. The router never inspects audio content and
//! holds no protocol state of its own.

use std::sync::Arc;

use crate::engine::{ChannelOutput, TranslationChannel};

use super::registry::{ParticipantFrame, ParticipantHandle, ParticipantRegistry};
use super::{Direction, Role};

pub struct RelayRouter {
    registry: Arc<ParticipantRegistry>,
    a_to_b: TranslationChannel,
    b_to_a: TranslationChannel,
}

impl RelayRouter {
    pub fn new(
        registry: Arc<ParticipantRegistry>,
        a_to_b: TranslationChannel,
        b_to_a: TranslationChannel,
    ) -> Self {
        Self { registry, a_to_b, b_to_a }
    }

    fn channel_for(&self, direction: Direction) -> &TranslationChannel {
        match direction {
            Direction::AToB => &self.a_to_b,
            Direction::BToA => &self.b_to_a,
        }
    }

    /// Role announcement from a freshly connected participant.
    pub fn join(&self, role: Role, handle: ParticipantHandle) {
        self.registry.join(role, handle);
    }

    /// Close event from a participant connection.
    pub fn leave(&self, role: Role, id: uuid::Uuid) {
        self.registry.leave(role, id);
    }

    /// Binary audio frame from a participant's microphone.
    pub async fn on_audio_frame(&self, role: Role, pcm: Vec<u8>) {
        let channel = self.channel_for(Direction::for_speaker(role));
        if let Err(e) = channel.append(pcm).await {
            tracing::warn!(role = %role, error = %e, "Audio frame lost, channel task gone");
        }
    }

    /// `{"type":"stop"}` control frame from a participant.
    pub async fn on_end_of_utterance(&self, role: Role) {
        let channel = self.channel_for(Direction::for_speaker(role));
        if let Err(e) = channel.end_of_utterance().await {
            tracing::warn!(role = %role, error = %e, "End-of-utterance lost, channel task gone");
        }
    }

    /// Streamed channel output → the participant opposite the input role.
    /// An absent or closed peer drops the event without error; the channel's
    /// state machine flow is unaffected.
    pub fn deliver(&self, direction: Direction, output: ChannelOutput) {
        let target = direction.output_role();
        let Some(handle) = self.registry.lookup(target) else {
            tracing::trace!(direction = %direction, target = %target, "No participant for output, dropped");
            return;
        };
        let frame = match output {
            ChannelOutput::Audio(pcm) => ParticipantFrame::Audio(pcm),
            ChannelOutput::Caption(text) => ParticipantFrame::Caption(text),
        };
        if !handle.deliver(frame) {
            tracing::debug!(direction = %direction, target = %target, "Participant queue closed or full, output dropped");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReconnectConfig;
    use crate::config::EngineConfig;
    use tokio::sync::mpsc;

    fn test_router() -> (RelayRouter, Arc<ParticipantRegistry>) {
        // Channels point at an unreachable endpoint; their supervisors just
        // queue input, which is all these routing tests need.
        let engine = EngineConfig {
            url: "ws://127.0.0.1:1".into(),
            model: "test-model".into(),
            api_key: "test-key".into(),
        };
        let registry = Arc::new(ParticipantRegistry::new());
        let (a_to_b, _a_rx) = TranslationChannel::spawn(
            Direction::AToB,
            engine.clone(),
            ReconnectConfig::default(),
            "en->es".into(),
        );
        let (b_to_a, _b_rx) = TranslationChannel::spawn(
            Direction::BToA,
            engine,
            ReconnectConfig::default(),
            "es->en".into(),
        );
        (RelayRouter::new(Arc::clone(&registry), a_to_b, b_to_a), registry)
    }

    fn participant() -> (ParticipantHandle, mpsc::Receiver<ParticipantFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (ParticipantHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn output_goes_to_the_opposite_role_only() {
        let (router, _registry) = test_router();
        let (alice, mut alice_rx) = participant();
        let (bob, mut bob_rx) = participant();
        router.join(Role::A, alice);
        router.join(Role::B, bob);

        router.deliver(Direction::AToB, ChannelOutput::Audio(vec![0x41]));
        assert_eq!(bob_rx.try_recv().unwrap(), ParticipantFrame::Audio(vec![0x41]));
        assert!(alice_rx.try_recv().is_err());

        router.deliver(Direction::BToA, ChannelOutput::Caption("hello".into()));
        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ParticipantFrame::Caption("hello".into())
        );
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivery_ordering_is_preserved() {
        let (router, _registry) = test_router();
        let (bob, mut bob_rx) = participant();
        router.join(Role::B, bob);

        for chunk in [vec![0x41, 0x42, 0x43], vec![0x44, 0x45], vec![0x46]] {
            router.deliver(Direction::AToB, ChannelOutput::Audio(chunk));
        }

        assert_eq!(bob_rx.try_recv().unwrap(), ParticipantFrame::Audio(vec![0x41, 0x42, 0x43]));
        assert_eq!(bob_rx.try_recv().unwrap(), ParticipantFrame::Audio(vec![0x44, 0x45]));
        assert_eq!(bob_rx.try_recv().unwrap(), ParticipantFrame::Audio(vec![0x46]));
    }

    #[tokio::test]
    async fn absent_peer_drops_output_silently() {
        let (router, _registry) = test_router();
        // Nobody joined; both deliveries are silent no-ops.
        router.deliver(Direction::AToB, ChannelOutput::Audio(vec![1]));
        router.deliver(Direction::BToA, ChannelOutput::Caption("x".into()));
    }

    #[tokio::test]
    async fn disconnected_peer_drops_output_silently() {
        let (router, registry) = test_router();
        let (bob, bob_rx) = participant();
        let bob_id = bob.id();
        router.join(Role::B, bob);
        drop(bob_rx);
        router.leave(Role::B, bob_id);
        assert!(registry.lookup(Role::B).is_none());

        router.deliver(Direction::AToB, ChannelOutput::Audio(vec![1]));
    }

    #[tokio::test]
    async fn audio_frames_reach_the_speakers_channel() {
        let (router, _registry) = test_router();
        // Channel supervisors are offline (unreachable engine) but their
        // command queues accept input; this must not error or panic.
        router.on_audio_frame(Role::A, vec![1, 2, 3]).await;
        router.on_end_of_utterance(Role::A).await;
        router.on_audio_frame(Role::B, vec![4]).await;
    }
}
