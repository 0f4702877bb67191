//! Participant registry: which connection currently holds each role.
//!
//! Exactly two slots, one per role, each behind its own lock — the
//! directions are independent, so no cross-role locking. Rejoin is
//! last-writer-wins: the prior handle is abandoned, not notified, and its
//! eventual close event is a no-op thanks to the exact-handle guard in
//! [`ParticipantRegistry::leave`].

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::Role;

/// Outbound frame for a participant connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantFrame {
    /// Translated PCM, sent as a binary WebSocket frame.
    Audio(Vec<u8>),
    /// Caption text, sent as a `{"caption": ...}` text frame.
    Caption(String),
}

/// Non-owning handle to a participant connection. The registry holds the
/// current handle per role; the router looks it up at delivery time.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    id: Uuid,
    tx: mpsc::Sender<ParticipantFrame>,
}

impl ParticipantHandle {
    pub fn new(tx: mpsc::Sender<ParticipantFrame>) -> Self {
        Self { id: Uuid::new_v4(), tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Best-effort, at-most-once delivery: a closed or saturated
    /// participant queue drops the frame without error.
    pub fn deliver(&self, frame: ParticipantFrame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Role → connection mapping for one session.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    slot_a: Mutex<Option<ParticipantHandle>>,
    slot_b: Mutex<Option<ParticipantHandle>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: Role) -> &Mutex<Option<ParticipantHandle>> {
        match role {
            Role::A => &self.slot_a,
            Role::B => &self.slot_b,
        }
    }

    /// Register `handle` for `role`, overwriting any prior handle.
    /// Overwrite always succeeds.
    pub fn join(&self, role: Role, handle: ParticipantHandle) {
        let mut slot = self.slot(role).lock();
        if let Some(prior) = slot.as_ref() {
            tracing::info!(role = %role, prior = %prior.id(), "Participant rejoined, replacing prior connection");
        } else {
            tracing::info!(role = %role, id = %handle.id(), "Participant joined");
        }
        *slot = Some(handle);
    }

    /// Clear the entry for `role` if it still holds exactly `id`. A stale
    /// close event from a replaced handle is a no-op.
    pub fn leave(&self, role: Role, id: Uuid) {
        let mut slot = self.slot(role).lock();
        if slot.as_ref().is_some_and(|h| h.id() == id) {
            *slot = None;
            tracing::info!(role = %role, "Participant left");
        }
    }

    pub fn lookup(&self, role: Role) -> Option<ParticipantHandle> {
        self.slot(role).lock().clone()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ParticipantHandle, mpsc::Receiver<ParticipantFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (ParticipantHandle::new(tx), rx)
    }

    #[test]
    fn join_then_lookup() {
        let registry = ParticipantRegistry::new();
        assert!(registry.lookup(Role::A).is_none());

        let (h, _rx) = handle();
        let id = h.id();
        registry.join(Role::A, h);
        assert_eq!(registry.lookup(Role::A).unwrap().id(), id);
        assert!(registry.lookup(Role::B).is_none());
    }

    #[test]
    fn rejoin_overwrites_last_writer_wins() {
        let registry = ParticipantRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();
        let first_id = first.id();
        let second_id = second.id();

        registry.join(Role::B, first);
        registry.join(Role::B, second);
        assert_eq!(registry.lookup(Role::B).unwrap().id(), second_id);

        // Stale close from the replaced handle must not evict the new one.
        registry.leave(Role::B, first_id);
        assert_eq!(registry.lookup(Role::B).unwrap().id(), second_id);

        registry.leave(Role::B, second_id);
        assert!(registry.lookup(Role::B).is_none());
    }

    #[test]
    fn leave_unknown_handle_is_a_noop() {
        let registry = ParticipantRegistry::new();
        registry.leave(Role::A, Uuid::new_v4());
        assert!(registry.lookup(Role::A).is_none());
    }

    #[test]
    fn deliver_reaches_the_writer_queue() {
        let (h, mut rx) = handle();
        assert!(h.deliver(ParticipantFrame::Caption("hi".into())));
        assert_eq!(rx.try_recv().unwrap(), ParticipantFrame::Caption("hi".into()));
    }

    #[test]
    fn deliver_to_closed_queue_is_dropped_without_error() {
        let (h, rx) = handle();
        drop(rx);
        assert!(!h.deliver(ParticipantFrame::Audio(vec![1, 2, 3])));
    }
}
