//! Two-party relay model: roles, directions, and the participant-facing
//! message schema.
//!
//! A session has exactly two roles. Each role's speech is consumed by one
//! translation direction and each direction's output is delivered to the
//! opposite role; the two directions never share state.

use serde::{Deserialize, Serialize};

pub mod registry;
pub mod router;
pub mod session;

// ── Roles & directions ─────────────────────────────────────────────

/// One of the two human endpoints in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    A,
    B,
}

impl Role {
    /// The peer on the other side of the conversation.
    pub fn opposite(self) -> Role {
        match self {
            Role::A => Role::B,
            Role::B => Role::A,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::A => f.write_str("A"),
            Role::B => f.write_str("B"),
        }
    }
}

/// A translation direction. Direction `AToB` consumes A's speech and
/// produces output for B, and symmetrically for `BToA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::AToB, Direction::BToA];

    /// The role whose microphone feeds this direction.
    pub fn input_role(self) -> Role {
        match self {
            Direction::AToB => Role::A,
            Direction::BToA => Role::B,
        }
    }

    /// The role that receives this direction's translated output.
    pub fn output_role(self) -> Role {
        self.input_role().opposite()
    }

    /// The direction fed by the given speaker.
    pub fn for_speaker(role: Role) -> Direction {
        match role {
            Role::A => Direction::AToB,
            Role::B => Direction::BToA,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::AToB => f.write_str("A->B"),
            Direction::BToA => f.write_str("B->A"),
        }
    }
}

// ── Participant-facing schema ──────────────────────────────────────

/// First text frame sent by a participant: announces which role the
/// connection holds. Binary frames before this are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinFrame {
    pub role: Role,
}

/// Text control frame sent by a participant after joining.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// End of the current utterance.
    #[serde(rename = "stop")]
    Stop,
}

/// Caption frame delivered to a participant alongside translated audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionFrame {
    pub caption: String,
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_role_is_involutive() {
        assert_eq!(Role::A.opposite(), Role::B);
        assert_eq!(Role::B.opposite().opposite(), Role::B);
    }

    #[test]
    fn directions_route_to_the_other_side() {
        for direction in Direction::ALL {
            assert_eq!(direction.output_role(), direction.input_role().opposite());
        }
        assert_eq!(Direction::for_speaker(Role::A), Direction::AToB);
        assert_eq!(Direction::for_speaker(Role::B).output_role(), Role::A);
    }

    #[test]
    fn join_frame_parses_roles() {
        let frame: JoinFrame = serde_json::from_str(r#"{"role":"A"}"#).unwrap();
        assert_eq!(frame.role, Role::A);
        let frame: JoinFrame = serde_json::from_str(r#"{"role":"B"}"#).unwrap();
        assert_eq!(frame.role, Role::B);
        assert!(serde_json::from_str::<JoinFrame>(r#"{"role":"C"}"#).is_err());
    }

    #[test]
    fn stop_control_frame_parses() {
        let frame: ControlFrame = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert!(matches!(frame, ControlFrame::Stop));
        assert!(serde_json::from_str::<ControlFrame>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn caption_frame_wire_format() {
        let json = serde_json::to_string(&CaptionFrame {
            caption: "hola".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"caption":"hola"}"#);
    }
}
