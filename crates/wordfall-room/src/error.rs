//! Error types for the room layer.

use serde::{Deserialize, Serialize};
use wordfall_protocol::{ErrorReason, GameState, PlayerId, RoomCode, ServerMessage};

/// Errors that can occur during room operations.
///
/// Every variant is a command-level rejection: the room's state is left
/// untouched. The enum is serializable because an owner node sends it
/// back verbatim when it rejects a command relayed from another node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(
    tag = "error",
    content = "detail",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RoomError {
    /// No room with this code exists on this node or on the bus.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// Every seat is taken.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// Joins are only accepted in the lobby.
    #[error("room {0} already has a game in progress")]
    GameInProgress(RoomCode),

    /// The requested state change isn't an edge of the lifecycle.
    #[error("cannot go from {from} to {to}")]
    InvalidTransition { from: GameState, to: GameState },

    /// A player can be in at most one room at a time.
    #[error("player {player} is already in room {room}")]
    AlreadyInRoom { player: PlayerId, room: RoomCode },

    #[error("player {0} is not in a room")]
    NotInRoom(PlayerId),

    /// Code generation kept colliding.
    #[error("no free room code after {0} attempts")]
    NoFreeCode(usize),

    /// The room's actor (or its remote owner) stopped answering.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::RoomNotFound(_) => ErrorReason::RoomNotFound,
            Self::RoomFull(_) => ErrorReason::RoomFull,
            Self::GameInProgress(_) => ErrorReason::GameInProgress,
            Self::InvalidTransition { .. } => ErrorReason::InvalidTransition,
            Self::AlreadyInRoom { .. } => ErrorReason::AlreadyInRoom,
            Self::NotInRoom(_) => ErrorReason::NotInRoom,
            Self::NoFreeCode(_) | Self::Unavailable(_) => ErrorReason::Unavailable,
        }
    }

    /// HTTP-flavoured status code carried in the wire error.
    pub fn code(&self) -> u16 {
        match self {
            Self::RoomNotFound(_) => 404,
            Self::RoomFull(_)
            | Self::GameInProgress(_)
            | Self::InvalidTransition { .. }
            | Self::AlreadyInRoom { .. } => 409,
            Self::NotInRoom(_) => 400,
            Self::NoFreeCode(_) | Self::Unavailable(_) => 503,
        }
    }

    /// The `error` event sent back to the requester.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code(),
            reason: self.reason(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_carries_reason_and_code() {
        let code = RoomCode::parse("ABC123").unwrap();
        let msg = RoomError::RoomFull(code).to_message();
        assert_eq!(
            msg,
            ServerMessage::Error {
                code: 409,
                reason: ErrorReason::RoomFull,
                message: "room ABC123 is full".into(),
            }
        );
    }

    #[test]
    fn test_error_survives_the_bus() {
        let err = RoomError::InvalidTransition {
            from: GameState::Playing,
            to: GameState::Countdown,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: RoomError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
