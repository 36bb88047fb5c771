//! Unified error type for the Wordfall server.

use wordfall_protocol::ProtocolError;
use wordfall_room::{BusError, LeaderboardError, RoomError};
use wordfall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WordfallError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame that doesn't encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A rejected room command.
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordfall_protocol::RoomCode;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wrapped: WordfallError = err.into();
        assert!(matches!(wrapped, WordfallError::Transport(_)));
        assert!(wrapped.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let wrapped: WordfallError = err.into();
        assert!(matches!(wrapped, WordfallError::Protocol(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::RoomNotFound(RoomCode::parse("ABC123").unwrap());
        let wrapped: WordfallError = err.into();
        assert!(matches!(wrapped, WordfallError::Room(_)));
        assert_eq!(wrapped.to_string(), "room ABC123 not found");
    }

    #[test]
    fn test_from_bus_error() {
        let wrapped: WordfallError = BusError::Disconnected.into();
        assert!(matches!(wrapped, WordfallError::Bus(_)));
    }
}
