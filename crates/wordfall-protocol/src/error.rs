//! Error types for the protocol layer.
//!
//! Each crate in Wordfall defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of a message (bytes that
//! don't parse, a snapshot from an incompatible version, a malformed room
//! code), not in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing `type` tag, an unknown
    /// command name, or a room code that fails validation.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but violates a protocol rule, e.g. a word
    /// positioned below the expiry line inside a snapshot.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A snapshot carried a schema version this build doesn't understand.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
}
