//! Error types for protocol execution

use crate::PeerId;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a protocol
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid protocol configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Birkhoff parameters do not cover the peer set
    #[error("Inconsistent peer number and bks: {bks} bks for {peers} peers")]
    InconsistentPeerNumAndBks { bks: usize, peers: usize },

    /// Own identity missing among the Birkhoff parameters
    #[error("No bk parameter for self")]
    NoSelfBk,

    /// Declared public key is the group identity
    #[error("Identity public key")]
    IdentityPublicKey,

    /// Message from a peer outside the fixed peer set
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// Message type not accepted by the active round
    #[error("Wrong message type: expected {expected}, got {got}")]
    WrongMessageType { expected: String, got: String },

    /// Peer already delivered this message type in the current round
    #[error("Duplicate message {message_type} from {peer}")]
    DuplicateMessage { peer: PeerId, message_type: String },

    /// Engine not running yet, or result requested before completion
    #[error("Not ready")]
    NotReady,

    /// `start` called more than once
    #[error("Already started")]
    AlreadyStarted,

    /// Message received after the protocol reached a terminal state
    #[error("Already terminated")]
    AlreadyTerminated,

    /// Message verification failed
    #[error("Message verification failed: {0}")]
    VerificationFailed(String),

    /// Aggregated public key does not match the expected one
    #[error("Inconsistent public key")]
    InconsistentPublicKey,

    /// Combined signature does not verify
    #[error("Invalid signature")]
    InvalidSignature,

    /// Round output contradicts a protocol invariant
    #[error("Inconsistent round output: {0}")]
    Inconsistent(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected at construction time, no instance exists
    Config,
    /// Rejected at dispatch time, engine state untouched
    Routing,
    /// Same message type delivered twice in one round
    Duplicate,
    /// A message failed a cryptographic check inside `handle`
    Validation,
    /// Aggregate round output failed a check inside `finalize`
    Consistency,
    /// Result requested before the protocol is done
    NotReady,
    /// Anything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_)
            | Error::InconsistentPeerNumAndBks { .. }
            | Error::NoSelfBk
            | Error::IdentityPublicKey => ErrorKind::Config,
            Error::UnknownPeer(_)
            | Error::WrongMessageType { .. }
            | Error::AlreadyStarted
            | Error::AlreadyTerminated => ErrorKind::Routing,
            Error::DuplicateMessage { .. } => ErrorKind::Duplicate,
            Error::VerificationFailed(_) | Error::Deserialization(_) => ErrorKind::Validation,
            Error::InconsistentPublicKey | Error::InvalidSignature | Error::Inconsistent(_) => {
                ErrorKind::Consistency
            }
            Error::NotReady => ErrorKind::NotReady,
            Error::Serialization(_) | Error::Crypto(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_separate_handle_and_finalize_failures() {
        assert_eq!(
            Error::VerificationFailed("bad proof".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::InconsistentPublicKey.kind(), ErrorKind::Consistency);
        assert_eq!(Error::NotReady.kind(), ErrorKind::NotReady);
        assert_eq!(Error::UnknownPeer("x".into()).kind(), ErrorKind::Routing);
    }
}
