//! Error taxonomy for the gossip overlay.
//!
//! Connection-level errors are recovered locally by closing the offending
//! connection; only `ConfigInvalid` and listener bind failures are fatal to
//! the process.

use std::io;

use thiserror::Error;

/// Errors raised while parsing, handshaking, or servicing a peer/API
/// connection. Every variant maps to a local recovery action documented on
/// the variant itself.
#[derive(Debug, Error)]
pub enum GossipError {
    /// Declared frame size/type mismatch, or a short read before EOF.
    /// Recovery: close the connection.
    #[error("malformed frame")]
    MalformedFrame,

    /// A message disallowed for the connection's current state, an empty
    /// PEER_OFFER, a self-address in an offer, an unsolicited offer, an
    /// expired challenge, or a repeated challenge while one is outstanding.
    /// Recovery: close the connection.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A PoW nonce was absent, invalid, or not found within the effort
    /// bound. Recovery: negative validation then close on the receive side;
    /// abandon the exchange on the send side.
    #[error("proof of work failure")]
    ProofFailure,

    /// Write failure or peer reset. Recovery: close the connection, treat
    /// as peer loss.
    #[error("transient io error: {0}")]
    TransientIo(#[from] io::Error),

    /// An inbound peer arrived while the unverified set was already full.
    /// Recovery: evict the oldest unverified entry, admit the new one.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// Settings failed validation at startup. Fatal.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

pub type Result<T> = std::result::Result<T, GossipError>;
