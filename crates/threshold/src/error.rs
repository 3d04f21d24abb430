//! Error taxonomy for the threshold lifecycle manager and the MPC client.
use thiserror::Error;

/// Errors surfaced by key-lifecycle and MPC operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ThresholdError {
    /// No key under the given id.
    #[error("key not found")]
    KeyNotFound,
    /// The key's expiry has passed.
    #[error("key expired")]
    KeyExpired,
    /// The key has been revoked.
    #[error("key revoked")]
    KeyRevoked,
    /// The key is mid-refresh or mid-reshare.
    #[error("key busy")]
    KeyBusy,
    /// Caller is neither the owner nor a listed signer.
    #[error("unauthorized")]
    Unauthorized,
    /// The key's daily signing quota is exhausted.
    #[error("signing limit exceeded")]
    SigningLimitExceeded,
    /// No request under the given id.
    #[error("request not found")]
    RequestNotFound,
    /// The request's expiry has passed.
    #[error("request expired")]
    RequestExpired,
    /// The request is not in a state that accepts this transition.
    #[error("invalid request state")]
    InvalidRequestState,
    /// The protocol does not support the requested key type.
    #[error("protocol does not support key type")]
    InvalidProtocol,
    /// Unknown or unsupported key type.
    #[error("invalid key type")]
    InvalidKeyType,
    /// Participant count does not match `n` or exceeds the party cap.
    #[error("invalid party count")]
    InvalidPartyCount,
    /// Threshold constraint `0 < t < n` violated.
    #[error("invalid threshold")]
    InvalidThreshold,
    /// An MPC operation exceeded its deadline.
    #[error("mpc operation timed out")]
    Timeout,
    /// A party task failed mid-protocol.
    #[error("mpc protocol failure: {0}")]
    Protocol(String),
    /// Malformed key or signature bytes.
    #[error("malformed {0}")]
    Malformed(&'static str),
}

impl ThresholdError {
    /// Protocol failure with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
