//! Interface for the precompiles. It contains the precompile result type,
//! the precompile output type, the precompile error type and the traits
//! implemented by stateless and stateful precompiles.
use crate::state::StateDB;
use alloy_primitives::{Address, Bytes};
use core::fmt;
use std::{string::String, sync::Arc};

/// A precompile operation result type
///
/// Returns either `Ok(PrecompileOutput)` or `Err(PrecompileError)`.
pub type PrecompileResult = Result<PrecompileOutput, PrecompileError>;

/// Precompile execution output
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrecompileOutput {
    /// Gas used by the precompile
    pub gas_used: u64,
    /// Output bytes
    pub bytes: Bytes,
}

impl PrecompileOutput {
    /// Returns new precompile output with the given gas used and output bytes.
    pub fn new(gas_used: u64, bytes: Bytes) -> Self {
        Self { gas_used, bytes }
    }
}

/// Stateless precompile function type.
///
/// Takes input bytes and the gas limit, returns the precompile result.
/// Used by the pure engines (p256verify, ML-KEM, ring signatures, Ringtail,
/// FHE); these never touch chain state.
pub type PrecompileFn = fn(&[u8], u64) -> PrecompileResult;

/// Call environment handed to stateful precompiles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Account that initiated the call.
    pub caller: Address,
    /// Address the precompile itself lives at. State writes go under this
    /// address only.
    pub address: Address,
    /// Whether the call was made through a static context. Write-bearing
    /// operations must fail without touching state.
    pub read_only: bool,
    /// Block timestamp in UTC seconds.
    pub timestamp: u64,
}

impl CallContext {
    /// Returns a new call context.
    pub fn new(caller: Address, address: Address, read_only: bool, timestamp: u64) -> Self {
        Self {
            caller,
            address,
            read_only,
            timestamp,
        }
    }
}

/// State-bearing precompile.
///
/// The contract mirrors the stateless one with two extra rules: gas is
/// computed purely from the input (never from state), and a write operation
/// invoked with `ctx.read_only` set must fail with
/// [`PrecompileError::ReadOnlyViolation`] before any state access.
pub trait StatefulPrecompile: Send + Sync {
    /// Gas required to run the precompile on `input`. Pure in the input
    /// bytes.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// Runs the precompile. Either fully succeeds, debiting exactly
    /// [`Self::required_gas`], or fails without state mutation.
    fn run(
        &self,
        state: &mut dyn StateDB,
        ctx: &CallContext,
        input: &[u8],
        gas_limit: u64,
    ) -> PrecompileResult;
}

/// Arc over a stateful precompile, the form stored in the registry.
pub type StatefulPrecompileArc = Arc<dyn StatefulPrecompile>;

/// Registry entry: either a pure function or a state-bearing handler.
#[derive(Clone)]
pub enum PrecompileEntry {
    /// Ordinary pure precompile.
    Standard(PrecompileFn),
    /// Stateful precompile behind an [`Arc`].
    Stateful(StatefulPrecompileArc),
}

impl fmt::Debug for PrecompileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(_) => f.write_str("Standard"),
            Self::Stateful(_) => f.write_str("Stateful"),
        }
    }
}

/// Precompile with address and function.
#[derive(Clone, Debug)]
pub struct PrecompileWithAddress(pub Address, pub PrecompileFn);

impl From<PrecompileWithAddress> for (Address, PrecompileEntry) {
    fn from(value: PrecompileWithAddress) -> Self {
        (value.0, PrecompileEntry::Standard(value.1))
    }
}

impl PrecompileWithAddress {
    /// Returns the address of the precompile.
    pub fn address(&self) -> &Address {
        &self.0
    }

    /// Returns the precompile function.
    pub fn precompile(&self) -> &PrecompileFn {
        &self.1
    }
}

/// Precompile error type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrecompileError {
    /// `supplied_gas < required_gas`. Gas is not partially debited.
    OutOfGas,
    /// Write-bearing operation called through a static context.
    ReadOnlyViolation,
    /// Selector byte or 4-byte selector is not part of the dispatch table.
    UnknownSelector,
    /// Input is shorter than the operation's fixed layout or a
    /// length-prefixed argument overruns the buffer.
    InvalidInputLength,
    /// Ring signature over fewer than two members.
    InvalidRingSize,
    /// Signer index does not address a ring member.
    InvalidSignerIndex,
    /// A 33-byte blob is not a valid compressed secp256k1 point.
    InvalidCurvePoint,
    /// Work-proof privacy level outside {1, 2, 3, 4}.
    InvalidPrivacyLevel,
    /// Work proof shorter than the 78-byte fixed prefix.
    WorkProofTooShort,
    /// `markSpent` on a work id that is already in the spent set.
    WorkAlreadySpent,
    /// Public-key length does not select an ML-DSA level.
    UnknownMlDsaLevel,
    /// Signature length does not match the level selected by the public key.
    MlDsaLengthMismatch,
    /// Mode byte outside the ML-KEM {512, 768, 1024} table.
    UnknownKemMode,
    /// Key or ciphertext length does not match the selected ML-KEM mode.
    KemLengthMismatch,
    /// Threshold policy violated (`t == 0` or `t > n`).
    InvalidThreshold,
    /// Lattice signature decode ran out of bytes or a coefficient violated
    /// the ring modulus.
    DeserializationFailed,
    /// FHE handle is not present in the store.
    UnknownHandle,
    /// Balance subtraction below zero in the state layer.
    InsufficientBalance,
    /// Fatal error with a custom error message
    Fatal(String),
    /// Catch-all variant for other errors
    Other(String),
}

impl PrecompileError {
    /// Returns another error with the given message.
    pub fn other(err: impl Into<String>) -> Self {
        Self::Other(err.into())
    }

    /// Returns `true` if the error is out of gas.
    pub fn is_oog(&self) -> bool {
        matches!(self, Self::OutOfGas)
    }
}

impl core::error::Error for PrecompileError {}

impl fmt::Display for PrecompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfGas => "out of gas",
            Self::ReadOnlyViolation => "write operation in a static call",
            Self::UnknownSelector => "unknown selector",
            Self::InvalidInputLength => "invalid input length",
            Self::InvalidRingSize => "ring must have at least two members",
            Self::InvalidSignerIndex => "signer index out of range",
            Self::InvalidCurvePoint => "invalid compressed secp256k1 point",
            Self::InvalidPrivacyLevel => "unknown privacy level",
            Self::WorkProofTooShort => "work proof below minimum length",
            Self::WorkAlreadySpent => "work id already spent",
            Self::UnknownMlDsaLevel => "public key length selects no ML-DSA level",
            Self::MlDsaLengthMismatch => "signature length does not match ML-DSA level",
            Self::UnknownKemMode => "unknown ML-KEM mode",
            Self::KemLengthMismatch => "key or ciphertext length does not match ML-KEM mode",
            Self::InvalidThreshold => "invalid threshold",
            Self::DeserializationFailed => "lattice signature deserialization failed",
            Self::UnknownHandle => "unknown ciphertext handle",
            Self::InsufficientBalance => "insufficient balance",
            Self::Fatal(s) => s,
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oog_classification() {
        assert!(PrecompileError::OutOfGas.is_oog());
        assert!(!PrecompileError::UnknownSelector.is_oog());
    }

    #[test]
    fn entry_debug() {
        fn noop(_: &[u8], _: u64) -> PrecompileResult {
            Ok(PrecompileOutput::new(0, Bytes::new()))
        }
        let entry = PrecompileEntry::Standard(noop);
        assert_eq!(format!("{entry:?}"), "Standard");
    }
}
