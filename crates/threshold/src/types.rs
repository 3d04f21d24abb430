//! Data model of the threshold key lifecycle.
use crate::error::ThresholdError;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Hard cap on party count.
pub const MAX_PARTIES: u16 = 150;

/// Seconds per quota day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Threshold-signature protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Linear secret sharing ECDSA.
    Lss,
    /// FROST Schnorr.
    Frost,
    /// CGGMP21 ECDSA.
    Cggmp21,
    /// Ringtail lattice.
    Ringtail,
}

/// Key type a protocol operates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// secp256k1, the EVM-native curve.
    Secp256k1,
    /// Ed25519.
    Ed25519,
    /// BLS12-381.
    Bls12_381,
    /// Ringtail lattice keys.
    Ringtail,
    /// ML-DSA (FIPS 204) keys.
    MlDsa,
}

impl Protocol {
    /// The protocol × key-type compatibility matrix.
    pub fn supports(self, key_type: KeyType) -> bool {
        matches!(
            (self, key_type),
            (Self::Lss, KeyType::Secp256k1)
                | (Self::Frost, KeyType::Secp256k1)
                | (Self::Frost, KeyType::Ed25519)
                | (Self::Cggmp21, KeyType::Secp256k1)
                | (Self::Ringtail, KeyType::Ringtail)
        )
    }
}

/// Lifecycle status of a key. Any non-active status rejects new signing
/// requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    /// Accepting requests.
    Active,
    /// Mid proactive refresh.
    Refreshing,
    /// Mid reshare to a new `(t, n)`.
    Resharing,
    /// Past `expires_at`.
    Expired,
    /// Administratively revoked; terminal.
    Revoked,
}

/// Per-key authorization and quota state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Key owner; may sign, administer signers, refresh, reshare, revoke.
    pub owner: Address,
    /// Additional accounts allowed to request signatures.
    pub allowed_signers: Vec<Address>,
    /// Chain ids signatures may target; empty means unrestricted.
    pub allowed_chains: Vec<u64>,
    /// Daily signing quota; zero means no limit.
    pub max_signs_per_day: u32,
    /// Signatures requested in the current quota day.
    pub signs_today: u32,
    /// Day index (UTC seconds / 86400) of the last quota reset.
    pub last_reset_day: u64,
}

impl Permissions {
    /// Fresh permissions for an owner.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            allowed_signers: Vec::new(),
            allowed_chains: Vec::new(),
            max_signs_per_day: 0,
            signs_today: 0,
            last_reset_day: 0,
        }
    }

    /// Whether `caller` may request signatures.
    pub fn may_sign(&self, caller: Address) -> bool {
        caller == self.owner || self.allowed_signers.contains(&caller)
    }
}

/// A managed threshold key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdKey {
    /// Stable identifier; a reshare may re-index it.
    pub key_id: B256,
    /// Protocol the key was generated under.
    pub protocol: Protocol,
    /// Curve or lattice family.
    pub key_type: KeyType,
    /// Serialized group public key.
    pub public_key: Bytes,
    /// Derived EVM address, secp256k1 keys only.
    pub evm_address: Option<Address>,
    /// Corruption threshold; `t + 1` parties reconstruct.
    pub t: u16,
    /// Party count.
    pub n: u16,
    /// Bumped by every completed refresh or reshare.
    pub generation: u64,
    /// Creation time, UTC seconds.
    pub created_at: u64,
    /// Last completed refresh, UTC seconds.
    pub last_refresh: u64,
    /// Expiry, UTC seconds; zero means never.
    pub expires_at: u64,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Authorization and quota state.
    pub permissions: Permissions,
}

impl ThresholdKey {
    /// The key owner.
    pub fn owner(&self) -> Address {
        self.permissions.owner
    }

    /// Maps a non-active status to the error a new request gets.
    pub fn status_error(&self) -> Option<ThresholdError> {
        match self.status {
            KeyStatus::Active => None,
            KeyStatus::Refreshing | KeyStatus::Resharing => Some(ThresholdError::KeyBusy),
            KeyStatus::Expired => Some(ThresholdError::KeyExpired),
            KeyStatus::Revoked => Some(ThresholdError::KeyRevoked),
        }
    }
}

/// Status lattice of lifecycle requests; transitions are monotone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Accepted, not yet started.
    Pending,
    /// Picked up by the MPC layer.
    InProgress,
    /// Finished; terminal.
    Complete,
    /// Failed; terminal.
    Failed,
    /// Deadline passed; terminal.
    Expired,
}

impl RequestStatus {
    /// Whether the status accepts completion.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Distributed key generation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRequest {
    /// Request identifier.
    pub request_id: B256,
    /// Account that opened the request; becomes the key owner.
    pub requester: Address,
    /// Requested protocol.
    pub protocol: Protocol,
    /// Requested key type.
    pub key_type: KeyType,
    /// Threshold.
    pub t: u16,
    /// Party count.
    pub n: u16,
    /// Participant identities, length `n`.
    pub participants: Vec<Address>,
    /// Open time, UTC seconds.
    pub requested_at: u64,
    /// Deadline, UTC seconds.
    pub expires_at: u64,
    /// Lattice status.
    pub status: RequestStatus,
    /// The produced key, once complete.
    pub key_id: Option<B256>,
}

/// Signing request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Request identifier.
    pub request_id: B256,
    /// Key to sign under.
    pub key_id: B256,
    /// Account that opened the request.
    pub requester: Address,
    /// Message to sign.
    pub message: Bytes,
    /// Target chain id, checked against `allowed_chains` when restricted.
    pub chain_id: u64,
    /// Open time, UTC seconds.
    pub requested_at: u64,
    /// Deadline, UTC seconds.
    pub expires_at: u64,
    /// Lattice status.
    pub status: RequestStatus,
    /// The signature, once complete.
    pub signature: Option<Bytes>,
}

/// Proactive refresh request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// Request identifier.
    pub request_id: B256,
    /// Key being refreshed.
    pub key_id: B256,
    /// Account that opened the request.
    pub requester: Address,
    /// Open time, UTC seconds.
    pub requested_at: u64,
    /// Deadline, UTC seconds.
    pub expires_at: u64,
    /// Lattice status.
    pub status: RequestStatus,
}

/// Reshare request to a new `(t, n)` committee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshareRequest {
    /// Request identifier.
    pub request_id: B256,
    /// Key being reshared.
    pub key_id: B256,
    /// Account that opened the request.
    pub requester: Address,
    /// New threshold.
    pub new_t: u16,
    /// New party count.
    pub new_n: u16,
    /// New participant identities, length `new_n`.
    pub new_participants: Vec<Address>,
    /// Open time, UTC seconds.
    pub requested_at: u64,
    /// Deadline, UTC seconds.
    pub expires_at: u64,
    /// Lattice status.
    pub status: RequestStatus,
}

/// Validates the threshold policy `0 < t < n <= MAX_PARTIES`.
pub fn validate_threshold(t: u16, n: u16) -> Result<(), ThresholdError> {
    if t == 0 || t >= n {
        return Err(ThresholdError::InvalidThreshold);
    }
    if n > MAX_PARTIES {
        return Err(ThresholdError::InvalidPartyCount);
    }
    Ok(())
}
