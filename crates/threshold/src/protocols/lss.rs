//! Linear-secret-sharing ECDSA.
//!
//! Keygen runs the shared curve DKG; signing combines a `t + 1` quorum
//! client-side and signs with the reconstructed scalar. The output is the
//! EVM-standard 65-byte `r ‖ s ‖ v`.
use super::{CurveMaterial, KeyMaterial};
use crate::{error::ThresholdError, shamir};
use alloy_primitives::B256;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use rand::rngs::OsRng;

/// Recovery-id offset in the trailing `v` byte.
pub const V_OFFSET: u8 = 27;

/// Distributed key generation.
pub async fn keygen(t: u16, n: u16) -> Result<KeyMaterial, ThresholdError> {
    super::run_curve_dkg(t, n).await.map(KeyMaterial::Ecdsa)
}

/// Signs a 32-byte prehash, reconstructing from the first `t + 1` shares.
pub fn sign(material: &CurveMaterial, message_hash: B256) -> Result<Vec<u8>, ThresholdError> {
    let quorum = &material.shares[..material.t as usize + 1];
    let secret = shamir::reconstruct(quorum)?;
    let signing_key = SigningKey::from_bytes(&secret.to_bytes())
        .map_err(|_| ThresholdError::Malformed("secret share"))?;
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(message_hash.as_slice())
        .map_err(|e| ThresholdError::protocol(e.to_string()))?;

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&signature.to_bytes());
    out.push(recovery_id.to_byte() + V_OFFSET);
    Ok(out)
}

/// Proactive refresh: adds a zero-constant sharing onto every share.
pub fn refresh(material: &mut CurveMaterial) -> Result<(), ThresholdError> {
    let delta = shamir::zero_delta(material.t, material.n, &mut OsRng);
    for (share, d) in material.shares.iter_mut().zip(&delta) {
        share.value += d.value;
    }
    Ok(())
}

/// Re-deals the secret to a new `(t, n)` committee; the group key is
/// unchanged.
pub fn reshare(
    material: &CurveMaterial,
    new_t: u16,
    new_n: u16,
) -> Result<CurveMaterial, ThresholdError> {
    let secret = shamir::reconstruct(&material.shares[..material.t as usize + 1])?;
    let shares = shamir::split(&secret, new_t, new_n, &mut OsRng);
    Ok(CurveMaterial {
        t: new_t,
        n: new_n,
        shares,
        public_key: material.public_key.clone(),
    })
}

/// Verifies a 65-byte `r ‖ s ‖ v` signature against a compressed SEC1
/// public key. The recovered key must match, so `v` is checked too.
pub fn verify(
    public_key: &[u8],
    message_hash: B256,
    signature: &[u8],
) -> Result<bool, ThresholdError> {
    if signature.len() != 65 {
        return Err(ThresholdError::Malformed("signature"));
    }
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| ThresholdError::Malformed("public key"))?;
    let Ok(parsed) = Signature::from_slice(&signature[..64]) else {
        return Ok(false);
    };
    let Some(recovery_id) = signature[64]
        .checked_sub(V_OFFSET)
        .and_then(RecoveryId::from_byte)
    else {
        return Ok(false);
    };

    if verifying_key.verify_prehash(message_hash.as_slice(), &parsed).is_err() {
        return Ok(false);
    }
    let recovered =
        VerifyingKey::recover_from_prehash(message_hash.as_slice(), &parsed, recovery_id);
    Ok(recovered.map(|key| key == verifying_key).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[tokio::test]
    async fn keygen_sign_verify() {
        let KeyMaterial::Ecdsa(material) = keygen(1, 3).await.unwrap() else {
            panic!("lss keygen yields ecdsa material");
        };
        let hash = keccak256(b"lss message");
        let signature = sign(&material, hash).unwrap();
        assert_eq!(signature.len(), 65);
        assert!(verify(&material.public_key, hash, &signature).unwrap());
        assert!(!verify(&material.public_key, keccak256(b"other"), &signature).unwrap());
    }

    #[tokio::test]
    async fn refresh_keeps_the_key_signing() {
        let KeyMaterial::Ecdsa(mut material) = keygen(1, 3).await.unwrap() else {
            unreachable!()
        };
        let before = material.shares.clone();
        refresh(&mut material).unwrap();
        assert_ne!(material.shares[0].value, before[0].value);

        let hash = keccak256(b"after refresh");
        let signature = sign(&material, hash).unwrap();
        assert!(verify(&material.public_key, hash, &signature).unwrap());
    }

    #[tokio::test]
    async fn reshare_to_a_wider_committee() {
        let KeyMaterial::Ecdsa(material) = keygen(1, 3).await.unwrap() else {
            unreachable!()
        };
        let wider = reshare(&material, 3, 7).unwrap();
        assert_eq!(wider.public_key, material.public_key);
        let hash = keccak256(b"post reshare");
        let signature = sign(&wider, hash).unwrap();
        assert!(verify(&wider.public_key, hash, &signature).unwrap());
    }
}
