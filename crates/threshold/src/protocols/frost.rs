//! FROST threshold Schnorr over secp256k1.
//!
//! Two signing rounds: nonce commitments, then Lagrange-weighted partial
//! signatures. The wire layout is the native one, `R:33 ‖ z:32`;
//! reconstructing it outside the adapter for external verification is not
//! supported, so [`verify`] is the only sanctioned check.
use super::{compress_point, decompress_point, parse_scalar, CurveMaterial, KeyMaterial};
use crate::{error::ThresholdError, network, shamir};
use alloy_primitives::B256;
use k256::{
    elliptic_curve::{ops::Reduce, Field},
    ProjectivePoint, Scalar, U256 as CurveUint,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;

const CHALLENGE_DOMAIN: &[u8] = b"pars/frost/challenge";

/// Distributed key generation.
pub async fn keygen(t: u16, n: u16) -> Result<KeyMaterial, ThresholdError> {
    super::run_curve_dkg(t, n).await.map(KeyMaterial::Schnorr)
}

fn challenge(nonce_point: &[u8], public_key: &[u8], message_hash: B256) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DOMAIN);
    hasher.update(nonce_point);
    hasher.update(public_key);
    hasher.update(message_hash.as_slice());
    let digest: k256::FieldBytes = hasher.finalize();
    <Scalar as Reduce<CurveUint>>::reduce_bytes(&digest)
}

/// Signs a 32-byte message hash with a `t + 1` quorum.
pub async fn sign(
    material: &CurveMaterial,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    let quorum = material.t as usize + 1;
    let indices: Vec<u16> = material.shares[..quorum].iter().map(|s| s.index).collect();
    let public_key = material.public_key.clone();

    let channels = network::build(quorum);
    let mut join = JoinSet::new();
    for channel in channels {
        let share = material.shares[channel.index];
        let indices = indices.clone();
        let public_key = public_key.clone();
        join.spawn(sign_party(channel, share, indices, public_key, message_hash));
    }

    let mut signature: Option<Vec<u8>> = None;
    while let Some(joined) = join.join_next().await {
        let sig = joined.map_err(|e| ThresholdError::protocol(e.to_string()))??;
        match &signature {
            Some(existing) if *existing != sig => {
                return Err(ThresholdError::protocol("signature mismatch across parties"));
            }
            Some(_) => {}
            None => signature = Some(sig),
        }
    }
    signature.ok_or(ThresholdError::protocol("no parties joined"))
}

async fn sign_party(
    mut channel: network::PartyChannel,
    share: shamir::Share,
    indices: Vec<u16>,
    public_key: Vec<u8>,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    // round 1: nonce commitments
    let k_i = Scalar::random(&mut OsRng);
    let commitment = ProjectivePoint::GENERATOR * k_i;
    channel.broadcast(1, compress_point(&commitment)).await?;

    let mut nonce_point = commitment;
    for envelope in channel.gather(1).await? {
        nonce_point += decompress_point(&envelope.payload)?;
    }
    let nonce_bytes = compress_point(&nonce_point);
    let e = challenge(&nonce_bytes, &public_key, message_hash);

    // round 2: Lagrange-weighted partial signatures
    let lambda = shamir::lagrange_at_zero(share.index, &indices);
    let z_i = k_i + e * lambda * share.value;
    channel.broadcast(2, z_i.to_bytes().to_vec()).await?;

    let mut z = z_i;
    for envelope in channel.gather(2).await? {
        z += parse_scalar(&envelope.payload)?;
    }

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&z.to_bytes());
    Ok(out)
}

/// Proactive refresh.
pub fn refresh(material: &mut CurveMaterial) -> Result<(), ThresholdError> {
    let delta = shamir::zero_delta(material.t, material.n, &mut OsRng);
    for (share, d) in material.shares.iter_mut().zip(&delta) {
        share.value += d.value;
    }
    Ok(())
}

/// Re-deals to a new committee.
pub fn reshare(
    material: &CurveMaterial,
    new_t: u16,
    new_n: u16,
) -> Result<CurveMaterial, ThresholdError> {
    super::lss::reshare(material, new_t, new_n)
}

/// Schnorr check `z·G == R + e·P`. This is the adapter-internal path;
/// there is no byte-form verifier elsewhere.
pub fn verify(
    public_key: &[u8],
    message_hash: B256,
    signature: &[u8],
) -> Result<bool, ThresholdError> {
    if signature.len() != 65 {
        return Err(ThresholdError::Malformed("signature"));
    }
    let group = decompress_point(public_key)?;
    let Ok(nonce_point) = decompress_point(&signature[..33]) else {
        return Ok(false);
    };
    let Ok(z) = parse_scalar(&signature[33..]) else {
        return Ok(false);
    };
    let e = challenge(&signature[..33], public_key, message_hash);
    Ok(ProjectivePoint::GENERATOR * z == nonce_point + group * e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[tokio::test]
    async fn keygen_sign_verify() {
        let KeyMaterial::Schnorr(material) = keygen(2, 4).await.unwrap() else {
            unreachable!()
        };
        let hash = keccak256(b"frost message");
        let signature = sign(&material, hash).await.unwrap();
        assert_eq!(signature.len(), 65);
        assert!(verify(&material.public_key, hash, &signature).unwrap());
        assert!(!verify(&material.public_key, keccak256(b"not it"), &signature).unwrap());
    }

    #[tokio::test]
    async fn tampered_nonce_or_response_fails() {
        let KeyMaterial::Schnorr(material) = keygen(1, 3).await.unwrap() else {
            unreachable!()
        };
        let hash = keccak256(b"tamper");
        let signature = sign(&material, hash).await.unwrap();

        let mut bad = signature.clone();
        bad[40] ^= 0x01;
        assert!(!verify(&material.public_key, hash, &bad).unwrap());
    }
}
