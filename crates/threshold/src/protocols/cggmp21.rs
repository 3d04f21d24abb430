//! CGGMP21-style ECDSA.
//!
//! Keygen runs the shared curve DKG. Signing simulates the protocol's
//! presigning round: quorum parties contribute additive nonce shares and
//! broadcast their commitments, the nonce point is the commitment sum, and
//! the coordinator finishes the signature from the aggregated scalars.
//! Output is 65-byte `r ‖ s ‖ v` with a normalized low `s`.
use super::{compress_point, decompress_point, CurveMaterial, KeyMaterial};
use crate::{error::ThresholdError, network, shamir};
use alloy_primitives::B256;
use k256::{
    elliptic_curve::{ops::Reduce, point::AffineCoordinates, scalar::IsHigh, Field},
    ProjectivePoint, Scalar, U256 as CurveUint,
};
use rand::rngs::OsRng;
use tokio::task::JoinSet;

/// Distributed key generation.
pub async fn keygen(t: u16, n: u16) -> Result<KeyMaterial, ThresholdError> {
    super::run_curve_dkg(t, n).await.map(KeyMaterial::Ecdsa)
}

/// Signs a 32-byte prehash through the presigning simulation.
pub async fn sign(
    material: &CurveMaterial,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    let quorum = material.t as usize + 1;
    let channels = network::build(quorum);
    let mut join = JoinSet::new();
    for channel in channels {
        let share = material.shares[channel.index];
        join.spawn(presign_party(channel, share));
    }

    let mut nonce_point: Option<ProjectivePoint> = None;
    let mut nonce = Scalar::ZERO;
    let mut secret_parts: Vec<shamir::Share> = Vec::with_capacity(quorum);
    while let Some(joined) = join.join_next().await {
        let (point, k_i, share) =
            joined.map_err(|e| ThresholdError::protocol(e.to_string()))??;
        match &nonce_point {
            Some(existing) if *existing != point => {
                return Err(ThresholdError::protocol("nonce commitment mismatch"));
            }
            Some(_) => {}
            None => nonce_point = Some(point),
        }
        nonce += k_i;
        secret_parts.push(share);
    }
    let nonce_point = nonce_point.ok_or(ThresholdError::protocol("no parties joined"))?;
    debug_assert_eq!(ProjectivePoint::GENERATOR * nonce, nonce_point);

    let secret = shamir::reconstruct(&secret_parts)?;
    finish_signature(&nonce, &nonce_point, &secret, message_hash)
}

async fn presign_party(
    mut channel: network::PartyChannel,
    share: shamir::Share,
) -> Result<(ProjectivePoint, Scalar, shamir::Share), ThresholdError> {
    let k_i = Scalar::random(&mut OsRng);
    let commitment = ProjectivePoint::GENERATOR * k_i;
    channel.broadcast(1, compress_point(&commitment)).await?;

    let mut aggregate = commitment;
    for envelope in channel.gather(1).await? {
        aggregate += decompress_point(&envelope.payload)?;
    }
    Ok((aggregate, k_i, share))
}

fn finish_signature(
    nonce: &Scalar,
    nonce_point: &ProjectivePoint,
    secret: &Scalar,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    let affine = nonce_point.to_affine();
    let r = <Scalar as Reduce<CurveUint>>::reduce_bytes(&affine.x());
    if r.is_zero().into() {
        return Err(ThresholdError::protocol("degenerate nonce"));
    }
    let z = <Scalar as Reduce<CurveUint>>::reduce_bytes(&message_hash.0.into());
    let k_inv = Option::<Scalar>::from(nonce.invert())
        .ok_or(ThresholdError::protocol("degenerate nonce"))?;
    let mut s = k_inv * (z + r * secret);
    if s.is_zero().into() {
        return Err(ThresholdError::protocol("degenerate signature"));
    }

    let mut v = affine.y_is_odd().unwrap_u8();
    if s.is_high().into() {
        s = -s;
        v ^= 1;
    }

    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&r.to_bytes());
    out.extend_from_slice(&s.to_bytes());
    out.push(v + super::lss::V_OFFSET);
    Ok(out)
}

/// Proactive refresh, identical share algebra to the other curve
/// protocols.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::lss;
    use alloy_primitives::keccak256;

    fn quick_scalar_parse(bytes: &[u8]) -> Scalar {
        crate::protocols::parse_scalar(bytes).unwrap()
    }

    #[tokio::test]
    async fn presigned_signature_verifies_and_recovers() {
        let KeyMaterial::Ecdsa(material) = keygen(2, 4).await.unwrap() else {
            unreachable!()
        };
        let hash = keccak256(b"cggmp21 message");
        let signature = sign(&material, hash).await.unwrap();
        assert_eq!(signature.len(), 65);
        assert!(lss::verify(&material.public_key, hash, &signature).unwrap());

        // s is normalized low
        let s = quick_scalar_parse(&signature[32..64]);
        assert!(!bool::from(s.is_high()));
    }

    #[tokio::test]
    async fn two_signatures_share_no_nonce() {
        let KeyMaterial::Ecdsa(material) = keygen(1, 3).await.unwrap() else {
            unreachable!()
        };
        let hash = keccak256(b"same message");
        let first = sign(&material, hash).await.unwrap();
        let second = sign(&material, hash).await.unwrap();
        assert_ne!(first[..32], second[..32]);
    }
}
