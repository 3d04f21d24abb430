//! Ringtail lattice threshold signing.
//!
//! Shares are additive over the scheme's secret and noise vectors. Keygen
//! sums per-party commitments into the group commitment; signing runs two
//! rounds (nonce commitments `w_i`, then responses `z_i`) and any party
//! can assemble the final signature, since the rounding residual is a
//! function of public values only.
use super::{KeyMaterial, LatticeMaterial};
use crate::{error::ThresholdError, network};
use alloy_primitives::B256;
use pars_precompile::ringtail::ring::{Poly, POLY_BYTES, Q};
use pars_precompile::ringtail::scheme::{
    self, GroupPublicKey, SecretShare, COMMIT_RANK, RESPONSE_RANK,
};
use rand::{rngs::OsRng, RngCore};
use tokio::task::JoinSet;

fn polys_to_bytes(polys: &[Poly]) -> Vec<u8> {
    let mut out = Vec::with_capacity(polys.len() * POLY_BYTES);
    for poly in polys {
        out.extend_from_slice(&poly.to_bytes());
    }
    out
}

fn polys_from_bytes(data: &[u8], count: usize) -> Result<Vec<Poly>, ThresholdError> {
    if data.len() != count * POLY_BYTES {
        return Err(ThresholdError::Malformed("polynomial vector"));
    }
    data.chunks_exact(POLY_BYTES)
        .map(|chunk| Poly::from_bytes(chunk, Q).ok_or(ThresholdError::Malformed("coefficient")))
        .collect()
}

fn sum_vectors(acc: &mut [Poly], parts: &[Poly]) {
    for (a, p) in acc.iter_mut().zip(parts) {
        *a = a.add(p);
    }
}

/// Distributed keygen: a shared matrix seed, per-party additive shares,
/// commitment contributions summed into the group key.
pub async fn keygen(t: u16, n: u16) -> Result<KeyMaterial, ThresholdError> {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let a = scheme::expand_a(&seed);

    let channels = network::build(n as usize);
    let mut join = JoinSet::new();
    for mut channel in channels {
        let a = a.clone();
        join.spawn(async move {
            let share = SecretShare::random(&mut OsRng);
            let contribution = share.commitment(&a);
            channel.broadcast(1, polys_to_bytes(&contribution)).await?;

            let mut b = contribution;
            for envelope in channel.gather(1).await? {
                sum_vectors(&mut b, &polys_from_bytes(&envelope.payload, COMMIT_RANK)?);
            }
            Ok::<_, ThresholdError>((channel.index, share, polys_to_bytes(&b)))
        });
    }

    let mut shares = vec![None; n as usize];
    let mut b_bytes: Option<Vec<u8>> = None;
    while let Some(joined) = join.join_next().await {
        let (index, share, b) =
            joined.map_err(|e| ThresholdError::protocol(e.to_string()))??;
        match &b_bytes {
            Some(existing) if *existing != b => {
                return Err(ThresholdError::protocol("commitment mismatch across parties"));
            }
            Some(_) => {}
            None => b_bytes = Some(b),
        }
        shares[index] = Some(share);
    }

    let b = polys_from_bytes(
        &b_bytes.ok_or(ThresholdError::protocol("no parties joined"))?,
        COMMIT_RANK,
    )?;
    let shares = shares
        .into_iter()
        .map(|s| s.ok_or(ThresholdError::protocol("missing party share")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(KeyMaterial::Lattice(LatticeMaterial {
        t,
        n,
        shares,
        group: GroupPublicKey { seed, b },
    }))
}

/// Signs the lowercase-hex rendering of a 32-byte message hash, matching
/// the verifier precompile's transcript.
pub async fn sign(
    material: &LatticeMaterial,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    let message = hex::encode(message_hash).into_bytes();
    let a = scheme::expand_a(&material.group.seed);
    let a_bytes = scheme::serialize_matrix(&a);
    let b_bytes = polys_to_bytes(&material.group.b);

    let channels = network::build(material.n as usize);
    let mut join = JoinSet::new();
    for channel in channels {
        let share = material.shares[channel.index].clone();
        let a = a.clone();
        let a_bytes = a_bytes.clone();
        let b_bytes = b_bytes.clone();
        let b = material.group.b.clone();
        let message = message.clone();
        join.spawn(sign_party(channel, share, a, a_bytes, b_bytes, b, message));
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

#[allow(clippy::too_many_arguments)]
async fn sign_party(
    mut channel: network::PartyChannel,
    share: SecretShare,
    a: Vec<Vec<Poly>>,
    a_bytes: Vec<u8>,
    b_bytes: Vec<u8>,
    b: Vec<Poly>,
    message: Vec<u8>,
) -> Result<Vec<u8>, ThresholdError> {
    // round 1: nonce commitments w_i = A·r_i
    let r: Vec<Poly> = (0..RESPONSE_RANK)
        .map(|_| scheme::sample_small(&mut OsRng))
        .collect();
    let w_i = scheme::mat_vec_mul(&a, &r);
    channel.broadcast(1, polys_to_bytes(&w_i)).await?;

    let mut w = w_i;
    for envelope in channel.gather(1).await? {
        sum_vectors(&mut w, &polys_from_bytes(&envelope.payload, COMMIT_RANK)?);
    }
    let w_bytes = polys_to_bytes(&w);
    let c = scheme::challenge_poly(&a_bytes, &b_bytes, &w_bytes, &message);

    // round 2: responses z_i = r_i + c·s_i
    let z_i: Vec<Poly> = r
        .iter()
        .zip(&share.s)
        .map(|(r_j, s_j)| r_j.add(&c.mul(s_j)))
        .collect();
    channel.broadcast(2, polys_to_bytes(&z_i)).await?;

    let mut z = z_i;
    for envelope in channel.gather(2).await? {
        sum_vectors(&mut z, &polys_from_bytes(&envelope.payload, RESPONSE_RANK)?);
    }

    // Δ = w - (A·z - c·b), computable from public values
    let az = scheme::mat_vec_mul(&a, &z);
    let delta: Vec<Poly> = w
        .iter()
        .zip(az.iter().zip(&b))
        .map(|(w_row, (az_row, b_row))| w_row.sub(&az_row.sub(&c.mul(b_row))))
        .collect();

    Ok(scheme::serialize_signature(&c, &z, &delta, &a, &b))
}

/// Proactive refresh: zero-sum masks re-randomize the additive shares.
pub fn refresh(material: &mut LatticeMaterial) -> Result<(), ThresholdError> {
    let masks: Vec<SecretShare> = (0..material.shares.len() - 1)
        .map(|_| SecretShare::random(&mut OsRng))
        .collect();

    // the last party absorbs the negated sum, keeping the group secret
    let mut negated = SecretShare {
        s: vec![Poly::zero(); RESPONSE_RANK],
        e: vec![Poly::zero(); COMMIT_RANK],
    };
    for mask in &masks {
        for (acc, m) in negated.s.iter_mut().zip(&mask.s) {
            *acc = acc.sub(m);
        }
        for (acc, m) in negated.e.iter_mut().zip(&mask.e) {
            *acc = acc.sub(m);
        }
    }

    let last = material.shares.len() - 1;
    for (index, share) in material.shares.iter_mut().enumerate() {
        let mask = if index == last { &negated } else { &masks[index] };
        share.aggregate(mask);
    }
    Ok(())
}

/// Re-deals the aggregated secret additively to a new committee.
pub fn reshare(
    material: &LatticeMaterial,
    new_t: u16,
    new_n: u16,
) -> Result<LatticeMaterial, ThresholdError> {
    let mut total = material.shares[0].clone();
    for share in &material.shares[1..] {
        total.aggregate(share);
    }

    let mut shares: Vec<SecretShare> = (0..new_n as usize - 1)
        .map(|_| SecretShare::random(&mut OsRng))
        .collect();
    let mut last = total;
    for share in &shares {
        for (acc, s) in last.s.iter_mut().zip(&share.s) {
            *acc = acc.sub(s);
        }
        for (acc, e) in last.e.iter_mut().zip(&share.e) {
            *acc = acc.sub(e);
        }
    }
    shares.push(last);

    Ok(LatticeMaterial {
        t: new_t,
        n: new_n,
        shares,
        group: material.group.clone(),
    })
}

/// Verifies through the scheme against the serialized group key.
pub fn verify(
    public_key: &[u8],
    message_hash: B256,
    signature: &[u8],
) -> Result<bool, ThresholdError> {
    let group = GroupPublicKey::from_bytes(public_key)
        .ok_or(ThresholdError::Malformed("group key"))?;
    let message = hex::encode(message_hash).into_bytes();
    Ok(scheme::verify_with_group_key(&group, &message, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[tokio::test]
    async fn threshold_sign_verifies_through_the_scheme() {
        let KeyMaterial::Lattice(material) = keygen(2, 3).await.unwrap() else {
            unreachable!()
        };
        let hash = keccak256(b"ringtail message");
        let signature = sign(&material, hash).await.unwrap();
        assert!(verify(&material.group.to_bytes(), hash, &signature).unwrap());
        assert!(!verify(&material.group.to_bytes(), keccak256(b"wrong"), &signature).unwrap());
    }

    #[tokio::test]
    async fn refresh_and_reshare_keep_the_group_key() {
        let KeyMaterial::Lattice(mut material) = keygen(1, 3).await.unwrap() else {
            unreachable!()
        };
        refresh(&mut material).unwrap();
        let hash = keccak256(b"after refresh");
        let signature = sign(&material, hash).await.unwrap();
        assert!(verify(&material.group.to_bytes(), hash, &signature).unwrap());

        let wider = reshare(&material, 2, 5).unwrap();
        assert_eq!(wider.group, material.group);
        let signature = sign(&wider, hash).await.unwrap();
        assert!(verify(&wider.group.to_bytes(), hash, &signature).unwrap());
    }
}
