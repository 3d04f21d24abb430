//! Per-protocol MPC handlers.
//!
//! Protocol polymorphism is a tagged enum plus a handler table: each
//! protocol implements keygen, sign, refresh and reshare, and the
//! dispatchers below fork on [`Protocol`]. Adding a protocol means adding
//! the four handlers and extending the compatibility matrix in `types`.
use crate::{
    error::ThresholdError,
    network::{self, PartyChannel},
    shamir::{self, Share},
    types::Protocol,
};
use alloy_primitives::B256;
use k256::{
    elliptic_curve::{
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
};
use pars_precompile::ringtail::scheme;
use rand::rngs::OsRng;
use tokio::task::JoinSet;

pub mod cggmp21;
pub mod frost;
pub mod lss;
pub mod ringtail;

/// Secret material the adapter retains per key, so later signing and
/// refresh reuse state.
#[derive(Clone, Debug)]
pub enum KeyMaterial {
    /// Shamir shares of a secp256k1 scalar (LSS, CGGMP21).
    Ecdsa(CurveMaterial),
    /// Shamir shares behind a Schnorr group key (FROST).
    Schnorr(CurveMaterial),
    /// Additive lattice shares (Ringtail).
    Lattice(LatticeMaterial),
}

/// Shares plus group key over secp256k1.
#[derive(Clone, Debug)]
pub struct CurveMaterial {
    /// Threshold.
    pub t: u16,
    /// Party count.
    pub n: u16,
    /// All party shares; the adapter is every party at once.
    pub shares: Vec<Share>,
    /// Compressed SEC1 group public key.
    pub public_key: Vec<u8>,
}

/// Additive shares plus group key for the lattice scheme.
#[derive(Clone, Debug)]
pub struct LatticeMaterial {
    /// Threshold.
    pub t: u16,
    /// Party count.
    pub n: u16,
    /// Per-party additive shares.
    pub shares: Vec<scheme::SecretShare>,
    /// Group public key.
    pub group: scheme::GroupPublicKey,
}

impl KeyMaterial {
    /// Serialized group public key.
    pub fn public_key(&self) -> Vec<u8> {
        match self {
            Self::Ecdsa(m) | Self::Schnorr(m) => m.public_key.clone(),
            Self::Lattice(m) => m.group.to_bytes(),
        }
    }

    /// `(t, n)` the material was dealt for.
    pub fn shape(&self) -> (u16, u16) {
        match self {
            Self::Ecdsa(m) | Self::Schnorr(m) => (m.t, m.n),
            Self::Lattice(m) => (m.t, m.n),
        }
    }
}

/// Runs distributed key generation.
pub async fn keygen(
    protocol: Protocol,
    t: u16,
    n: u16,
) -> Result<KeyMaterial, ThresholdError> {
    match protocol {
        Protocol::Lss => lss::keygen(t, n).await,
        Protocol::Frost => frost::keygen(t, n).await,
        Protocol::Cggmp21 => cggmp21::keygen(t, n).await,
        Protocol::Ringtail => ringtail::keygen(t, n).await,
    }
}

/// Produces a signature over a 32-byte message hash.
pub async fn sign(
    protocol: Protocol,
    material: &KeyMaterial,
    message_hash: B256,
) -> Result<Vec<u8>, ThresholdError> {
    match (protocol, material) {
        (Protocol::Lss, KeyMaterial::Ecdsa(m)) => lss::sign(m, message_hash),
        (Protocol::Cggmp21, KeyMaterial::Ecdsa(m)) => cggmp21::sign(m, message_hash).await,
        (Protocol::Frost, KeyMaterial::Schnorr(m)) => frost::sign(m, message_hash).await,
        (Protocol::Ringtail, KeyMaterial::Lattice(m)) => ringtail::sign(m, message_hash).await,
        _ => Err(ThresholdError::InvalidProtocol),
    }
}

/// Proactively re-randomizes shares, leaving the group key fixed.
pub fn refresh(protocol: Protocol, material: &mut KeyMaterial) -> Result<(), ThresholdError> {
    match (protocol, material) {
        (Protocol::Lss, KeyMaterial::Ecdsa(m)) => lss::refresh(m),
        (Protocol::Cggmp21, KeyMaterial::Ecdsa(m)) => cggmp21::refresh(m),
        (Protocol::Frost, KeyMaterial::Schnorr(m)) => frost::refresh(m),
        (Protocol::Ringtail, KeyMaterial::Lattice(m)) => ringtail::refresh(m),
        _ => Err(ThresholdError::InvalidProtocol),
    }
}

/// Re-deals the key to a new `(t, n)` committee.
pub fn reshare(
    protocol: Protocol,
    material: &KeyMaterial,
    new_t: u16,
    new_n: u16,
) -> Result<KeyMaterial, ThresholdError> {
    match (protocol, material) {
        (Protocol::Lss, KeyMaterial::Ecdsa(m)) => {
            lss::reshare(m, new_t, new_n).map(KeyMaterial::Ecdsa)
        }
        (Protocol::Cggmp21, KeyMaterial::Ecdsa(m)) => {
            cggmp21::reshare(m, new_t, new_n).map(KeyMaterial::Ecdsa)
        }
        (Protocol::Frost, KeyMaterial::Schnorr(m)) => {
            frost::reshare(m, new_t, new_n).map(KeyMaterial::Schnorr)
        }
        (Protocol::Ringtail, KeyMaterial::Lattice(m)) => {
            ringtail::reshare(m, new_t, new_n).map(KeyMaterial::Lattice)
        }
        _ => Err(ThresholdError::InvalidProtocol),
    }
}

/// Verifies a signature against a serialized group public key.
pub fn verify_signature(
    protocol: Protocol,
    public_key: &[u8],
    message_hash: B256,
    signature: &[u8],
) -> Result<bool, ThresholdError> {
    match protocol {
        Protocol::Lss | Protocol::Cggmp21 => {
            lss::verify(public_key, message_hash, signature)
        }
        Protocol::Frost => frost::verify(public_key, message_hash, signature),
        Protocol::Ringtail => ringtail::verify(public_key, message_hash, signature),
    }
}

pub(crate) fn compress_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

pub(crate) fn decompress_point(bytes: &[u8]) -> Result<ProjectivePoint, ThresholdError> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|_| ThresholdError::Malformed("point"))?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    affine
        .map(ProjectivePoint::from)
        .ok_or(ThresholdError::Malformed("point"))
}

pub(crate) fn parse_scalar(bytes: &[u8]) -> Result<Scalar, ThresholdError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ThresholdError::Malformed("scalar"))?;
    Option::<Scalar>::from(Scalar::from_repr(arr.into()))
        .ok_or(ThresholdError::Malformed("scalar"))
}

/// Pedersen-style DKG over secp256k1, shared by the curve protocols: each
/// party deals a contribution polynomial, routes shares point-to-point,
/// and the group key is the sum of the constant-term commitments.
pub(crate) async fn run_curve_dkg(
    t: u16,
    n: u16,
) -> Result<CurveMaterial, ThresholdError> {
    let channels = network::build(n as usize);
    let mut join = JoinSet::new();
    for channel in channels {
        join.spawn(curve_dkg_party(channel, t, n));
    }

    let mut shares = vec![None; n as usize];
    let mut public_key: Option<Vec<u8>> = None;
    while let Some(joined) = join.join_next().await {
        let (index, share, pk) =
            joined.map_err(|e| ThresholdError::protocol(e.to_string()))??;
        if let Some(existing) = &public_key {
            if *existing != pk {
                return Err(ThresholdError::protocol("group key mismatch across parties"));
            }
        } else {
            public_key = Some(pk);
        }
        shares[index] = Some(share);
    }

    let shares: Vec<Share> = shares
        .into_iter()
        .map(|s| s.ok_or(ThresholdError::protocol("missing party share")))
        .collect::<Result<_, _>>()?;
    Ok(CurveMaterial {
        t,
        n,
        shares,
        public_key: public_key.ok_or(ThresholdError::protocol("no parties joined"))?,
    })
}

async fn curve_dkg_party(
    mut channel: PartyChannel,
    t: u16,
    n: u16,
) -> Result<(usize, Share, Vec<u8>), ThresholdError> {
    let index = channel.index;
    let contribution = Scalar::random(&mut OsRng);
    let dealt = shamir::split(&contribution, t, n, &mut OsRng);
    let commitment = ProjectivePoint::GENERATOR * contribution;

    channel.broadcast(1, compress_point(&commitment)).await?;
    for share in &dealt {
        let receiver = share.index as usize - 1;
        if receiver != index {
            channel
                .send_to(receiver, 2, share.value.to_bytes().to_vec())
                .await?;
        }
    }

    let commitments = channel.gather(1).await?;
    let incoming = channel.gather(2).await?;

    let mut group = commitment;
    for envelope in &commitments {
        group += decompress_point(&envelope.payload)?;
    }
    let mut value = dealt[index].value;
    for envelope in &incoming {
        value += parse_scalar(&envelope.payload)?;
    }

    Ok((
        index,
        Share {
            index: index as u16 + 1,
            value,
        },
        compress_point(&group),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn curve_dkg_shares_open_to_the_group_key() {
        let material = run_curve_dkg(2, 4).await.unwrap();
        assert_eq!(material.shares.len(), 4);
        let secret = shamir::reconstruct(&material.shares[0..3]).unwrap();
        let expected = compress_point(&(ProjectivePoint::GENERATOR * secret));
        assert_eq!(material.public_key, expected);
    }
}
