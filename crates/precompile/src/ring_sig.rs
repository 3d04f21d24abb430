//! Linkable ring signatures (LSAG) over secp256k1.
//!
//! A signature hides the signer among a ring of public keys while exposing a
//! deterministic key image `I = x · H(x·G)`: two signatures by the same
//! private key share the image, which is what the double-spend linkage in
//! the callers keys on.
//!
//! Wire format: `[op:u8, scheme:u8, ringSize:u8, …]`, ops 0x01 = sign,
//! 0x02 = verify, 0x04 = computeKeyImage; scheme 0x01 = LSAG/secp256k1,
//! everything else reserved. A signature serializes as
//! `I:33 ‖ c_0..c_{n-1}:32·n ‖ s_0..s_{n-1}:32·n`.
use crate::{
    gas::ring_sig as gas,
    interface::{PrecompileError, PrecompileOutput, PrecompileResult, PrecompileWithAddress},
    prefix_address,
};
use alloy_primitives::{Address, Bytes};
use k256::{
    elliptic_curve::{
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, U256 as CurveUint,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Ring-signature precompile address (`0x9202`, right-padded).
pub const ADDRESS: Address = prefix_address(0x9202);

/// Sign op byte.
pub const OP_SIGN: u8 = 0x01;
/// Verify op byte.
pub const OP_VERIFY: u8 = 0x02;
/// computeKeyImage op byte.
pub const OP_KEY_IMAGE: u8 = 0x04;

/// LSAG over secp256k1, the only live scheme byte.
pub const SCHEME_LSAG_SECP256K1: u8 = 0x01;

/// Compressed-point length.
pub const POINT_LEN: usize = 33;
/// Scalar length.
pub const SCALAR_LEN: usize = 32;

/// Ring-signature precompile.
pub const RING_SIG: PrecompileWithAddress = PrecompileWithAddress(ADDRESS, ring_sig_run);

/// A parsed LSAG signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingSignature {
    /// Compressed key image.
    pub key_image: [u8; POINT_LEN],
    /// Ring challenges.
    pub c: Vec<Scalar>,
    /// Ring responses.
    pub s: Vec<Scalar>,
}

impl RingSignature {
    /// Serialized length for ring size `n`.
    pub const fn serialized_len(n: usize) -> usize {
        POINT_LEN + 2 * SCALAR_LEN * n
    }

    /// Serializes as `I ‖ c_i ‖ s_i`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::serialized_len(self.c.len()));
        out.extend_from_slice(&self.key_image);
        for c in &self.c {
            out.extend_from_slice(&c.to_bytes());
        }
        for s in &self.s {
            out.extend_from_slice(&s.to_bytes());
        }
        out
    }

    /// Parses a signature for ring size `n`. Scalars must be canonical
    /// (below the curve order).
    pub fn deserialize(data: &[u8], n: usize) -> Option<Self> {
        if data.len() != Self::serialized_len(n) {
            return None;
        }
        let key_image: [u8; POINT_LEN] = data[..POINT_LEN].try_into().ok()?;
        let mut c = Vec::with_capacity(n);
        let mut s = Vec::with_capacity(n);
        for i in 0..n {
            let at = POINT_LEN + i * SCALAR_LEN;
            c.push(parse_scalar(&data[at..at + SCALAR_LEN])?);
        }
        for i in 0..n {
            let at = POINT_LEN + (n + i) * SCALAR_LEN;
            s.push(parse_scalar(&data[at..at + SCALAR_LEN])?);
        }
        Some(Self { key_image, c, s })
    }
}

fn parse_scalar(bytes: &[u8]) -> Option<Scalar> {
    let arr: [u8; SCALAR_LEN] = bytes.try_into().ok()?;
    Scalar::from_repr(arr.into()).into()
}

fn compress(point: &ProjectivePoint) -> Option<[u8; POINT_LEN]> {
    let encoded = point.to_affine().to_encoded_point(true);
    encoded.as_bytes().try_into().ok()
}

fn decompress(bytes: &[u8]) -> Option<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes).ok()?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    Some(ProjectivePoint::from(affine?))
}

/// sha256 reduced into the scalar field.
fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest: k256::FieldBytes = hasher.finalize();
    <Scalar as Reduce<CurveUint>>::reduce_bytes(&digest)
}

/// Hash-to-curve mapping `H(P) = sha256(P) · G`.
fn hash_to_point(compressed: &[u8; POINT_LEN]) -> ProjectivePoint {
    ProjectivePoint::GENERATOR * hash_to_scalar(&[compressed])
}

/// Ring challenge `Hash(m, L, R)`.
fn challenge(message: &[u8], l: &ProjectivePoint, r: &ProjectivePoint) -> Option<Scalar> {
    Some(hash_to_scalar(&[message, &compress(l)?, &compress(r)?]))
}

/// Key image `I = x · H(x·G)`, compressed.
pub fn compute_key_image(private_key: &Scalar) -> Result<[u8; POINT_LEN], PrecompileError> {
    let public = ProjectivePoint::GENERATOR * private_key;
    let base = hash_to_point(&compress(&public).ok_or(PrecompileError::InvalidCurvePoint)?);
    compress(&(base * private_key)).ok_or(PrecompileError::InvalidCurvePoint)
}

/// Produces an LSAG signature by the ring member at `signer_index`.
pub fn sign(
    ring: &[[u8; POINT_LEN]],
    private_key: &Scalar,
    signer_index: usize,
    message: &[u8],
) -> Result<RingSignature, PrecompileError> {
    let n = ring.len();
    if n < 2 {
        return Err(PrecompileError::InvalidRingSize);
    }
    if signer_index >= n {
        return Err(PrecompileError::InvalidSignerIndex);
    }

    let points: Vec<ProjectivePoint> = ring
        .iter()
        .map(|p| decompress(p).ok_or(PrecompileError::InvalidCurvePoint))
        .collect::<Result<_, _>>()?;

    let public = ProjectivePoint::GENERATOR * private_key;
    if points[signer_index] != public {
        return Err(PrecompileError::other("ring member does not match signing key"));
    }

    let image_base = hash_to_point(&ring[signer_index]);
    let key_image_point = image_base * private_key;
    let key_image = compress(&key_image_point).ok_or(PrecompileError::InvalidCurvePoint)?;

    let mut c = vec![Scalar::ZERO; n];
    let mut s = vec![Scalar::ZERO; n];

    // close the commitment at the signer, then walk the ring
    let alpha = Scalar::random(&mut OsRng);
    let l = ProjectivePoint::GENERATOR * alpha;
    let r = image_base * alpha;
    c[(signer_index + 1) % n] =
        challenge(message, &l, &r).ok_or(PrecompileError::InvalidCurvePoint)?;

    for step in 1..n {
        let i = (signer_index + step) % n;
        s[i] = Scalar::random(&mut OsRng);
        let l_i = ProjectivePoint::GENERATOR * s[i] + points[i] * c[i];
        let r_i = hash_to_point(&ring[i]) * s[i] + key_image_point * c[i];
        c[(i + 1) % n] =
            challenge(message, &l_i, &r_i).ok_or(PrecompileError::InvalidCurvePoint)?;
    }

    s[signer_index] = alpha - c[signer_index] * private_key;

    Ok(RingSignature { key_image, c, s })
}

/// Verifies an LSAG signature. Returns `false` on any challenge mismatch,
/// parse failure or off-curve point; the ring must close.
pub fn verify(ring: &[[u8; POINT_LEN]], message: &[u8], signature: &RingSignature) -> bool {
    let n = ring.len();
    if n < 2 || signature.c.len() != n || signature.s.len() != n {
        return false;
    }
    let Some(key_image_point) = decompress(&signature.key_image) else {
        return false;
    };
    let mut points = Vec::with_capacity(n);
    for member in ring {
        let Some(point) = decompress(member) else {
            return false;
        };
        points.push(point);
    }

    // every link of the chain has to recompute, including the wrap to c_0
    for i in 0..n {
        let l_i = ProjectivePoint::GENERATOR * signature.s[i] + points[i] * signature.c[i];
        let r_i = hash_to_point(&ring[i]) * signature.s[i] + key_image_point * signature.c[i];
        let Some(expected) = challenge(message, &l_i, &r_i) else {
            return false;
        };
        if signature.c[(i + 1) % n] != expected {
            return false;
        }
    }
    true
}

/// Gas for the ring-signature precompile, pure in the input. An invalid
/// scheme byte prices at zero so the host refuses the call before charging.
pub fn required_gas(input: &[u8]) -> u64 {
    if input.len() < 3 || input[1] != SCHEME_LSAG_SECP256K1 {
        return 0;
    }
    let n = input[2] as u64;
    match input[0] {
        OP_SIGN => {
            let msg_len = message_len_for_sign(input).unwrap_or(0) as u64;
            gas::SIGN_BASE + n * gas::SIGN_PER_MEMBER + msg_len * gas::SIGN_PER_BYTE
        }
        OP_VERIFY => gas::VERIFY_BASE + n * gas::VERIFY_PER_MEMBER,
        OP_KEY_IMAGE => gas::COMPUTE_KEY_IMAGE,
        _ => 0,
    }
}

fn message_len_for_sign(input: &[u8]) -> Option<usize> {
    let n = input[2] as usize;
    let fixed = 3 + n * POINT_LEN + SCALAR_LEN + 1;
    input.len().checked_sub(fixed)
}

/// Runs the ring-signature precompile.
///
/// Layouts after the `[op, scheme, ringSize]` header:
/// - sign: `ring:33·n ‖ x:32 ‖ signerIndex:u8 ‖ message:*`
/// - verify: `ring:33·n ‖ signature:(33+64·n) ‖ message:*`
/// - computeKeyImage: ringSize is zero and the payload is `x:32`
pub fn ring_sig_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if input.len() < 3 {
        return Err(PrecompileError::InvalidInputLength);
    }
    if input[1] != SCHEME_LSAG_SECP256K1 {
        return Err(PrecompileError::UnknownSelector);
    }
    let cost = required_gas(input);
    if cost == 0 {
        return Err(PrecompileError::UnknownSelector);
    }
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    let op = input[0];
    let n = input[2] as usize;
    let payload = &input[3..];

    let bytes: Bytes = match op {
        OP_SIGN => {
            let ring = parse_ring(payload, n)?;
            let rest = &payload[n * POINT_LEN..];
            if rest.len() < SCALAR_LEN + 1 {
                return Err(PrecompileError::InvalidInputLength);
            }
            let private_key = parse_scalar(&rest[..SCALAR_LEN])
                .ok_or(PrecompileError::InvalidInputLength)?;
            let signer_index = rest[SCALAR_LEN] as usize;
            let message = &rest[SCALAR_LEN + 1..];
            sign(&ring, &private_key, signer_index, message)?
                .serialize()
                .into()
        }
        OP_VERIFY => {
            let ring = parse_ring(payload, n)?;
            let rest = &payload[n * POINT_LEN..];
            let sig_len = RingSignature::serialized_len(n);
            if rest.len() < sig_len {
                return Err(PrecompileError::InvalidInputLength);
            }
            let (sig_bytes, message) = rest.split_at(sig_len);
            let valid = RingSignature::deserialize(sig_bytes, n)
                .map(|sig| verify(&ring, message, &sig))
                .unwrap_or(false);
            Bytes::from(vec![valid as u8])
        }
        OP_KEY_IMAGE => {
            if n != 0 || payload.len() != SCALAR_LEN {
                return Err(PrecompileError::InvalidInputLength);
            }
            let private_key =
                parse_scalar(payload).ok_or(PrecompileError::InvalidInputLength)?;
            compute_key_image(&private_key)?.to_vec().into()
        }
        _ => return Err(PrecompileError::UnknownSelector),
    };

    Ok(PrecompileOutput::new(cost, bytes))
}

fn parse_ring(payload: &[u8], n: usize) -> Result<Vec<[u8; POINT_LEN]>, PrecompileError> {
    if n < 2 {
        return Err(PrecompileError::InvalidRingSize);
    }
    if payload.len() < n * POINT_LEN {
        return Err(PrecompileError::InvalidInputLength);
    }
    Ok(payload[..n * POINT_LEN]
        .chunks_exact(POINT_LEN)
        .map(|chunk| chunk.try_into().expect("chunk size fixed"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ring(size: usize) -> (Vec<Scalar>, Vec<[u8; POINT_LEN]>) {
        let keys: Vec<Scalar> = (0..size).map(|_| Scalar::random(&mut OsRng)).collect();
        let ring = keys
            .iter()
            .map(|x| compress(&(ProjectivePoint::GENERATOR * x)).unwrap())
            .collect();
        (keys, ring)
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (keys, ring) = test_ring(3);
        let sig = sign(&ring, &keys[1], 1, b"transfer 5").unwrap();
        assert!(verify(&ring, b"transfer 5", &sig));
        assert!(!verify(&ring, b"transfer 6", &sig));
    }

    #[test]
    fn same_signer_links_via_key_image() {
        let (keys, ring) = test_ring(3);
        let first = sign(&ring, &keys[1], 1, b"first message").unwrap();
        let second = sign(&ring, &keys[1], 1, b"second message").unwrap();
        assert_eq!(first.key_image, second.key_image);
        assert!(verify(&ring, b"first message", &first));
        assert!(verify(&ring, b"second message", &second));

        let other = sign(&ring, &keys[2], 2, b"first message").unwrap();
        assert_ne!(first.key_image, other.key_image);
    }

    #[test]
    fn key_image_is_deterministic() {
        let x = Scalar::random(&mut OsRng);
        assert_eq!(compute_key_image(&x).unwrap(), compute_key_image(&x).unwrap());
        let y = Scalar::random(&mut OsRng);
        assert_ne!(compute_key_image(&x).unwrap(), compute_key_image(&y).unwrap());
    }

    #[test]
    fn any_bit_flip_breaks_verification() {
        let (keys, ring) = test_ring(5);
        let sig = sign(&ring, &keys[2], 2, b"tamper target").unwrap();
        let blob = sig.serialize();

        // flip one bit in a challenge, a response and the key image
        for at in [0usize, POINT_LEN + 7, POINT_LEN + 5 * SCALAR_LEN + 19] {
            let mut tampered = blob.clone();
            tampered[at] ^= 0x40;
            let parsed = RingSignature::deserialize(&tampered, 5);
            let valid = parsed.map(|s| verify(&ring, b"tamper target", &s)).unwrap_or(false);
            assert!(!valid, "bit flip at {at} still verified");
        }
    }

    #[test]
    fn ring_and_index_bounds() {
        let (keys, ring) = test_ring(2);
        assert_eq!(
            sign(&ring[..1], &keys[0], 0, b"m").unwrap_err(),
            PrecompileError::InvalidRingSize
        );
        assert_eq!(
            sign(&ring, &keys[0], 2, b"m").unwrap_err(),
            PrecompileError::InvalidSignerIndex
        );
    }

    #[test]
    fn precompile_sign_then_verify() {
        let (keys, ring) = test_ring(3);
        let message = b"precompile flow";

        let mut input = vec![OP_SIGN, SCHEME_LSAG_SECP256K1, 3];
        for member in &ring {
            input.extend_from_slice(member);
        }
        input.extend_from_slice(&keys[1].to_bytes());
        input.push(1);
        input.extend_from_slice(message);

        let signed = ring_sig_run(&input, 10_000_000).unwrap();
        assert_eq!(signed.bytes.len(), RingSignature::serialized_len(3));

        let mut input = vec![OP_VERIFY, SCHEME_LSAG_SECP256K1, 3];
        for member in &ring {
            input.extend_from_slice(member);
        }
        input.extend_from_slice(&signed.bytes);
        input.extend_from_slice(message);

        let verified = ring_sig_run(&input, 10_000_000).unwrap();
        assert_eq!(verified.bytes.as_ref(), &[0x01]);
        assert_eq!(
            verified.gas_used,
            gas::VERIFY_BASE + 3 * gas::VERIFY_PER_MEMBER
        );
    }

    #[test]
    fn invalid_scheme_prices_at_zero() {
        let input = [OP_VERIFY, 0x02, 3];
        assert_eq!(required_gas(&input), 0);
        assert_eq!(
            ring_sig_run(&input, 1_000_000).unwrap_err(),
            PrecompileError::UnknownSelector
        );
    }

    #[test]
    fn verify_off_curve_member_returns_false_byte() {
        let (keys, ring) = test_ring(2);
        let sig = sign(&ring, &keys[0], 0, b"m").unwrap();

        let mut bad_ring = ring.clone();
        bad_ring[1] = [0xff; POINT_LEN];

        let mut input = vec![OP_VERIFY, SCHEME_LSAG_SECP256K1, 2];
        for member in &bad_ring {
            input.extend_from_slice(member);
        }
        input.extend_from_slice(&sig.serialize());
        input.extend_from_slice(b"m");

        let out = ring_sig_run(&input, 10_000_000).unwrap();
        assert_eq!(out.bytes.as_ref(), &[0x00]);
    }
}
