//! Reference Ringtail scheme: the lattice primitive behind the verifier
//! precompile and the threshold signing protocol.
//!
//! The scheme is Fiat-Shamir over module lattices. A group key is a seed
//! (expanding to the public matrix `A`) plus a commitment `b = A·s + e`.
//! A signature on a message is `(c, z, Δ)` with `z = r + c·s` and
//! `Δ = w - (A·z - c·b)` for the nonce commitment `w = A·r`; the verifier
//! recomputes `w' = A·z - c·b + Δ` and checks that the transcript hash of
//! `w'` reproduces `c`. The reference parameter set keeps the rounded rings
//! at full precision, so the identity is exact.
//!
//! Secret and noise vectors are additively shared: the group commitment is
//! the sum of per-party commitments, and a threshold signature aggregates
//! per-party responses, which is what the MPC client builds on.
use super::codec::{RingtailSignature, SIGNATURE_BYTES};
use super::ring::{Poly, DEGREE, POLY_BYTES, Q};
use rand::RngCore;

/// Response rank N: length of `z`, columns of `A`.
pub const RESPONSE_RANK: usize = 4;

/// Commitment rank M: length of `Δ` and `b̃`, rows of `A`.
pub const COMMIT_RANK: usize = 2;

/// Modulus of the rounded-noise ring `R_ν`. Full precision in the
/// reference parameter set.
pub const NU: u64 = Q;

/// Modulus of the commitment ring `R_ξ`. Full precision in the reference
/// parameter set.
pub const XI: u64 = Q;

/// Nonzero coefficients in a challenge polynomial.
pub const TAU: usize = 39;

/// Centered bound on secret and noise coefficients.
const ETA: u64 = 2;

const MATRIX_DOMAIN: &[u8] = b"ringtail/matrix";
const CHALLENGE_DOMAIN: &[u8] = b"ringtail/challenge";

/// Group public key: matrix seed plus commitment vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupPublicKey {
    /// Seed expanding to the public matrix `A`.
    pub seed: [u8; 32],
    /// Commitment vector `b`, coefficient form.
    pub b: Vec<Poly>,
}

impl GroupPublicKey {
    /// Serialized length: seed plus `M` polynomials.
    pub const fn serialized_len() -> usize {
        32 + COMMIT_RANK * POLY_BYTES
    }

    /// Serializes as `seed ‖ b`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::serialized_len());
        out.extend_from_slice(&self.seed);
        for poly in &self.b {
            out.extend_from_slice(&poly.to_bytes());
        }
        out
    }

    /// Parses `seed ‖ b`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != Self::serialized_len() {
            return None;
        }
        let seed: [u8; 32] = data[..32].try_into().ok()?;
        let mut b = Vec::with_capacity(COMMIT_RANK);
        for i in 0..COMMIT_RANK {
            let at = 32 + i * POLY_BYTES;
            b.push(Poly::from_bytes(&data[at..at + POLY_BYTES], XI)?);
        }
        Some(Self { seed, b })
    }
}

/// One party's additive share of the group secret.
#[derive(Clone, Debug)]
pub struct SecretShare {
    /// Share of the secret vector `s`, length N.
    pub s: Vec<Poly>,
    /// Share of the noise vector `e`, length M.
    pub e: Vec<Poly>,
}

impl SecretShare {
    /// Samples a fresh share.
    pub fn random(rng: &mut impl RngCore) -> Self {
        Self {
            s: (0..RESPONSE_RANK).map(|_| sample_small(rng)).collect(),
            e: (0..COMMIT_RANK).map(|_| sample_small(rng)).collect(),
        }
    }

    /// The share's commitment contribution `b_i = A·s_i + e_i`.
    pub fn commitment(&self, a: &[Vec<Poly>]) -> Vec<Poly> {
        let mut b = mat_vec_mul(a, &self.s);
        for (row, noise) in b.iter_mut().zip(&self.e) {
            *row = row.add(noise);
        }
        b
    }

    /// Adds another share in, for aggregating party contributions.
    pub fn aggregate(&mut self, other: &Self) {
        for (mine, theirs) in self.s.iter_mut().zip(&other.s) {
            *mine = mine.add(theirs);
        }
        for (mine, theirs) in self.e.iter_mut().zip(&other.e) {
            *mine = mine.add(theirs);
        }
    }
}

/// Expands the matrix seed into `A`, row-major, coefficient form.
/// Coefficients are rejection-sampled below the modulus.
pub fn expand_a(seed: &[u8; 32]) -> Vec<Vec<Poly>> {
    let mut a = Vec::with_capacity(COMMIT_RANK);
    for row in 0..COMMIT_RANK {
        let mut polys = Vec::with_capacity(RESPONSE_RANK);
        for col in 0..RESPONSE_RANK {
            let mut hasher = blake3::Hasher::new();
            hasher.update(MATRIX_DOMAIN);
            hasher.update(seed);
            hasher.update(&[row as u8, col as u8]);
            let mut xof = hasher.finalize_xof();
            let mut poly = Poly::zero();
            for coeff in poly.coeffs.iter_mut() {
                *coeff = loop {
                    let mut word = [0u8; 8];
                    xof.fill(&mut word);
                    let value = u64::from_be_bytes(word);
                    if value < Q {
                        break value;
                    }
                };
            }
            polys.push(poly);
        }
        a.push(polys);
    }
    a
}

/// Samples a polynomial with coefficients centered in `[-ETA, ETA]`.
pub fn sample_small(rng: &mut impl RngCore) -> Poly {
    let mut poly = Poly::zero();
    for coeff in poly.coeffs.iter_mut() {
        let draw = rng.next_u32() % (2 * ETA as u32 + 1);
        let centered = draw as i64 - ETA as i64;
        *coeff = if centered < 0 {
            Q - centered.unsigned_abs()
        } else {
            centered as u64
        };
    }
    poly
}

/// `A·v` over coefficient-form inputs.
pub fn mat_vec_mul(a: &[Vec<Poly>], v: &[Poly]) -> Vec<Poly> {
    a.iter()
        .map(|row| {
            let mut acc = Poly::zero();
            for (entry, value) in row.iter().zip(v) {
                acc = acc.add(&entry.mul(value));
            }
            acc
        })
        .collect()
}

/// Sparse ternary challenge from the signing transcript.
pub fn challenge_poly(a_bytes: &[u8], b_bytes: &[u8], w_bytes: &[u8], message: &[u8]) -> Poly {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CHALLENGE_DOMAIN);
    hasher.update(a_bytes);
    hasher.update(b_bytes);
    hasher.update(w_bytes);
    hasher.update(message);
    let mut xof = hasher.finalize_xof();

    let mut sign_bytes = [0u8; 8];
    xof.fill(&mut sign_bytes);
    let mut sign_bits = u64::from_le_bytes(sign_bytes);

    // in-place Fisher-Yates tail, as in FIPS 204 SampleInBall
    let mut poly = Poly::zero();
    for i in (DEGREE - TAU)..DEGREE {
        let j = loop {
            let mut byte = [0u8; 1];
            xof.fill(&mut byte);
            if byte[0] as usize <= i {
                break byte[0] as usize;
            }
        };
        poly.coeffs[i] = poly.coeffs[j];
        poly.coeffs[j] = if sign_bits & 1 == 1 { Q - 1 } else { 1 };
        sign_bits >>= 1;
    }
    poly
}

fn serialize_polys(polys: &[Poly]) -> Vec<u8> {
    let mut out = Vec::with_capacity(polys.len() * POLY_BYTES);
    for poly in polys {
        out.extend_from_slice(&poly.to_bytes());
    }
    out
}

/// Serializes matrix rows in decode order.
pub fn serialize_matrix(a: &[Vec<Poly>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMIT_RANK * RESPONSE_RANK * POLY_BYTES);
    for row in a {
        out.extend_from_slice(&serialize_polys(row));
    }
    out
}

/// Assembles the wire signature from coefficient-form parts.
pub fn serialize_signature(
    c: &Poly,
    z: &[Poly],
    delta: &[Poly],
    a: &[Vec<Poly>],
    b: &[Poly],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNATURE_BYTES);
    out.extend_from_slice(&c.to_bytes());
    out.extend_from_slice(&serialize_polys(z));
    out.extend_from_slice(&serialize_polys(delta));
    out.extend_from_slice(&serialize_matrix(a));
    out.extend_from_slice(&serialize_polys(b));
    out
}

/// Single-party keygen, the `n = 1` degenerate of the threshold flow.
pub fn keygen(rng: &mut impl RngCore) -> (GroupPublicKey, SecretShare) {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    let a = expand_a(&seed);
    let share = SecretShare::random(rng);
    let b = share.commitment(&a);
    (GroupPublicKey { seed, b }, share)
}

/// Signs a message with the full (aggregated) secret.
pub fn sign(
    public_key: &GroupPublicKey,
    secret: &SecretShare,
    message: &[u8],
    rng: &mut impl RngCore,
) -> Vec<u8> {
    let a = expand_a(&public_key.seed);
    let a_bytes = serialize_matrix(&a);
    let b_bytes = serialize_polys(&public_key.b);

    let r: Vec<Poly> = (0..RESPONSE_RANK).map(|_| sample_small(rng)).collect();
    let w = mat_vec_mul(&a, &r);
    let w_bytes = serialize_polys(&w);

    let c = challenge_poly(&a_bytes, &b_bytes, &w_bytes, message);

    // z = r + c·s
    let z: Vec<Poly> = r
        .iter()
        .zip(&secret.s)
        .map(|(r_j, s_j)| r_j.add(&c.mul(s_j)))
        .collect();

    // Δ = w - (A·z - c·b), the exact rounding residual
    let az = mat_vec_mul(&a, &z);
    let delta: Vec<Poly> = w
        .iter()
        .zip(az.iter().zip(&public_key.b))
        .map(|(w_row, (az_row, b_row))| w_row.sub(&az_row.sub(&c.mul(b_row))))
        .collect();

    serialize_signature(&c, &z, &delta, &a, &public_key.b)
}

/// Verifies a decoded signature against its own embedded matrix and
/// commitment: recomputes `w' = A·z - c·b + Δ` and checks the transcript.
pub fn verify_decoded(signature: &RingtailSignature, message: &[u8]) -> bool {
    let mut w_bytes = Vec::with_capacity(COMMIT_RANK * POLY_BYTES);
    for (row, (delta_row, b_row)) in signature
        .a
        .iter()
        .zip(signature.delta.iter().zip(&signature.b))
    {
        // A·z - c·b in the NTT domain, then back out for the residual add
        let mut acc = Poly::zero();
        for (entry, z_j) in row.iter().zip(&signature.z) {
            acc = acc.add(&entry.mul_ntt(z_j));
        }
        let mut b_ntt = b_row.clone();
        b_ntt.to_ntt();
        let mut w_row = acc.sub(&signature.c.mul_ntt(&b_ntt));
        w_row.from_ntt();
        w_bytes.extend_from_slice(&w_row.add(delta_row).to_bytes());
    }

    let mut expected = challenge_poly(
        &signature.a_bytes,
        &signature.b_bytes,
        &w_bytes,
        message,
    );
    expected.to_ntt();
    expected == signature.c
}

/// Verifies a serialized signature against a registered group key: the
/// embedded matrix and commitment must match the key before the transcript
/// check runs.
pub fn verify_with_group_key(
    public_key: &GroupPublicKey,
    message: &[u8],
    signature_bytes: &[u8],
) -> bool {
    let Ok(signature) = super::codec::decode(signature_bytes) else {
        return false;
    };
    let a_bytes = serialize_matrix(&expand_a(&public_key.seed));
    let b_bytes = serialize_polys(&public_key.b);
    if signature.a_bytes != a_bytes || signature.b_bytes != b_bytes {
        return false;
    }
    verify_decoded(&signature, message)
}

/// Verifier provider behind the precompile. Implementations may be CPU or
/// GPU backed; the contract is invariant.
pub trait RingtailVerifier: Send + Sync {
    /// Verifies a decoded signature over the lowercase-hex message. A
    /// group key, when supplied, pins the embedded matrix and commitment.
    fn verify(
        &self,
        group_key: Option<&GroupPublicKey>,
        hex_message: &str,
        signature: &RingtailSignature,
    ) -> bool;

    /// Whether the backend is GPU-accelerated; drives the discounted gas
    /// schedule.
    fn gpu_accelerated(&self) -> bool {
        false
    }
}

/// CPU reference verifier.
#[derive(Clone, Debug, Default)]
pub struct ReferenceVerifier;

impl RingtailVerifier for ReferenceVerifier {
    fn verify(
        &self,
        group_key: Option<&GroupPublicKey>,
        hex_message: &str,
        signature: &RingtailSignature,
    ) -> bool {
        if let Some(key) = group_key {
            let a_bytes = serialize_matrix(&expand_a(&key.seed));
            let b_bytes = serialize_polys(&key.b);
            if signature.a_bytes != a_bytes || signature.b_bytes != b_bytes {
                return false;
            }
        }
        verify_decoded(signature, hex_message.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_roundtrip() {
        let (pk, share) = keygen(&mut OsRng);
        let sig = sign(&pk, &share, b"deadbeef", &mut OsRng);
        assert_eq!(sig.len(), SIGNATURE_BYTES);
        assert!(verify_with_group_key(&pk, b"deadbeef", &sig));
        assert!(!verify_with_group_key(&pk, b"deadbeee", &sig));
    }

    #[test]
    fn tampered_signature_fails() {
        let (pk, share) = keygen(&mut OsRng);
        let sig = sign(&pk, &share, b"m", &mut OsRng);

        // flip a low bit inside z
        let mut tampered = sig.clone();
        tampered[POLY_BYTES + 7] ^= 0x01;
        assert!(!verify_with_group_key(&pk, b"m", &tampered));
    }

    #[test]
    fn wrong_group_key_fails() {
        let (pk, share) = keygen(&mut OsRng);
        let (other_pk, _) = keygen(&mut OsRng);
        let sig = sign(&pk, &share, b"m", &mut OsRng);
        assert!(!verify_with_group_key(&other_pk, b"m", &sig));
    }

    #[test]
    fn aggregated_shares_sign_like_one_key() {
        // three-party additive keygen
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let a = expand_a(&seed);

        let shares: Vec<SecretShare> =
            (0..3).map(|_| SecretShare::random(&mut OsRng)).collect();
        let mut b = vec![Poly::zero(); COMMIT_RANK];
        for share in &shares {
            for (acc, part) in b.iter_mut().zip(share.commitment(&a)) {
                *acc = acc.add(&part);
            }
        }
        let pk = GroupPublicKey { seed, b };

        let mut group_secret = shares[0].clone();
        group_secret.aggregate(&shares[1]);
        group_secret.aggregate(&shares[2]);

        let sig = sign(&pk, &group_secret, b"threshold", &mut OsRng);
        assert!(verify_with_group_key(&pk, b"threshold", &sig));
    }

    #[test]
    fn group_key_roundtrips() {
        let (pk, _) = keygen(&mut OsRng);
        let bytes = pk.to_bytes();
        assert_eq!(GroupPublicKey::from_bytes(&bytes).unwrap(), pk);
        assert!(GroupPublicKey::from_bytes(&bytes[1..]).is_none());
    }

    #[test]
    fn challenge_has_tau_taps() {
        let c = challenge_poly(b"a", b"b", b"w", b"m");
        let taps = c.coeffs.iter().filter(|&&x| x != 0).count();
        assert_eq!(taps, TAU);
        assert!(c.coeffs.iter().all(|&x| x == 0 || x == 1 || x == Q - 1));
    }
}
