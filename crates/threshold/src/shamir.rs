//! Shamir secret sharing over the secp256k1 scalar field.
//!
//! A degree-`t` polynomial hides the secret in its constant term; any
//! `t + 1` of the `n` evaluation points reconstruct it by Lagrange
//! interpolation at zero. Proactive refresh adds a zero-constant sharing
//! on top of the old one, changing every share without moving the secret.
use crate::error::ThresholdError;
use k256::{elliptic_curve::Field, Scalar};
use rand::RngCore;

/// One party's share: the evaluation of the sharing polynomial at a
/// 1-based index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Share {
    /// Evaluation point, 1-based.
    pub index: u16,
    /// Polynomial value at the point.
    pub value: Scalar,
}

fn x_coord(index: u16) -> Scalar {
    Scalar::from(index as u64)
}

fn eval(coeffs: &[Scalar], x: &Scalar) -> Scalar {
    // Horner, highest coefficient first
    let mut acc = Scalar::ZERO;
    for coeff in coeffs.iter().rev() {
        acc = acc * x + coeff;
    }
    acc
}

/// Splits `secret` into `n` shares with threshold `t` (degree-`t`
/// polynomial).
pub fn split(secret: &Scalar, t: u16, n: u16, rng: &mut impl RngCore) -> Vec<Share> {
    let mut coeffs = Vec::with_capacity(t as usize + 1);
    coeffs.push(*secret);
    for _ in 0..t {
        coeffs.push(Scalar::random(&mut *rng));
    }
    (1..=n)
        .map(|index| Share {
            index,
            value: eval(&coeffs, &x_coord(index)),
        })
        .collect()
}

/// A zero-constant sharing used for proactive refresh: adding it to an
/// existing sharing re-randomizes every share and leaves the secret fixed.
pub fn zero_delta(t: u16, n: u16, rng: &mut impl RngCore) -> Vec<Share> {
    split(&Scalar::ZERO, t, n, rng)
}

/// Lagrange coefficient of `index` at zero within `indices`.
pub fn lagrange_at_zero(index: u16, indices: &[u16]) -> Scalar {
    let x_i = x_coord(index);
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;
    for &j in indices {
        if j == index {
            continue;
        }
        let x_j = x_coord(j);
        num *= x_j;
        den *= x_j - x_i;
    }
    num * den.invert().expect("distinct nonzero points")
}

/// Reconstructs the secret from at least `t + 1` distinct shares.
pub fn reconstruct(shares: &[Share]) -> Result<Scalar, ThresholdError> {
    if shares.is_empty() {
        return Err(ThresholdError::InvalidPartyCount);
    }
    let indices: Vec<u16> = shares.iter().map(|s| s.index).collect();
    {
        let mut seen = indices.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != indices.len() || seen.contains(&0) {
            return Err(ThresholdError::InvalidPartyCount);
        }
    }
    let mut secret = Scalar::ZERO;
    for share in shares {
        secret += share.value * lagrange_at_zero(share.index, &indices);
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn reconstruct_from_any_quorum() {
        let secret = Scalar::random(&mut OsRng);
        let shares = split(&secret, 2, 5, &mut OsRng);

        assert_eq!(reconstruct(&shares[0..3]).unwrap(), secret);
        assert_eq!(reconstruct(&[shares[0], shares[2], shares[4]]).unwrap(), secret);
        assert_eq!(reconstruct(&shares).unwrap(), secret);

        // t shares miss
        assert_ne!(reconstruct(&shares[0..2]).unwrap(), secret);
    }

    #[test]
    fn zero_delta_preserves_the_secret() {
        let secret = Scalar::random(&mut OsRng);
        let shares = split(&secret, 2, 5, &mut OsRng);
        let delta = zero_delta(2, 5, &mut OsRng);

        let refreshed: Vec<Share> = shares
            .iter()
            .zip(&delta)
            .map(|(s, d)| Share {
                index: s.index,
                value: s.value + d.value,
            })
            .collect();

        assert_ne!(refreshed[0].value, shares[0].value);
        assert_eq!(reconstruct(&refreshed[0..3]).unwrap(), secret);
    }

    #[test]
    fn duplicate_indices_are_rejected() {
        let secret = Scalar::random(&mut OsRng);
        let shares = split(&secret, 1, 3, &mut OsRng);
        assert!(reconstruct(&[shares[0], shares[0]]).is_err());
        assert!(reconstruct(&[]).is_err());
    }
}
