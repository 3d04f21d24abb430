//! Fixed-order deserializer for Ringtail threshold signatures.
//!
//! Decode order: challenge `c`, response vector `z` (N polys), rounded
//! noise `Δ` (M polys in `R_ν`), matrix `A` (M×N polys), commitment vector
//! `b̃` (M polys in `R_ξ`). Every coefficient is 8 bytes big-endian and must
//! sit below its ring's modulus. `c`, `z` and `A` are moved into
//! NTT+Montgomery form after decode; `Δ` and `b̃` stay in coefficient form.
use super::ring::{Poly, POLY_BYTES, Q};
use super::scheme::{COMMIT_RANK, NU, RESPONSE_RANK, XI};
use crate::interface::PrecompileError;

/// Serialized signature length.
pub const SIGNATURE_BYTES: usize =
    (1 + RESPONSE_RANK + COMMIT_RANK + COMMIT_RANK * RESPONSE_RANK + COMMIT_RANK) * POLY_BYTES;

/// A decoded Ringtail signature.
#[derive(Clone, Debug)]
pub struct RingtailSignature {
    /// Challenge polynomial, NTT domain.
    pub c: Poly,
    /// Response vector, NTT domain.
    pub z: Vec<Poly>,
    /// Rounded-noise vector, coefficient form.
    pub delta: Vec<Poly>,
    /// Public matrix, row-major, NTT domain.
    pub a: Vec<Vec<Poly>>,
    /// Commitment vector, coefficient form.
    pub b: Vec<Poly>,
    /// Raw bytes of `A`, as serialized; bound into the challenge.
    pub a_bytes: Vec<u8>,
    /// Raw bytes of `b̃`, as serialized; bound into the challenge.
    pub b_bytes: Vec<u8>,
}

struct Reader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take_poly(&mut self, modulus: u64) -> Result<(Poly, &'a [u8]), PrecompileError> {
        let end = self
            .at
            .checked_add(POLY_BYTES)
            .filter(|end| *end <= self.data.len())
            .ok_or(PrecompileError::DeserializationFailed)?;
        let raw = &self.data[self.at..end];
        let poly =
            Poly::from_bytes(raw, modulus).ok_or(PrecompileError::DeserializationFailed)?;
        self.at = end;
        Ok((poly, raw))
    }
}

/// Decodes a serialized signature, applying the NTT transforms.
pub fn decode(data: &[u8]) -> Result<RingtailSignature, PrecompileError> {
    if data.len() != SIGNATURE_BYTES {
        return Err(PrecompileError::DeserializationFailed);
    }
    let mut reader = Reader { data, at: 0 };

    let (mut c, _) = reader.take_poly(Q)?;
    c.to_ntt();

    let mut z = Vec::with_capacity(RESPONSE_RANK);
    for _ in 0..RESPONSE_RANK {
        let (mut poly, _) = reader.take_poly(Q)?;
        poly.to_ntt();
        z.push(poly);
    }

    let mut delta = Vec::with_capacity(COMMIT_RANK);
    for _ in 0..COMMIT_RANK {
        delta.push(reader.take_poly(NU)?.0);
    }

    let a_start = reader.at;
    let mut a = Vec::with_capacity(COMMIT_RANK);
    for _ in 0..COMMIT_RANK {
        let mut row = Vec::with_capacity(RESPONSE_RANK);
        for _ in 0..RESPONSE_RANK {
            let (mut poly, _) = reader.take_poly(Q)?;
            poly.to_ntt();
            row.push(poly);
        }
        a.push(row);
    }
    let a_bytes = data[a_start..reader.at].to_vec();

    let b_start = reader.at;
    let mut b = Vec::with_capacity(COMMIT_RANK);
    for _ in 0..COMMIT_RANK {
        b.push(reader.take_poly(XI)?.0);
    }
    let b_bytes = data[b_start..reader.at].to_vec();

    Ok(RingtailSignature {
        c,
        z,
        delta,
        a,
        b,
        a_bytes,
        b_bytes,
    })
}
