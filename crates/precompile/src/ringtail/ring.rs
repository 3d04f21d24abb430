//! Polynomial ring arithmetic for the Ringtail verifier.
//!
//! The ring is `R_q = Z_q[x]/(x^D + 1)` with `q = 2^64 - 2^32 + 1` and
//! `D = 256`. The modulus is NTT-friendly: the multiplicative group has
//! order `2^32 · (2^32 - 1)`, so 2D-th roots of unity exist and negacyclic
//! convolution reduces to a pointwise product after a psi-twisted NTT.
//! Montgomery representation keeps the butterfly reductions branch-free.
use once_cell::sync::OnceCell;

/// Ring modulus.
pub const Q: u64 = 0xffff_ffff_0000_0001;

/// Ring degree.
pub const DEGREE: usize = 256;

/// Bytes per serialized coefficient.
pub const COEFF_BYTES: usize = 8;

/// Serialized length of one polynomial.
pub const POLY_BYTES: usize = DEGREE * COEFF_BYTES;

/// Multiplicative generator of `F_q*`.
const GENERATOR: u64 = 7;

/// `q^{-1} mod 2^64` by Newton–Hensel lifting.
const fn inv_mod_2pow64(q: u64) -> u64 {
    let mut inv = 1u64;
    let mut i = 0;
    while i < 6 {
        inv = inv.wrapping_mul(2u64.wrapping_sub(q.wrapping_mul(inv)));
        i += 1;
    }
    inv
}

/// `-q^{-1} mod 2^64`, the Montgomery reduction constant.
const Q_NEG_INV: u64 = inv_mod_2pow64(Q).wrapping_neg();

/// `2^64 mod q`, i.e. Montgomery one.
const R_MOD_Q: u64 = (((1u128 << 64) % (Q as u128)) as u64);

/// `2^128 mod q`, the to-Montgomery conversion factor.
const R2_MOD_Q: u64 = (((R_MOD_Q as u128 * R_MOD_Q as u128) % (Q as u128)) as u64);

#[inline(always)]
fn add_mod(a: u64, b: u64) -> u64 {
    let (sum, overflow) = a.overflowing_add(b);
    if overflow || sum >= Q {
        sum.wrapping_sub(Q)
    } else {
        sum
    }
}

#[inline(always)]
fn sub_mod(a: u64, b: u64) -> u64 {
    let (diff, borrow) = a.overflowing_sub(b);
    if borrow {
        diff.wrapping_add(Q)
    } else {
        diff
    }
}

/// Montgomery reduction of a 128-bit product.
#[inline(always)]
fn mont_reduce(t: u128) -> u64 {
    let m = (t as u64).wrapping_mul(Q_NEG_INV);
    let mq = (m as u128) * (Q as u128);
    // low halves cancel mod 2^64; a carry remains unless both are zero
    let carry = (t as u64 != 0) as u128;
    let r = (t >> 64) + (mq >> 64) + carry;
    if r >= Q as u128 {
        (r - Q as u128) as u64
    } else {
        r as u64
    }
}

/// Montgomery product.
#[inline(always)]
pub fn mont_mul(a: u64, b: u64) -> u64 {
    mont_reduce(a as u128 * b as u128)
}

/// Converts into Montgomery form.
#[inline(always)]
pub fn to_mont(a: u64) -> u64 {
    mont_mul(a, R2_MOD_Q)
}

/// Converts out of Montgomery form.
#[inline(always)]
pub fn from_mont(a: u64) -> u64 {
    mont_reduce(a as u128)
}

/// Plain modular exponentiation, used only for table setup.
fn pow_mod(mut base: u64, mut exp: u64) -> u64 {
    let mut acc = 1u64;
    base %= Q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = ((acc as u128 * base as u128) % Q as u128) as u64;
        }
        base = ((base as u128 * base as u128) % Q as u128) as u64;
        exp >>= 1;
    }
    acc
}

fn inv_mod(a: u64) -> u64 {
    pow_mod(a, Q - 2)
}

/// Precomputed twiddles, all in Montgomery form.
struct Tables {
    /// psi^i, the negacyclic twist.
    psi: [u64; DEGREE],
    /// psi^{-i}, the inverse twist.
    psi_inv: [u64; DEGREE],
    /// Stage roots omega^(D/len) for len = 2, 4, …, D.
    stage: [u64; 9],
    /// Inverse stage roots.
    stage_inv: [u64; 9],
    /// D^{-1}, folded into the inverse transform.
    degree_inv: u64,
}

fn tables() -> &'static Tables {
    static TABLES: OnceCell<Tables> = OnceCell::new();
    TABLES.get_or_init(|| {
        // psi is a primitive 2D-th root of unity, so psi^D = -1
        let psi = pow_mod(GENERATOR, (Q - 1) / (2 * DEGREE as u64));
        debug_assert_eq!(pow_mod(psi, DEGREE as u64), Q - 1);
        let psi_inv = inv_mod(psi);
        let omega = ((psi as u128 * psi as u128) % Q as u128) as u64;
        let omega_inv = inv_mod(omega);

        let mut psi_pows = [0u64; DEGREE];
        let mut psi_inv_pows = [0u64; DEGREE];
        let mut acc = 1u64;
        let mut acc_inv = 1u64;
        for i in 0..DEGREE {
            psi_pows[i] = to_mont(acc);
            psi_inv_pows[i] = to_mont(acc_inv);
            acc = ((acc as u128 * psi as u128) % Q as u128) as u64;
            acc_inv = ((acc_inv as u128 * psi_inv as u128) % Q as u128) as u64;
        }

        let mut stage = [0u64; 9];
        let mut stage_inv = [0u64; 9];
        for k in 1..=8usize {
            let len = 1u64 << k;
            stage[k] = to_mont(pow_mod(omega, DEGREE as u64 / len));
            stage_inv[k] = to_mont(pow_mod(omega_inv, DEGREE as u64 / len));
        }

        Tables {
            psi: psi_pows,
            psi_inv: psi_inv_pows,
            stage,
            stage_inv,
            degree_inv: to_mont(inv_mod(DEGREE as u64)),
        }
    })
}

fn bit_reverse_permute(a: &mut [u64; DEGREE]) {
    for i in 0..DEGREE {
        let j = (i as u8).reverse_bits() as usize;
        if i < j {
            a.swap(i, j);
        }
    }
}

fn fft_in_place(a: &mut [u64; DEGREE], roots: &[u64; 9]) {
    bit_reverse_permute(a);
    let mut k = 1usize;
    while k <= 8 {
        let len = 1usize << k;
        let w_len = roots[k];
        let mut start = 0;
        while start < DEGREE {
            let mut w = to_mont(1);
            for j in 0..len / 2 {
                let u = a[start + j];
                let v = mont_mul(a[start + j + len / 2], w);
                a[start + j] = add_mod(u, v);
                a[start + j + len / 2] = sub_mod(u, v);
                w = mont_mul(w, w_len);
            }
            start += len;
        }
        k += 1;
    }
}

/// A ring element. Coefficient-form values are plain residues below `Q`;
/// after [`Poly::to_ntt`] the coefficients are in the NTT domain and
/// Montgomery form.
#[derive(Clone, PartialEq, Eq)]
pub struct Poly {
    /// Coefficients, constant term first.
    pub coeffs: [u64; DEGREE],
}

impl Default for Poly {
    fn default() -> Self {
        Self::zero()
    }
}

impl core::fmt::Debug for Poly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Poly[{:#x}, {:#x}, …]", self.coeffs[0], self.coeffs[1])
    }
}

impl Poly {
    /// The zero polynomial.
    pub fn zero() -> Self {
        Self {
            coeffs: [0u64; DEGREE],
        }
    }

    /// Coefficient-wise addition, valid in either domain.
    pub fn add(&self, other: &Self) -> Self {
        let mut out = Self::zero();
        for i in 0..DEGREE {
            out.coeffs[i] = add_mod(self.coeffs[i], other.coeffs[i]);
        }
        out
    }

    /// Coefficient-wise subtraction, valid in either domain.
    pub fn sub(&self, other: &Self) -> Self {
        let mut out = Self::zero();
        for i in 0..DEGREE {
            out.coeffs[i] = sub_mod(self.coeffs[i], other.coeffs[i]);
        }
        out
    }

    /// Moves into NTT domain and Montgomery form.
    pub fn to_ntt(&mut self) {
        let t = tables();
        for i in 0..DEGREE {
            self.coeffs[i] = mont_mul(to_mont(self.coeffs[i]), t.psi[i]);
        }
        fft_in_place(&mut self.coeffs, &t.stage);
    }

    /// Moves back into coefficient form from NTT domain.
    pub fn from_ntt(&mut self) {
        let t = tables();
        fft_in_place(&mut self.coeffs, &t.stage_inv);
        for i in 0..DEGREE {
            let scaled = mont_mul(mont_mul(self.coeffs[i], t.degree_inv), t.psi_inv[i]);
            self.coeffs[i] = from_mont(scaled);
        }
    }

    /// Pointwise product; both operands must be in NTT domain.
    pub fn mul_ntt(&self, other: &Self) -> Self {
        let mut out = Self::zero();
        for i in 0..DEGREE {
            out.coeffs[i] = mont_mul(self.coeffs[i], other.coeffs[i]);
        }
        out
    }

    /// Negacyclic product of two coefficient-form polynomials.
    pub fn mul(&self, other: &Self) -> Self {
        let mut a = self.clone();
        let mut b = other.clone();
        a.to_ntt();
        b.to_ntt();
        let mut out = a.mul_ntt(&b);
        out.from_ntt();
        out
    }

    /// Serializes as 8-byte big-endian coefficients.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(POLY_BYTES);
        for c in &self.coeffs {
            out.extend_from_slice(&c.to_be_bytes());
        }
        out
    }

    /// Parses 8-byte big-endian coefficients, rejecting any value at or
    /// above `modulus`.
    pub fn from_bytes(data: &[u8], modulus: u64) -> Option<Self> {
        if data.len() != POLY_BYTES {
            return None;
        }
        let mut out = Self::zero();
        for (i, chunk) in data.chunks_exact(COEFF_BYTES).enumerate() {
            let coeff = u64::from_be_bytes(chunk.try_into().expect("chunk size fixed"));
            if coeff >= modulus {
                return None;
            }
            out.coeffs[i] = coeff;
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schoolbook_negacyclic(a: &Poly, b: &Poly) -> Poly {
        let mut acc = [0i128; DEGREE];
        for i in 0..DEGREE {
            for j in 0..DEGREE {
                let prod = ((a.coeffs[i] as u128 * b.coeffs[j] as u128) % Q as u128) as i128;
                let k = (i + j) % DEGREE;
                if i + j < DEGREE {
                    acc[k] = (acc[k] + prod) % Q as i128;
                } else {
                    acc[k] = (acc[k] - prod).rem_euclid(Q as i128);
                }
            }
        }
        let mut out = Poly::zero();
        for i in 0..DEGREE {
            out.coeffs[i] = acc[i] as u64;
        }
        out
    }

    fn pseudo_random_poly(seed: u64) -> Poly {
        // xorshift is plenty for arithmetic tests
        let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
        let mut out = Poly::zero();
        for c in out.coeffs.iter_mut() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *c = state % Q;
        }
        out
    }

    #[test]
    fn montgomery_roundtrip() {
        for value in [0u64, 1, 2, R_MOD_Q, Q - 1, 0x1234_5678_9abc_def0] {
            assert_eq!(from_mont(to_mont(value)), value);
        }
        assert_eq!(mont_mul(to_mont(3), to_mont(5)), to_mont(15));
    }

    #[test]
    fn ntt_roundtrip() {
        let original = pseudo_random_poly(42);
        let mut poly = original.clone();
        poly.to_ntt();
        assert_ne!(poly, original);
        poly.from_ntt();
        assert_eq!(poly, original);
    }

    #[test]
    fn ntt_multiplication_matches_schoolbook() {
        let a = pseudo_random_poly(7);
        let b = pseudo_random_poly(13);
        assert_eq!(a.mul(&b), schoolbook_negacyclic(&a, &b));
    }

    #[test]
    fn negacyclic_wraparound_sign() {
        // x^{D-1} * x = x^D = -1
        let mut a = Poly::zero();
        a.coeffs[DEGREE - 1] = 1;
        let mut b = Poly::zero();
        b.coeffs[1] = 1;
        let prod = a.mul(&b);
        assert_eq!(prod.coeffs[0], Q - 1);
        for c in &prod.coeffs[1..] {
            assert_eq!(*c, 0);
        }
    }

    #[test]
    fn serialization_rejects_out_of_range() {
        let poly = pseudo_random_poly(99);
        let bytes = poly.to_bytes();
        assert_eq!(Poly::from_bytes(&bytes, Q).unwrap(), poly);

        let mut oversized = bytes.clone();
        oversized[..8].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(Poly::from_bytes(&oversized, Q).is_none());
        assert!(Poly::from_bytes(&bytes[..POLY_BYTES - 1], Q).is_none());
    }
}
