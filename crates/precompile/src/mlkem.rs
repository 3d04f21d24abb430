//! ML-KEM (FIPS 203) precompiles.
//!
//! Wire format is `[op:u8, mode:u8, payload…]` with op 0x01 = encapsulate,
//! 0x02 = decapsulate; the batched variant uses op 0x11/0x12 with a
//! big-endian item count: `[op, mode, count:u16, payload…]`.
//!
//! Lengths are validated exactly against the mode's parameter set before any
//! cryptographic work. A decapsulation of a malformed-but-sized ciphertext
//! follows FIPS 203 implicit rejection and still yields a shared secret.
use crate::{
    crypto::{crypto, MlKemMode},
    gas::mlkem as gas,
    interface::{PrecompileError, PrecompileOutput, PrecompileResult, PrecompileWithAddress},
    pq_address,
    utilities::read_u16_be,
};
use alloy_primitives::Address;

/// ML-KEM precompile address (`0x0200…0007`).
pub const ADDRESS: Address = pq_address(0x0007);

/// Batched, GPU-aware ML-KEM precompile address (`0x0200…0017`).
pub const BATCH_ADDRESS: Address = pq_address(0x0017);

/// Encapsulate op byte.
pub const OP_ENCAPSULATE: u8 = 0x01;
/// Decapsulate op byte.
pub const OP_DECAPSULATE: u8 = 0x02;
/// Batched encapsulate op byte.
pub const OP_BATCH_ENCAPSULATE: u8 = 0x11;
/// Batched decapsulate op byte.
pub const OP_BATCH_DECAPSULATE: u8 = 0x12;

/// ML-KEM precompile.
pub const ML_KEM: PrecompileWithAddress = PrecompileWithAddress(ADDRESS, ml_kem_run);

/// Batched ML-KEM precompile.
pub const ML_KEM_BATCH: PrecompileWithAddress = PrecompileWithAddress(BATCH_ADDRESS, batch_run);

/// Runs the plain ML-KEM precompile.
pub fn ml_kem_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let (op, mode) = parse_header(input)?;
    let payload = &input[2..];

    match op {
        OP_ENCAPSULATE => {
            let cost = gas::ENCAPSULATE[mode.index()];
            if cost > gas_limit {
                return Err(PrecompileError::OutOfGas);
            }
            let out = encapsulate(mode, payload)?;
            Ok(PrecompileOutput::new(cost, out.into()))
        }
        OP_DECAPSULATE => {
            let cost = gas::DECAPSULATE[mode.index()];
            if cost > gas_limit {
                return Err(PrecompileError::OutOfGas);
            }
            let out = decapsulate(mode, payload)?;
            Ok(PrecompileOutput::new(cost, out.into()))
        }
        _ => Err(PrecompileError::UnknownSelector),
    }
}

/// Runs the batched ML-KEM precompile. Output is the per-item output
/// concatenated in input order.
pub fn batch_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let (op, mode) = parse_header(input)?;
    let count = read_u16_be(input, 2).ok_or(PrecompileError::InvalidInputLength)?;
    if count == 0 {
        return Err(PrecompileError::InvalidInputLength);
    }
    let payload = &input[4..];

    let per_op = match op {
        OP_BATCH_ENCAPSULATE => gas::ENCAPSULATE[mode.index()],
        OP_BATCH_DECAPSULATE => gas::DECAPSULATE[mode.index()],
        _ => return Err(PrecompileError::UnknownSelector),
    };
    let cost = batch_gas(per_op, count);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    let out = match op {
        OP_BATCH_ENCAPSULATE => {
            let pk_len = mode.public_key_len();
            if payload.len() != pk_len * count as usize {
                return Err(PrecompileError::KemLengthMismatch);
            }
            let mut out =
                Vec::with_capacity(count as usize * (mode.ciphertext_len() + 32));
            for pk in payload.chunks_exact(pk_len) {
                out.extend_from_slice(&encapsulate(mode, pk)?);
            }
            out
        }
        OP_BATCH_DECAPSULATE => {
            let sk_len = mode.secret_key_len();
            let ct_len = mode.ciphertext_len();
            if payload.len() != sk_len + ct_len * count as usize {
                return Err(PrecompileError::KemLengthMismatch);
            }
            let (sk, cts) = payload.split_at(sk_len);
            let mut out = Vec::with_capacity(count as usize * 32);
            for ct in cts.chunks_exact(ct_len) {
                out.extend_from_slice(&crypto().mlkem_decapsulate(mode, sk, ct)?);
            }
            out
        }
        _ => unreachable!("op matched above"),
    };

    Ok(PrecompileOutput::new(cost, out.into()))
}

/// Batch gas: `base + count · perOp`, discounted by ~30% when the installed
/// backend is batch-parallel and the batch clears the provider threshold.
pub fn batch_gas(per_op: u64, count: u16) -> u64 {
    let full = gas::BATCH_BASE + per_op * count as u64;
    if crypto().parallel_kem() && count >= gas::PARALLEL_THRESHOLD {
        full * gas::PARALLEL_DISCOUNT_NUM / gas::PARALLEL_DISCOUNT_DEN
    } else {
        full
    }
}

fn parse_header(input: &[u8]) -> Result<(u8, MlKemMode), PrecompileError> {
    if input.len() < 2 {
        return Err(PrecompileError::InvalidInputLength);
    }
    let mode = MlKemMode::from_byte(input[1]).ok_or(PrecompileError::UnknownKemMode)?;
    Ok((input[0], mode))
}

fn encapsulate(mode: MlKemMode, public_key: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if public_key.len() != mode.public_key_len() {
        return Err(PrecompileError::KemLengthMismatch);
    }
    let (ct, ss) = crypto().mlkem_encapsulate(mode, public_key)?;
    let mut out = ct;
    out.extend_from_slice(&ss);
    Ok(out)
}

fn decapsulate(mode: MlKemMode, payload: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let sk_len = mode.secret_key_len();
    let ct_len = mode.ciphertext_len();
    if payload.len() != sk_len + ct_len {
        return Err(PrecompileError::KemLengthMismatch);
    }
    let (sk, ct) = payload.split_at(sk_len);
    crypto().mlkem_decapsulate(mode, sk, ct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqcrypto_mlkem::{mlkem1024, mlkem512, mlkem768};
    use pqcrypto_traits::kem::{PublicKey as _, SecretKey as _};
    use rstest::rstest;

    fn keypair(mode: MlKemMode) -> (Vec<u8>, Vec<u8>) {
        match mode {
            MlKemMode::Kem512 => {
                let (pk, sk) = mlkem512::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            MlKemMode::Kem768 => {
                let (pk, sk) = mlkem768::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            MlKemMode::Kem1024 => {
                let (pk, sk) = mlkem1024::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
        }
    }

    #[rstest]
    #[case(MlKemMode::Kem512, 0x00)]
    #[case(MlKemMode::Kem768, 0x01)]
    #[case(MlKemMode::Kem1024, 0x02)]
    fn encaps_decaps_roundtrip(#[case] mode: MlKemMode, #[case] mode_byte: u8) {
        let (pk, sk) = keypair(mode);

        let mut input = vec![OP_ENCAPSULATE, mode_byte];
        input.extend_from_slice(&pk);
        let out = ml_kem_run(&input, 1_000_000).unwrap();
        assert_eq!(out.gas_used, gas::ENCAPSULATE[mode.index()]);
        assert_eq!(out.bytes.len(), mode.ciphertext_len() + 32);

        let (ct, ss) = out.bytes.split_at(mode.ciphertext_len());
        let mut input = vec![OP_DECAPSULATE, mode_byte];
        input.extend_from_slice(&sk);
        input.extend_from_slice(ct);
        let out = ml_kem_run(&input, 1_000_000).unwrap();
        assert_eq!(out.bytes.as_ref(), ss);
    }

    #[test]
    fn wrong_public_key_length_is_rejected() {
        let mut input = vec![OP_ENCAPSULATE, 0x00];
        input.extend_from_slice(&[0u8; 801]);
        assert_eq!(
            ml_kem_run(&input, 1_000_000).unwrap_err(),
            PrecompileError::KemLengthMismatch
        );
    }

    #[test]
    fn unknown_mode_is_rejected_before_work() {
        assert_eq!(
            ml_kem_run(&[OP_ENCAPSULATE, 0x03], 1_000_000).unwrap_err(),
            PrecompileError::UnknownKemMode
        );
    }

    #[test]
    fn out_of_gas() {
        let (pk, _) = keypair(MlKemMode::Kem512);
        let mut input = vec![OP_ENCAPSULATE, 0x00];
        input.extend_from_slice(&pk);
        assert_eq!(
            ml_kem_run(&input, gas::ENCAPSULATE[0] - 1).unwrap_err(),
            PrecompileError::OutOfGas
        );
    }

    #[test]
    fn batch_decapsulate_matches_item_order() {
        let mode = MlKemMode::Kem512;
        let (pk, sk) = keypair(mode);

        let mut secrets = Vec::new();
        let mut cts = Vec::new();
        for _ in 0..3 {
            let mut input = vec![OP_ENCAPSULATE, 0x00];
            input.extend_from_slice(&pk);
            let out = ml_kem_run(&input, 1_000_000).unwrap();
            let (ct, ss) = out.bytes.split_at(mode.ciphertext_len());
            cts.extend_from_slice(ct);
            secrets.extend_from_slice(ss);
        }

        let mut input = vec![OP_BATCH_DECAPSULATE, 0x00, 0x00, 0x03];
        input.extend_from_slice(&sk);
        input.extend_from_slice(&cts);
        let out = batch_run(&input, 10_000_000).unwrap();
        assert_eq!(out.bytes.as_ref(), secrets.as_slice());
        assert_eq!(out.gas_used, batch_gas(gas::DECAPSULATE[0], 3));
    }

    #[test]
    fn batch_rejects_zero_count() {
        let input = vec![OP_BATCH_ENCAPSULATE, 0x00, 0x00, 0x00];
        assert_eq!(
            batch_run(&input, 1_000_000).unwrap_err(),
            PrecompileError::InvalidInputLength
        );
    }

    #[test]
    fn batch_gas_scales_with_count() {
        let per_op = gas::ENCAPSULATE[0];
        let base = batch_gas(per_op, 1);
        let five = batch_gas(per_op, 5);
        assert_eq!(five - base, 4 * per_op);
    }
}
