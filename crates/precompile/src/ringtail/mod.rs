//! Ringtail lattice threshold-signature verification precompile.
//!
//! Input: `[t:u32 BE, n:u32 BE, messageHash:32, signature:…]`. The message
//! is rendered as lowercase hex before it enters the transcript, and the
//! serialized signature is reconstructed into the lattice domain (see
//! [`codec`]) before delegation to the installed [`RingtailVerifier`].
//! A verifier returning false is a successful call with a zero result word.
use crate::{
    gas::ringtail as gas,
    interface::{PrecompileError, PrecompileOutput, PrecompileResult, PrecompileWithAddress},
    pq_address,
    utilities::{bool_to_word, read_u32_be},
};
use alloy_primitives::{hex, Address};
use once_cell::sync::OnceCell;

pub mod codec;
pub mod ring;
pub mod scheme;

pub use codec::{RingtailSignature, SIGNATURE_BYTES};
pub use scheme::{GroupPublicKey, ReferenceVerifier, RingtailVerifier};

/// Ringtail verify precompile address (`0x0200…000B`).
pub const ADDRESS: Address = pq_address(0x000b);

/// Ringtail verify precompile.
pub const RINGTAIL_VERIFY: PrecompileWithAddress =
    PrecompileWithAddress(ADDRESS, ringtail_verify_run);

/// Fixed header: two u32 counters and the 32-byte message hash.
const HEADER_LEN: usize = 4 + 4 + 32;

static VERIFIER: OnceCell<Box<dyn RingtailVerifier>> = OnceCell::new();

/// Installs a verifier backend for the whole process. The first
/// installation wins; returns `false` otherwise.
pub fn install_verifier(verifier: Box<dyn RingtailVerifier>) -> bool {
    VERIFIER.set(verifier).is_ok()
}

/// Returns the installed verifier, falling back to [`ReferenceVerifier`].
pub fn verifier() -> &'static dyn RingtailVerifier {
    VERIFIER
        .get_or_init(|| Box::new(ReferenceVerifier))
        .as_ref()
}

/// Gas for a verification over `n` parties; GPU backends run at a 0.60
/// factor.
pub fn required_gas(n: u32) -> u64 {
    let full = gas::VERIFY_BASE + n as u64 * gas::VERIFY_PER_PARTY;
    if verifier().gpu_accelerated() {
        full * gas::GPU_FACTOR_NUM / gas::GPU_FACTOR_DEN
    } else {
        full
    }
}

/// Runs the Ringtail verification precompile.
pub fn ringtail_verify_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if input.len() < HEADER_LEN {
        return Err(PrecompileError::InvalidInputLength);
    }
    let t = read_u32_be(input, 0).expect("length checked");
    let n = read_u32_be(input, 4).expect("length checked");
    if t == 0 || t >= n {
        return Err(PrecompileError::InvalidThreshold);
    }

    let cost = required_gas(n);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    let message_hash = &input[8..HEADER_LEN];
    let hex_message = hex::encode(message_hash);

    let signature = codec::decode(&input[HEADER_LEN..])?;
    let valid = verifier().verify(None, &hex_message, &signature);

    Ok(PrecompileOutput::new(cost, bool_to_word(valid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use rand::rngs::OsRng;

    fn signed_input(t: u32, n: u32, message_hash: B256) -> Vec<u8> {
        let (pk, share) = scheme::keygen(&mut OsRng);
        let hex_message = hex::encode(message_hash);
        let sig = scheme::sign(&pk, &share, hex_message.as_bytes(), &mut OsRng);

        let mut input = Vec::with_capacity(HEADER_LEN + sig.len());
        input.extend_from_slice(&t.to_be_bytes());
        input.extend_from_slice(&n.to_be_bytes());
        input.extend_from_slice(message_hash.as_slice());
        input.extend_from_slice(&sig);
        input
    }

    #[test]
    fn valid_signature_yields_true_word() {
        let message_hash = B256::repeat_byte(0x5a);
        let input = signed_input(2, 3, message_hash);
        let out = ringtail_verify_run(&input, 10_000_000).unwrap();
        assert_eq!(out.gas_used, required_gas(3));
        assert_eq!(out.bytes, bool_to_word(true));
    }

    #[test]
    fn tampered_signature_yields_false_word() {
        let message_hash = B256::repeat_byte(0x5a);
        let mut input = signed_input(2, 3, message_hash);
        let last = input.len() - 1;
        input[last] ^= 0x01;
        let out = ringtail_verify_run(&input, 10_000_000).unwrap();
        assert_eq!(out.bytes, bool_to_word(false));
    }

    #[test]
    fn threshold_policy_is_checked_before_decode() {
        let mut input = Vec::new();
        input.extend_from_slice(&3u32.to_be_bytes());
        input.extend_from_slice(&3u32.to_be_bytes());
        input.extend_from_slice(B256::ZERO.as_slice());
        // no signature bytes at all: the policy failure must come first
        assert_eq!(
            ringtail_verify_run(&input, 10_000_000).unwrap_err(),
            PrecompileError::InvalidThreshold
        );
    }

    #[test]
    fn truncated_signature_is_a_decode_failure() {
        let mut input = Vec::new();
        input.extend_from_slice(&2u32.to_be_bytes());
        input.extend_from_slice(&3u32.to_be_bytes());
        input.extend_from_slice(B256::ZERO.as_slice());
        input.extend_from_slice(&vec![0u8; SIGNATURE_BYTES - 1]);
        assert_eq!(
            ringtail_verify_run(&input, 10_000_000).unwrap_err(),
            PrecompileError::DeserializationFailed
        );
    }

    #[test]
    fn out_of_gas_before_any_decode() {
        let input = signed_input(2, 3, B256::ZERO);
        assert_eq!(
            ringtail_verify_run(&input, required_gas(3) - 1).unwrap_err(),
            PrecompileError::OutOfGas
        );
    }
}
