//! secp256r1 (P-256) signature-verification precompile.
//!
//! Verifies ECDSA signatures over the secp256r1 curve. A verification that
//! returns false is a successful call with a zero result word, never a
//! host-level failure; callers verify speculatively.
use crate::{
    gas::secp256r1::P256VERIFY_BASE, interface::PrecompileWithAddress, u64_to_address,
    utilities::bool_to_word, PrecompileError, PrecompileOutput, PrecompileResult,
};
use alloy_primitives::Address;
use p256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};

/// secp256r1 verify precompile address.
pub const ADDRESS: Address = u64_to_address(0x0100);

/// secp256r1 verify precompile.
pub const P256VERIFY: PrecompileWithAddress = PrecompileWithAddress(ADDRESS, p256_verify);

/// Prehash length at the front of the input.
const PREHASH_LEN: usize = 32;
/// `r ‖ s` length following the prehash.
const SIG_LEN: usize = 64;
/// Affine `x ‖ y` length at the tail.
const COORDS_LEN: usize = 64;
/// Fixed input layout: `prehash:32 ‖ r:32 ‖ s:32 ‖ x:32 ‖ y:32`.
const INPUT_LEN: usize = PREHASH_LEN + SIG_LEN + COORDS_LEN;

/// Runs the p256verify precompile over the 160-byte fixed layout.
pub fn p256_verify(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if P256VERIFY_BASE > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(PrecompileOutput::new(
        P256VERIFY_BASE,
        bool_to_word(verify_impl(input).is_some()),
    ))
}

/// Returns `Some(())` iff the signature over the prehash verifies under
/// the affine point at the tail of the input.
fn verify_impl(input: &[u8]) -> Option<()> {
    if input.len() != INPUT_LEN {
        return None;
    }
    let (prehash, rest) = input.split_at(PREHASH_LEN);
    let (rs, coords) = rest.split_at(SIG_LEN);

    // the coordinates arrive bare; SEC1 uncompressed form tags them 0x04
    let mut sec1 = [0u8; 1 + COORDS_LEN];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(coords);
    let verifier = VerifyingKey::from_sec1_bytes(&sec1).ok()?;

    let signature = Signature::from_slice(rs).ok()?;
    verifier.verify_prehash(prehash, &signature).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;
    use rstest::rstest;

    #[rstest]
    // test vectors from https://github.com/daimo-eth/p256-verifier/tree/master/test-vectors
    #[case::ok_1("4cee90eb86eaa050036147a12d49004b6b9c72bd725d39d4785011fe190f0b4da73bd4903f0ce3b639bbbf6e8e80d16931ff4bcf5993d58468e8fb19086e8cac36dbcd03009df8c59286b162af3bd7fcc0450c9aa81be5d10d312af6c66b1d604aebd3099c618202fcfe16ae7770b0c49ab5eadf74b754204a3bb6060e44eff37618b065f9832de4ca6ca971a7a1adc826d0f7c00181a5fb2ddf79ae00b4e10e", true)]
    #[case::ok_2("3fec5769b5cf4e310a7d150508e82fb8e3eda1c2c94c61492d3bd8aea99e06c9e22466e928fdccef0de49e3503d2657d00494a00e764fd437bdafa05f5922b1fbbb77c6817ccf50748419477e843d5bac67e6a70e97dde5a57e0c983b777e1ad31a80482dadf89de6302b1988c82c29544c9c07bb910596158f6062517eb089a2f54c9a0f348752950094d3228d3b940258c75fe2a413cb70baa21dc2e352fc5", true)]
    #[case::fail_wrong_msg("3cee90eb86eaa050036147a12d49004b6b9c72bd725d39d4785011fe190f0b4da73bd4903f0ce3b639bbbf6e8e80d16931ff4bcf5993d58468e8fb19086e8cac36dbcd03009df8c59286b162af3bd7fcc0450c9aa81be5d10d312af6c66b1d604aebd3099c618202fcfe16ae7770b0c49ab5eadf74b754204a3bb6060e44eff37618b065f9832de4ca6ca971a7a1adc826d0f7c00181a5fb2ddf79ae00b4e10e", false)]
    #[case::fail_short_input("4cee90eb86eaa050036147a12d49004b6a", false)]
    fn verify_cases(#[case] input: &str, #[case] expect_valid: bool) {
        let input = hex::decode(input).unwrap();
        let out = p256_verify(&input, 3_500).unwrap();
        assert_eq!(out.gas_used, P256VERIFY_BASE);
        assert_eq!(out.bytes, bool_to_word(expect_valid));
    }

    #[test]
    fn not_enough_gas_errors() {
        let result = p256_verify(&[0u8; 160], 2_500);
        assert_eq!(result.unwrap_err(), PrecompileError::OutOfGas);
    }
}
