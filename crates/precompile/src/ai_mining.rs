//! AI-mining precompile.
//!
//! Accounts for off-chain AI compute: ML-DSA work-proof signatures, reward
//! math over the decoded proof, TEE attestation receipts and a
//! replay-resistant spent-set persisted in the precompile's own storage.
//!
//! Selectors are the first 4 input bytes, big-endian with the low 24 bits
//! zero. Variable-length arguments carry 4-byte big-endian length prefixes.
use crate::{
    crypto::{crypto, MlDsaLevel},
    gas::ai_mining as gas,
    interface::{CallContext, PrecompileError, PrecompileOutput, PrecompileResult},
    state::StateDB,
    utilities::{bool_to_word, read_length_prefixed, read_u16_be, read_u32_be, read_u64_be},
    StatefulPrecompile,
};
use alloy_primitives::{Address, Bytes, B256, U256};

/// AI-mining precompile address (`0x0300…`, right-padded).
pub const ADDRESS: Address = crate::prefix_address(0x0300);

/// verifyMLDSA selector byte.
pub const SELECTOR_VERIFY_MLDSA: u8 = 0x01;
/// calculateReward selector byte.
pub const SELECTOR_CALCULATE_REWARD: u8 = 0x02;
/// verifyTEE selector byte.
pub const SELECTOR_VERIFY_TEE: u8 = 0x03;
/// isSpent selector byte.
pub const SELECTOR_IS_SPENT: u8 = 0x04;
/// markSpent selector byte.
pub const SELECTOR_MARK_SPENT: u8 = 0x05;
/// computeWorkId selector byte.
pub const SELECTOR_COMPUTE_WORK_ID: u8 = 0x06;

/// Minimum work-proof length: the fixed prefix before the TEE quote.
pub const MIN_WORK_PROOF_LEN: usize = 78;

/// Minimum TEE receipt length: device id, timestamp and nonce.
pub const MIN_TEE_RECEIPT_LEN: usize = 48;

/// Reward denominator for the basis-point privacy multipliers.
const BASIS_POINTS: u64 = 10_000;

/// Base reward in atomic units (one whole token).
const BASE_REWARD: u64 = 1_000_000_000_000_000_000;

/// Domain tag for spent-set storage slots.
const SPENT_DOMAIN: &[u8; 4] = b"spnt";

/// Sentinel written to a spent slot. Any non-zero word reads as spent.
const SPENT_SENTINEL: B256 = B256::with_last_byte(1);

/// Decoded work proof, fixed-prefix big-endian layout:
/// `deviceId:32 ‖ nonce:32 ‖ timestamp:u64 ‖ privacy:u16 ‖
/// computeMinutes:u32 ‖ teeQuote:*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkProof {
    /// Stable identifier of the mining device.
    pub device_id: B256,
    /// Per-proof nonce.
    pub nonce: B256,
    /// Proof creation time, UTC seconds.
    pub timestamp: u64,
    /// Privacy level, 1 through 4.
    pub privacy: u16,
    /// Metered compute, in minutes.
    pub compute_minutes: u32,
    /// Opaque TEE quote trailing the fixed prefix.
    pub tee_quote: Vec<u8>,
}

impl WorkProof {
    /// Decodes a work proof, rejecting anything below the minimum length.
    pub fn decode(data: &[u8]) -> Result<Self, PrecompileError> {
        if data.len() < MIN_WORK_PROOF_LEN {
            return Err(PrecompileError::WorkProofTooShort);
        }
        Ok(Self {
            device_id: B256::from_slice(&data[..32]),
            nonce: B256::from_slice(&data[32..64]),
            timestamp: read_u64_be(data, 64).expect("length checked"),
            privacy: read_u16_be(data, 72).expect("length checked"),
            compute_minutes: read_u32_be(data, 74).expect("length checked"),
            tee_quote: data[MIN_WORK_PROOF_LEN..].to_vec(),
        })
    }
}

/// Basis-point multiplier for a privacy level.
pub fn privacy_multiplier(privacy: u16) -> Result<u64, PrecompileError> {
    match privacy {
        1 => Ok(2_500),
        2 => Ok(5_000),
        3 => Ok(10_000),
        4 => Ok(15_000),
        _ => Err(PrecompileError::InvalidPrivacyLevel),
    }
}

/// Chain-specific reward adjustment. The identity for all known chains; a
/// fork would turn this into a table lookup.
fn chain_adjusted(reward: U256, _chain_id: u64) -> U256 {
    reward
}

/// Reward for a work proof on a chain:
/// `baseReward · computeMinutes · multiplier / 10000`.
pub fn calculate_reward(work_proof: &[u8], chain_id: u64) -> Result<U256, PrecompileError> {
    let proof = WorkProof::decode(work_proof)?;
    let multiplier = privacy_multiplier(proof.privacy)?;
    let reward = U256::from(BASE_REWARD)
        * U256::from(proof.compute_minutes)
        * U256::from(multiplier)
        / U256::from(BASIS_POINTS);
    Ok(chain_adjusted(reward, chain_id))
}

/// ML-DSA verification with the level selected by the public-key length.
pub fn verify_mldsa(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<bool, PrecompileError> {
    let level = MlDsaLevel::from_public_key_len(public_key.len())
        .ok_or(PrecompileError::UnknownMlDsaLevel)?;
    if signature.len() != level.signature_len() {
        return Err(PrecompileError::MlDsaLengthMismatch);
    }
    crypto().mldsa_verify(level, public_key, message, signature)
}

/// TEE attestation receipt check.
///
/// The receipt must carry `{deviceId:32, timestamp:u64, nonce:u64}` followed
/// by a certificate chain. Signature validation against the platform root CA
/// is a provider upgrade; a non-empty signature is required.
pub fn verify_tee(receipt: &[u8], signature: &[u8]) -> Result<bool, PrecompileError> {
    if receipt.len() < MIN_TEE_RECEIPT_LEN {
        return Err(PrecompileError::InvalidInputLength);
    }
    Ok(!signature.is_empty())
}

/// Work id: `BLAKE3(deviceId ‖ nonce ‖ chainId-big-endian:8)`.
pub fn compute_work_id(device_id: &B256, nonce: &B256, chain_id: u64) -> B256 {
    let mut buf = [0u8; 72];
    buf[..32].copy_from_slice(device_id.as_slice());
    buf[32..64].copy_from_slice(nonce.as_slice());
    buf[64..].copy_from_slice(&chain_id.to_be_bytes());
    B256::from(crypto().blake3(&buf))
}

/// Storage slot for a work id in the spent set.
pub fn spent_slot(work_id: &B256) -> B256 {
    let mut buf = [0u8; 36];
    buf[..4].copy_from_slice(SPENT_DOMAIN);
    buf[4..].copy_from_slice(work_id.as_slice());
    B256::from(crypto().blake3(&buf))
}

/// Reads the spent set.
pub fn is_spent(state: &dyn StateDB, precompile: Address, work_id: &B256) -> bool {
    state.storage(precompile, spent_slot(work_id)) != B256::ZERO
}

/// Marks a work id spent. Fails on the second call for the same id; the
/// sentinel is never cleared.
pub fn mark_spent(
    state: &mut dyn StateDB,
    precompile: Address,
    work_id: &B256,
) -> Result<(), PrecompileError> {
    if is_spent(state, precompile, work_id) {
        return Err(PrecompileError::WorkAlreadySpent);
    }
    state.set_storage(precompile, spent_slot(work_id), SPENT_SENTINEL);
    Ok(())
}

/// The AI-mining stateful precompile.
#[derive(Clone, Debug, Default)]
pub struct AiMiningPrecompile;

impl AiMiningPrecompile {
    /// Parses the 4-byte selector: op byte followed by three zero bytes.
    fn selector(input: &[u8]) -> Option<u8> {
        let word = read_u32_be(input, 0)?;
        if word & 0x00ff_ffff != 0 {
            return None;
        }
        Some((word >> 24) as u8)
    }
}

impl StatefulPrecompile for AiMiningPrecompile {
    fn required_gas(&self, input: &[u8]) -> u64 {
        match Self::selector(input) {
            Some(SELECTOR_VERIFY_MLDSA) => gas::VERIFY_MLDSA,
            Some(SELECTOR_CALCULATE_REWARD) => gas::CALCULATE_REWARD,
            Some(SELECTOR_VERIFY_TEE) => gas::VERIFY_TEE,
            Some(SELECTOR_IS_SPENT) => gas::IS_SPENT,
            Some(SELECTOR_MARK_SPENT) => gas::MARK_SPENT,
            Some(SELECTOR_COMPUTE_WORK_ID) => gas::COMPUTE_WORK_ID,
            _ => 0,
        }
    }

    fn run(
        &self,
        state: &mut dyn StateDB,
        ctx: &CallContext,
        input: &[u8],
        gas_limit: u64,
    ) -> PrecompileResult {
        let selector = Self::selector(input).ok_or(PrecompileError::UnknownSelector)?;
        let cost = self.required_gas(input);
        if cost == 0 {
            return Err(PrecompileError::UnknownSelector);
        }
        if cost > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }
        let args = &input[4..];

        let bytes: Bytes = match selector {
            SELECTOR_VERIFY_MLDSA => {
                let (pk, next) =
                    read_length_prefixed(args, 0).ok_or(PrecompileError::InvalidInputLength)?;
                let (msg, next) =
                    read_length_prefixed(args, next).ok_or(PrecompileError::InvalidInputLength)?;
                let (sig, _) =
                    read_length_prefixed(args, next).ok_or(PrecompileError::InvalidInputLength)?;
                bool_to_word(verify_mldsa(pk, msg, sig)?)
            }
            SELECTOR_CALCULATE_REWARD => {
                let (proof, next) =
                    read_length_prefixed(args, 0).ok_or(PrecompileError::InvalidInputLength)?;
                let chain_id =
                    read_u64_be(args, next).ok_or(PrecompileError::InvalidInputLength)?;
                let reward = calculate_reward(proof, chain_id)?;
                reward.to_be_bytes::<32>().to_vec().into()
            }
            SELECTOR_VERIFY_TEE => {
                let (receipt, next) =
                    read_length_prefixed(args, 0).ok_or(PrecompileError::InvalidInputLength)?;
                let (sig, _) =
                    read_length_prefixed(args, next).ok_or(PrecompileError::InvalidInputLength)?;
                bool_to_word(verify_tee(receipt, sig)?)
            }
            SELECTOR_IS_SPENT => {
                let work_id = read_work_id(args)?;
                bool_to_word(is_spent(state, ctx.address, &work_id))
            }
            SELECTOR_MARK_SPENT => {
                if ctx.read_only {
                    return Err(PrecompileError::ReadOnlyViolation);
                }
                let work_id = read_work_id(args)?;
                mark_spent(state, ctx.address, &work_id)?;
                bool_to_word(true)
            }
            SELECTOR_COMPUTE_WORK_ID => {
                if args.len() != 72 {
                    return Err(PrecompileError::InvalidInputLength);
                }
                let device_id = B256::from_slice(&args[..32]);
                let nonce = B256::from_slice(&args[32..64]);
                let chain_id = read_u64_be(args, 64).expect("length checked");
                compute_work_id(&device_id, &nonce, chain_id).to_vec().into()
            }
            _ => return Err(PrecompileError::UnknownSelector),
        };

        Ok(PrecompileOutput::new(cost, bytes))
    }
}

fn read_work_id(args: &[u8]) -> Result<B256, PrecompileError> {
    if args.len() != 32 {
        return Err(PrecompileError::InvalidInputLength);
    }
    Ok(B256::from_slice(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryState;
    use pqcrypto_mldsa::mldsa65;
    use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _};

    fn ctx(read_only: bool) -> CallContext {
        CallContext::new(Address::repeat_byte(0xaa), ADDRESS, read_only, 1_700_000_000)
    }

    fn selector_bytes(op: u8) -> [u8; 4] {
        [op, 0, 0, 0]
    }

    fn with_prefix(arg: &[u8]) -> Vec<u8> {
        let mut out = (arg.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(arg);
        out
    }

    fn proof_bytes(privacy: u16, minutes: u32) -> Vec<u8> {
        let mut proof = vec![0u8; MIN_WORK_PROOF_LEN];
        proof[0] = 0x01;
        proof[32] = 0x02;
        proof[64..72].copy_from_slice(&1_700_000_000u64.to_be_bytes());
        proof[72..74].copy_from_slice(&privacy.to_be_bytes());
        proof[74..78].copy_from_slice(&minutes.to_be_bytes());
        proof
    }

    #[test]
    fn reward_confidential_hour() {
        // privacy 3 (Confidential), 60 minutes, chain 96369
        let reward = calculate_reward(&proof_bytes(3, 60), 96_369).unwrap();
        let expected = U256::from(60u64) * U256::from(BASE_REWARD);
        assert_eq!(reward, expected);
    }

    #[test]
    fn reward_rejects_unknown_privacy() {
        assert_eq!(
            calculate_reward(&proof_bytes(7, 60), 96_369).unwrap_err(),
            PrecompileError::InvalidPrivacyLevel
        );
    }

    #[test]
    fn reward_rejects_short_proof() {
        assert_eq!(
            calculate_reward(&[0u8; MIN_WORK_PROOF_LEN - 1], 96_369).unwrap_err(),
            PrecompileError::WorkProofTooShort
        );
    }

    #[test]
    fn work_id_is_deterministic_and_nonce_sensitive() {
        let mut device = B256::ZERO;
        device.0[..3].copy_from_slice(&[1, 2, 3]);
        let mut nonce = B256::ZERO;
        nonce.0[..3].copy_from_slice(&[4, 5, 6]);

        let first = compute_work_id(&device, &nonce, 96_369);
        let second = compute_work_id(&device, &nonce, 96_369);
        assert_eq!(first, second);

        let mut other_nonce = B256::ZERO;
        other_nonce.0[..3].copy_from_slice(&[7, 8, 9]);
        assert_ne!(first, compute_work_id(&device, &other_nonce, 96_369));
    }

    #[test]
    fn spent_set_is_idempotent_failing() {
        let mut state = MemoryState::new();
        let work_id = B256::repeat_byte(0x42);

        assert!(!is_spent(&state, ADDRESS, &work_id));
        mark_spent(&mut state, ADDRESS, &work_id).unwrap();
        assert!(is_spent(&state, ADDRESS, &work_id));
        assert_eq!(
            mark_spent(&mut state, ADDRESS, &work_id).unwrap_err(),
            PrecompileError::WorkAlreadySpent
        );
        assert!(is_spent(&state, ADDRESS, &work_id));
    }

    #[test]
    fn mark_spent_rejects_static_calls() {
        let mut state = MemoryState::new();
        let mut input = selector_bytes(SELECTOR_MARK_SPENT).to_vec();
        input.extend_from_slice(B256::repeat_byte(0x11).as_slice());

        let pre = AiMiningPrecompile;
        let err = pre
            .run(&mut state, &ctx(true), &input, 1_000_000)
            .unwrap_err();
        assert_eq!(err, PrecompileError::ReadOnlyViolation);
        assert_eq!(state.storage_len(), 0);
    }

    #[test]
    fn mark_spent_through_dispatcher_twice() {
        let mut state = MemoryState::new();
        let mut input = selector_bytes(SELECTOR_MARK_SPENT).to_vec();
        input.extend_from_slice(B256::repeat_byte(0x11).as_slice());

        let pre = AiMiningPrecompile;
        let out = pre.run(&mut state, &ctx(false), &input, 1_000_000).unwrap();
        assert_eq!(out.gas_used, gas::MARK_SPENT);
        assert_eq!(
            pre.run(&mut state, &ctx(false), &input, 1_000_000)
                .unwrap_err(),
            PrecompileError::WorkAlreadySpent
        );

        let mut query = selector_bytes(SELECTOR_IS_SPENT).to_vec();
        query.extend_from_slice(B256::repeat_byte(0x11).as_slice());
        let out = pre.run(&mut state, &ctx(true), &query, 1_000_000).unwrap();
        assert_eq!(out.bytes, bool_to_word(true));
    }

    #[test]
    fn out_of_gas_leaves_state_untouched() {
        let mut state = MemoryState::new();
        let mut input = selector_bytes(SELECTOR_MARK_SPENT).to_vec();
        input.extend_from_slice(B256::repeat_byte(0x11).as_slice());

        let err = AiMiningPrecompile
            .run(&mut state, &ctx(false), &input, gas::MARK_SPENT - 1)
            .unwrap_err();
        assert_eq!(err, PrecompileError::OutOfGas);
        assert_eq!(state.storage_len(), 0);
    }

    #[test]
    fn verify_mldsa_dispatches_on_key_length() {
        let (pk, sk) = mldsa65::keypair();
        let msg = b"proof of useful work";
        let sig = mldsa65::detached_sign(msg, &sk);

        assert!(verify_mldsa(pk.as_bytes(), msg, sig.as_bytes()).unwrap());

        // mismatched signature size for the level fails validation
        assert_eq!(
            verify_mldsa(pk.as_bytes(), msg, &sig.as_bytes()[..2420]).unwrap_err(),
            PrecompileError::MlDsaLengthMismatch
        );
        // unknown key length fails before any crypto
        assert_eq!(
            verify_mldsa(&[0u8; 100], msg, sig.as_bytes()).unwrap_err(),
            PrecompileError::UnknownMlDsaLevel
        );
    }

    #[test]
    fn verify_mldsa_through_dispatcher() {
        let (pk, sk) = mldsa65::keypair();
        let msg = b"dispatched";
        let sig = mldsa65::detached_sign(msg, &sk);

        let mut input = selector_bytes(SELECTOR_VERIFY_MLDSA).to_vec();
        input.extend(with_prefix(pk.as_bytes()));
        input.extend(with_prefix(msg));
        input.extend(with_prefix(sig.as_bytes()));

        let mut state = MemoryState::new();
        let out = AiMiningPrecompile
            .run(&mut state, &ctx(true), &input, 1_000_000)
            .unwrap();
        assert_eq!(out.bytes, bool_to_word(true));
    }

    #[test]
    fn tee_receipt_validation() {
        let receipt = vec![0u8; MIN_TEE_RECEIPT_LEN];
        assert!(verify_tee(&receipt, &[1]).unwrap());
        assert!(!verify_tee(&receipt, &[]).unwrap());
        assert!(verify_tee(&receipt[..47], &[1]).is_err());
    }

    #[test]
    fn unknown_selector_is_fatal() {
        let mut state = MemoryState::new();
        let err = AiMiningPrecompile
            .run(&mut state, &ctx(false), &[0x99, 0, 0, 0], 1_000_000)
            .unwrap_err();
        assert_eq!(err, PrecompileError::UnknownSelector);
    }
}
