//! Read facade over the key manager at the threshold precompile address.
//!
//! ABI-style 4-byte selectors (big-endian u32 with the low 24 bits zero):
//! `0x01 getPublicKey(keyId)`, `0x02 getAddress(keyId)`,
//! `0x03 verifySignature(keyId, msgLen:u32, msg, sigLen:u32, sig)`,
//! `0x04 getKeyStatus(keyId)`. All operations are read-only; the
//! request/complete lifecycle stays a host-API concern.
use crate::{manager::KeyManager, types::KeyStatus};
use alloy_primitives::{Address, Bytes, B256};
use pars_precompile::{
    gas::threshold as gas,
    prefix_address,
    utilities::{bool_to_word, read_length_prefixed, read_u32_be},
    CallContext, PrecompileError, PrecompileOutput, PrecompileResult, StateDB,
    StatefulPrecompile,
};
use std::sync::Arc;

/// Threshold-manager precompile address (`0x0800…`, right-padded).
pub const ADDRESS: Address = prefix_address(0x0800);

/// getPublicKey selector byte.
pub const SELECTOR_GET_PUBLIC_KEY: u8 = 0x01;
/// getAddress selector byte.
pub const SELECTOR_GET_ADDRESS: u8 = 0x02;
/// verifySignature selector byte.
pub const SELECTOR_VERIFY_SIGNATURE: u8 = 0x03;
/// getKeyStatus selector byte.
pub const SELECTOR_GET_KEY_STATUS: u8 = 0x04;

/// The manager facade.
pub struct ThresholdPrecompile {
    manager: Arc<KeyManager>,
}

impl ThresholdPrecompile {
    /// Wraps a shared manager.
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    fn selector(input: &[u8]) -> Option<u8> {
        let word = read_u32_be(input, 0)?;
        if word & 0x00ff_ffff != 0 {
            return None;
        }
        Some((word >> 24) as u8)
    }

    fn status_word(status: KeyStatus) -> Bytes {
        let tag = match status {
            KeyStatus::Active => 1u8,
            KeyStatus::Refreshing => 2,
            KeyStatus::Resharing => 3,
            KeyStatus::Expired => 4,
            KeyStatus::Revoked => 5,
        };
        B256::with_last_byte(tag).into()
    }
}

impl StatefulPrecompile for ThresholdPrecompile {
    fn required_gas(&self, input: &[u8]) -> u64 {
        match Self::selector(input) {
            Some(SELECTOR_VERIFY_SIGNATURE) => gas::VERIFY_SIGNATURE,
            Some(
                SELECTOR_GET_PUBLIC_KEY | SELECTOR_GET_ADDRESS | SELECTOR_GET_KEY_STATUS,
            ) => gas::READ_BASE,
            _ => 0,
        }
    }

    fn run(
        &self,
        _state: &mut dyn StateDB,
        _ctx: &CallContext,
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
        if args.len() < 32 {
            return Err(PrecompileError::InvalidInputLength);
        }
        let key_id = B256::from_slice(&args[..32]);

        let not_found = |_| PrecompileError::other("key not found");
        let bytes: Bytes = match selector {
            SELECTOR_GET_PUBLIC_KEY => self.manager.get_public_key(key_id).map_err(not_found)?,
            SELECTOR_GET_ADDRESS => {
                let address = self.manager.get_address(key_id).map_err(not_found)?;
                let mut word = B256::ZERO;
                word[12..].copy_from_slice(address.as_slice());
                word.into()
            }
            SELECTOR_GET_KEY_STATUS => {
                let key = self.manager.get_key(key_id).map_err(not_found)?;
                Self::status_word(key.status)
            }
            SELECTOR_VERIFY_SIGNATURE => {
                let (message, next) = read_length_prefixed(args, 32)
                    .ok_or(PrecompileError::InvalidInputLength)?;
                let (signature, _) = read_length_prefixed(args, next)
                    .ok_or(PrecompileError::InvalidInputLength)?;
                let valid = self
                    .manager
                    .verify_signature(key_id, message, signature)
                    .unwrap_or(false);
                bool_to_word(valid)
            }
            _ => return Err(PrecompileError::UnknownSelector),
        };

        Ok(PrecompileOutput::new(cost, bytes))
    }
}

/// Registers the facade on a precompile set.
pub fn register(precompiles: &mut pars_precompile::Precompiles, manager: Arc<KeyManager>) {
    precompiles.insert_stateful(ADDRESS, Arc::new(ThresholdPrecompile::new(manager)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyType, Protocol};
    use pars_precompile::MemoryState;

    fn ctx() -> CallContext {
        CallContext::new(Address::repeat_byte(0xaa), ADDRESS, true, 1_700_000_000)
    }

    fn seeded_manager() -> (Arc<KeyManager>, B256) {
        let manager = Arc::new(KeyManager::default());
        let owner = Address::repeat_byte(0x11);
        let request_id = manager
            .request_keygen(
                owner,
                Protocol::Lss,
                KeyType::Secp256k1,
                1,
                3,
                (0..3).map(|i| Address::repeat_byte(i + 1)).collect(),
            )
            .unwrap();
        let pk = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        let key_id = manager
            .complete_keygen(request_id, pk.into())
            .unwrap()
            .key_id;
        (manager, key_id)
    }

    #[test]
    fn reads_through_the_facade() {
        let (manager, key_id) = seeded_manager();
        let precompile = ThresholdPrecompile::new(manager.clone());
        let mut state = MemoryState::new();

        let mut input = vec![SELECTOR_GET_PUBLIC_KEY, 0, 0, 0];
        input.extend_from_slice(key_id.as_slice());
        let out = precompile.run(&mut state, &ctx(), &input, 100_000).unwrap();
        assert_eq!(out.bytes, manager.get_public_key(key_id).unwrap());
        assert_eq!(out.gas_used, gas::READ_BASE);

        let mut input = vec![SELECTOR_GET_KEY_STATUS, 0, 0, 0];
        input.extend_from_slice(key_id.as_slice());
        let out = precompile.run(&mut state, &ctx(), &input, 100_000).unwrap();
        assert_eq!(out.bytes, Bytes::from(B256::with_last_byte(1).to_vec()));
    }

    #[test]
    fn address_read_is_left_padded() {
        let (manager, key_id) = seeded_manager();
        let precompile = ThresholdPrecompile::new(manager.clone());
        let mut state = MemoryState::new();

        let mut input = vec![SELECTOR_GET_ADDRESS, 0, 0, 0];
        input.extend_from_slice(key_id.as_slice());
        let out = precompile.run(&mut state, &ctx(), &input, 100_000).unwrap();
        assert_eq!(out.bytes.len(), 32);
        assert_eq!(
            &out.bytes[12..],
            manager.get_address(key_id).unwrap().as_slice()
        );
    }

    #[test]
    fn unknown_key_is_a_call_failure() {
        let (manager, _) = seeded_manager();
        let precompile = ThresholdPrecompile::new(manager);
        let mut state = MemoryState::new();
        let mut input = vec![SELECTOR_GET_PUBLIC_KEY, 0, 0, 0];
        input.extend_from_slice(B256::repeat_byte(0xee).as_slice());
        assert!(precompile.run(&mut state, &ctx(), &input, 100_000).is_err());
    }
}
