//! Key/value state access for stateful precompiles.
//!
//! The surface is deliberately narrow: 32-byte words under a
//! `(address, key)` pair plus balance arithmetic for transfer simulation.
//! Linear-memory semantics; a caller-initiated revert is the host's job.
use crate::interface::PrecompileError;
use alloy_primitives::{Address, B256, U256};
use std::collections::HashMap;

/// Host state seen by precompiles.
///
/// A precompile never reads or writes outside its own address except for
/// balance simulation.
pub trait StateDB {
    /// Reads the 32-byte word stored under `(address, key)`. Absent slots
    /// read as zero.
    fn storage(&self, address: Address, key: B256) -> B256;

    /// Writes a 32-byte word under `(address, key)`.
    fn set_storage(&mut self, address: Address, key: B256, value: B256);

    /// Balance of `address`.
    fn balance(&self, address: Address) -> U256;

    /// Credits `amount` to `address`.
    fn add_balance(&mut self, address: Address, amount: U256);

    /// Debits `amount` from `address`, failing if the balance is too low.
    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), PrecompileError>;
}

/// In-memory [`StateDB`], the reference host for unit tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    storage: HashMap<(Address, B256), B256>,
    balances: HashMap<Address, U256>,
}

impl MemoryState {
    /// Returns an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-zero storage slots, across all addresses.
    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }
}

impl StateDB for MemoryState {
    fn storage(&self, address: Address, key: B256) -> B256 {
        self.storage
            .get(&(address, key))
            .copied()
            .unwrap_or(B256::ZERO)
    }

    fn set_storage(&mut self, address: Address, key: B256, value: B256) {
        self.storage.insert((address, key), value);
    }

    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or(U256::ZERO)
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        let entry = self.balances.entry(address).or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
    }

    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), PrecompileError> {
        let entry = self.balances.entry(address).or_insert(U256::ZERO);
        if *entry < amount {
            return Err(PrecompileError::InsufficientBalance);
        }
        *entry -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ADDR: Address = address!("0x0000000000000000000000000000000000000300");

    #[test]
    fn storage_roundtrip() {
        let mut state = MemoryState::new();
        let key = B256::with_last_byte(7);
        assert_eq!(state.storage(ADDR, key), B256::ZERO);
        state.set_storage(ADDR, key, B256::with_last_byte(1));
        assert_eq!(state.storage(ADDR, key), B256::with_last_byte(1));
    }

    #[test]
    fn balance_underflow_is_rejected() {
        let mut state = MemoryState::new();
        state.add_balance(ADDR, U256::from(10));
        assert!(state.sub_balance(ADDR, U256::from(11)).is_err());
        assert_eq!(state.balance(ADDR), U256::from(10));
        state.sub_balance(ADDR, U256::from(4)).unwrap();
        assert_eq!(state.balance(ADDR), U256::from(6));
    }
}
