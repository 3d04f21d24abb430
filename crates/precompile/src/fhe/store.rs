//! Process-wide ciphertext handle store.
//!
//! Handles are content-derived: `keccak256(ciphertext)`. Entries carry the
//! type tag recorded at store time and are immutable once inserted. The
//! store lives for the process; a durable variant would back it by the
//! chain state layer.
use super::provider::FheType;
use alloy_primitives::{keccak256, Bytes, B256};
use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    sync::RwLock,
};

type Store = RwLock<HashMap<B256, (Bytes, FheType)>>;

fn store() -> &'static Store {
    static STORE: OnceCell<Store> = OnceCell::new();
    STORE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Inserts a ciphertext and returns its handle. Re-inserting identical
/// bytes is a no-op yielding the same handle.
pub fn insert(ciphertext: Vec<u8>, ty: FheType) -> B256 {
    let handle = keccak256(&ciphertext);
    let mut guard = store().write().expect("fhe store poisoned");
    guard.entry(handle).or_insert((ciphertext.into(), ty));
    handle
}

/// Looks a handle up, returning the ciphertext and its recorded type.
pub fn get(handle: &B256) -> Option<(Bytes, FheType)> {
    let guard = store().read().expect("fhe store poisoned");
    guard.get(handle).cloned()
}

/// Whether a handle is present.
pub fn contains(handle: &B256) -> bool {
    let guard = store().read().expect("fhe store poisoned");
    guard.contains_key(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_content_derived_and_stable() {
        let first = insert(vec![1, 2, 3], FheType::U8);
        let second = insert(vec![1, 2, 3], FheType::U8);
        assert_eq!(first, second);
        assert_eq!(first, keccak256([1, 2, 3]));

        let (bytes, ty) = get(&first).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 2, 3]);
        assert_eq!(ty, FheType::U8);
    }

    #[test]
    fn missing_handle_is_none() {
        assert!(get(&B256::repeat_byte(0xfe)).is_none());
        assert!(!contains(&B256::repeat_byte(0xfe)));
    }
}
