//! # pars-precompile
//!
//! Precompiled contracts for the Pars execution layer: post-quantum
//! signature verification (ML-DSA, Ringtail), key encapsulation (ML-KEM),
//! linkable ring signatures over secp256k1, homomorphic evaluation over
//! encrypted integers, and the AI-compute work-proof accounting core.
//!
//! Every precompile exposes gas computed purely from its input and a
//! byte-deterministic output. Stateless engines are plain functions;
//! state-bearing handlers (AI-mining, the threshold manager facade)
//! implement [`StatefulPrecompile`] over the narrow [`state::StateDB`]
//! surface.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod ai_mining;
pub mod crypto;
pub mod fhe;
pub mod gas;
pub mod interface;
pub mod mlkem;
pub mod ring_sig;
pub mod ringtail;
pub mod secp256r1;
pub mod state;
pub mod utilities;

pub use crypto::{crypto, install_crypto, Crypto, DefaultCrypto};
pub use interface::{
    CallContext, PrecompileEntry, PrecompileError, PrecompileFn, PrecompileOutput,
    PrecompileResult, PrecompileWithAddress, StatefulPrecompile, StatefulPrecompileArc,
};
pub use state::{MemoryState, StateDB};

use alloy_primitives::Address;
use once_cell::sync::OnceCell;
use std::{collections::HashMap, sync::Arc};

/// Const function for making an address by concatenating the bytes from a
/// given number. Convenience for the low-address precompiles.
pub const fn u64_to_address(x: u64) -> Address {
    let x = x.to_be_bytes();
    Address::new([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7],
    ])
}

/// Address with a two-byte prefix and zero tail, e.g. `0x0300…` for the
/// AI-mining precompile.
pub const fn prefix_address(prefix: u16) -> Address {
    let p = prefix.to_be_bytes();
    Address::new([
        p[0], p[1], 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ])
}

/// Address in the post-quantum range: `0x02` prefix with a two-byte
/// big-endian suffix, e.g. `0x0200…0007` for ML-KEM.
pub const fn pq_address(suffix: u16) -> Address {
    let s = suffix.to_be_bytes();
    Address::new([
        0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, s[0], s[1],
    ])
}

/// The Pars precompile set.
#[derive(Clone, Debug, Default)]
pub struct Precompiles {
    inner: HashMap<Address, PrecompileEntry>,
}

impl Precompiles {
    /// Returns the full suite behind a process-wide singleton.
    pub fn pars() -> &'static Self {
        static INSTANCE: OnceCell<Precompiles> = OnceCell::new();
        INSTANCE.get_or_init(|| {
            let mut precompiles = Self::default();
            precompiles.extend([
                secp256r1::P256VERIFY,
                mlkem::ML_KEM,
                mlkem::ML_KEM_BATCH,
                ringtail::RINGTAIL_VERIFY,
                ring_sig::RING_SIG,
                fhe::FHE,
            ]);
            precompiles.insert_stateful(
                ai_mining::ADDRESS,
                Arc::new(ai_mining::AiMiningPrecompile),
            );
            precompiles
        })
    }

    /// Extends the set with standard precompiles. Later entries overwrite
    /// earlier ones at the same address.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = PrecompileWithAddress>) {
        self.inner.extend(entries.into_iter().map(Into::into));
    }

    /// Registers a stateful precompile.
    pub fn insert_stateful(&mut self, address: Address, precompile: StatefulPrecompileArc) {
        self.inner
            .insert(address, PrecompileEntry::Stateful(precompile));
    }

    /// Returns the registered addresses.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.inner.keys()
    }

    /// Whether an address hosts a precompile.
    pub fn contains(&self, address: &Address) -> bool {
        self.inner.contains_key(address)
    }

    /// Looks up the entry at an address.
    pub fn get(&self, address: &Address) -> Option<&PrecompileEntry> {
        self.inner.get(address)
    }

    /// Number of registered precompiles.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Calls the precompile at `address`, routing stateless entries past
    /// the state layer. Returns `None` when the address hosts nothing.
    pub fn call(
        &self,
        state: &mut dyn StateDB,
        ctx: &CallContext,
        input: &[u8],
        gas_limit: u64,
    ) -> Option<PrecompileResult> {
        let entry = self.inner.get(&ctx.address)?;
        Some(match entry {
            PrecompileEntry::Standard(precompile) => precompile(input, gas_limit),
            PrecompileEntry::Stateful(precompile) => {
                precompile.run(state, ctx, input, gas_limit)
            }
        })
    }
}
