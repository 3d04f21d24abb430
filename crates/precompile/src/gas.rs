//! Gas schedule for the Pars precompile suite.
//!
//! All constants live here, grouped per precompile, so a schedule change is
//! a data edit rather than a code edit.

/// secp256r1 (P-256) signature verification.
pub mod secp256r1 {
    /// Base gas fee for the p256verify operation.
    pub const P256VERIFY_BASE: u64 = 3_450;
}

/// AI-mining precompile.
pub mod ai_mining {
    /// ML-DSA verification, flat across levels; the level is fixed by the
    /// public-key length before any cryptographic work.
    pub const VERIFY_MLDSA: u64 = 25_000;
    /// Reward calculation from a decoded work proof.
    pub const CALCULATE_REWARD: u64 = 5_000;
    /// TEE attestation receipt check.
    pub const VERIFY_TEE: u64 = 15_000;
    /// Spent-set read.
    pub const IS_SPENT: u64 = 2_100;
    /// Spent-set write.
    pub const MARK_SPENT: u64 = 22_100;
    /// BLAKE3 work-id derivation.
    pub const COMPUTE_WORK_ID: u64 = 3_000;
}

/// ML-KEM precompile, per mode {512, 768, 1024}.
pub mod mlkem {
    /// Encapsulation cost indexed by mode.
    pub const ENCAPSULATE: [u64; 3] = [12_000, 16_000, 22_000];
    /// Decapsulation cost indexed by mode.
    pub const DECAPSULATE: [u64; 3] = [14_000, 18_000, 24_000];
    /// Flat base for a batched call, on top of the per-item cost.
    pub const BATCH_BASE: u64 = 10_000;
    /// Batch discount applied when a parallel provider is installed and the
    /// batch is at least [`PARALLEL_THRESHOLD`] items: cost is multiplied by
    /// `PARALLEL_DISCOUNT_NUM / PARALLEL_DISCOUNT_DEN` (~30% off).
    pub const PARALLEL_DISCOUNT_NUM: u64 = 7;
    /// Denominator of the batch discount factor.
    pub const PARALLEL_DISCOUNT_DEN: u64 = 10;
    /// Minimum batch size for the discount.
    pub const PARALLEL_THRESHOLD: u16 = 8;
}

/// LSAG ring-signature precompile.
pub mod ring_sig {
    /// Base cost of signing.
    pub const SIGN_BASE: u64 = 8_000;
    /// Per-ring-member cost of signing.
    pub const SIGN_PER_MEMBER: u64 = 3_000;
    /// Per-message-byte cost of signing.
    pub const SIGN_PER_BYTE: u64 = 12;
    /// Base cost of verification.
    pub const VERIFY_BASE: u64 = SIGN_BASE - 1_000;
    /// Per-ring-member cost of verification.
    pub const VERIFY_PER_MEMBER: u64 = SIGN_PER_MEMBER - 500;
    /// Flat cost of key-image derivation.
    pub const COMPUTE_KEY_IMAGE: u64 = 5_000;
}

/// Ringtail threshold-signature verification.
pub mod ringtail {
    /// Base verification cost.
    pub const VERIFY_BASE: u64 = 40_000;
    /// Per-party verification cost.
    pub const VERIFY_PER_PARTY: u64 = 8_000;
    /// GPU-provider cost factor: cost is multiplied by
    /// `GPU_FACTOR_NUM / GPU_FACTOR_DEN` (0.60).
    pub const GPU_FACTOR_NUM: u64 = 3;
    /// Denominator of the GPU cost factor.
    pub const GPU_FACTOR_DEN: u64 = 5;
}

/// FHE precompile, per operation class.
pub mod fhe {
    /// add / sub and their scalar forms.
    pub const ARITH: u64 = 50_000;
    /// mul and scalar mul.
    pub const MUL: u64 = 120_000;
    /// div / rem and their scalar forms.
    pub const DIV: u64 = 200_000;
    /// Comparisons (lt, le, gt, ge, eq, ne) and min/max.
    pub const COMPARE: u64 = 60_000;
    /// and / or / xor.
    pub const BITWISE: u64 = 40_000;
    /// not / neg.
    pub const UNARY: u64 = 30_000;
    /// shl / shr / rotl / rotr.
    pub const SHIFT: u64 = 45_000;
    /// select over an encrypted condition.
    pub const SELECT: u64 = 70_000;
    /// Width cast.
    pub const CAST: u64 = 35_000;
    /// Trivial encryption of a 32-byte plaintext.
    pub const ENCRYPT: u64 = 25_000;
    /// Decryption to a 32-byte word.
    pub const DECRYPT: u64 = 25_000;
    /// Caller-seeded encrypted randomness.
    pub const RAND: u64 = 30_000;
    /// Handle existence proof.
    pub const VERIFY: u64 = 5_000;
    /// Re-encryption of an output under a caller key.
    pub const SEAL_OUTPUT: u64 = 60_000;
}

/// Threshold-manager read facade.
pub mod threshold {
    /// Key metadata reads (public key, address, status).
    pub const READ_BASE: u64 = 3_000;
    /// Signature verification through the manager.
    pub const VERIFY_SIGNATURE: u64 = 12_000;
}
