//! Primitive provider for the precompiles.
//!
//! The [`Crypto`] trait is the narrow surface every cryptographic engine
//! calls through. Implementations may select CPU-only, GPU-accelerated or
//! hardware-attested backends at startup; the precompile contract (inputs,
//! outputs, gas) is invariant. [`DefaultCrypto`] wires the surface to the
//! in-tree libraries.
use crate::interface::PrecompileError;
use alloy_primitives::{keccak256, B256};
use core::fmt::Debug;
use once_cell::sync::OnceCell;
use pqcrypto_mldsa::{mldsa44, mldsa65, mldsa87};
use pqcrypto_mlkem::{mlkem1024, mlkem512, mlkem768};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _};

/// ML-DSA security level, fully determined by the public-key length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MlDsaLevel {
    /// ML-DSA-44, NIST level 2.
    L2,
    /// ML-DSA-65, NIST level 3.
    L3,
    /// ML-DSA-87, NIST level 5.
    L5,
}

impl MlDsaLevel {
    /// Selects the level from a public-key length, if any matches.
    pub fn from_public_key_len(len: usize) -> Option<Self> {
        match len {
            1312 => Some(Self::L2),
            1952 => Some(Self::L3),
            2592 => Some(Self::L5),
            _ => None,
        }
    }

    /// Public-key length in bytes.
    pub const fn public_key_len(self) -> usize {
        match self {
            Self::L2 => 1312,
            Self::L3 => 1952,
            Self::L5 => 2592,
        }
    }

    /// Detached-signature length in bytes.
    pub const fn signature_len(self) -> usize {
        match self {
            Self::L2 => 2420,
            Self::L3 => 3309,
            Self::L5 => 4627,
        }
    }
}

/// ML-KEM mode, selected by the wire-format mode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MlKemMode {
    /// ML-KEM-512, mode byte 0x00.
    Kem512,
    /// ML-KEM-768, mode byte 0x01.
    Kem768,
    /// ML-KEM-1024, mode byte 0x02.
    Kem1024,
}

impl MlKemMode {
    /// Selects the mode from the wire-format mode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Kem512),
            0x01 => Some(Self::Kem768),
            0x02 => Some(Self::Kem1024),
            _ => None,
        }
    }

    /// Index into per-mode gas tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Kem512 => 0,
            Self::Kem768 => 1,
            Self::Kem1024 => 2,
        }
    }

    /// Encapsulation-key length in bytes.
    pub const fn public_key_len(self) -> usize {
        match self {
            Self::Kem512 => 800,
            Self::Kem768 => 1184,
            Self::Kem1024 => 1568,
        }
    }

    /// Decapsulation-key length in bytes.
    pub const fn secret_key_len(self) -> usize {
        match self {
            Self::Kem512 => 1632,
            Self::Kem768 => 2400,
            Self::Kem1024 => 3168,
        }
    }

    /// Ciphertext length in bytes.
    pub const fn ciphertext_len(self) -> usize {
        match self {
            Self::Kem512 => 768,
            Self::Kem768 => 1088,
            Self::Kem1024 => 1568,
        }
    }

    /// Shared-secret length in bytes, identical across modes.
    pub const fn shared_secret_len(self) -> usize {
        32
    }
}

/// Crypto operations trait for precompiles.
pub trait Crypto: Send + Sync + Debug {
    /// Compute SHA-256 hash.
    fn sha256(&self, input: &[u8]) -> [u8; 32];

    /// Compute BLAKE3 hash.
    fn blake3(&self, input: &[u8]) -> [u8; 32];

    /// Compute Keccak-256 hash.
    fn keccak256(&self, input: &[u8]) -> B256;

    /// ML-DSA detached-signature verification at the given level.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify;
    /// errors are reserved for malformed key or signature encodings.
    fn mldsa_verify(
        &self,
        level: MlDsaLevel,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, PrecompileError>;

    /// ML-KEM encapsulation: returns `(ciphertext, shared_secret)`.
    fn mlkem_encapsulate(
        &self,
        mode: MlKemMode,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), PrecompileError>;

    /// ML-KEM decapsulation: returns the 32-byte shared secret.
    fn mlkem_decapsulate(
        &self,
        mode: MlKemMode,
        secret_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Whether the ML-KEM backend runs batches in parallel. Drives the
    /// batched precompile's discounted gas path.
    fn parallel_kem(&self) -> bool {
        cfg!(feature = "parallel-kem")
    }
}

/// Default implementation of the [`Crypto`] trait using the in-tree
/// libraries.
#[derive(Clone, Debug, Default)]
pub struct DefaultCrypto;

impl Crypto for DefaultCrypto {
    fn sha256(&self, input: &[u8]) -> [u8; 32] {
        use sha2::Digest;
        sha2::Sha256::digest(input).into()
    }

    fn blake3(&self, input: &[u8]) -> [u8; 32] {
        *blake3::hash(input).as_bytes()
    }

    fn keccak256(&self, input: &[u8]) -> B256 {
        keccak256(input)
    }

    fn mldsa_verify(
        &self,
        level: MlDsaLevel,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, PrecompileError> {
        macro_rules! verify_at {
            ($module:ident) => {{
                let pk = $module::PublicKey::from_bytes(public_key)
                    .map_err(|_| PrecompileError::UnknownMlDsaLevel)?;
                let sig = $module::DetachedSignature::from_bytes(signature)
                    .map_err(|_| PrecompileError::MlDsaLengthMismatch)?;
                Ok($module::verify_detached_signature(&sig, message, &pk).is_ok())
            }};
        }
        match level {
            MlDsaLevel::L2 => verify_at!(mldsa44),
            MlDsaLevel::L3 => verify_at!(mldsa65),
            MlDsaLevel::L5 => verify_at!(mldsa87),
        }
    }

    fn mlkem_encapsulate(
        &self,
        mode: MlKemMode,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), PrecompileError> {
        macro_rules! encaps_at {
            ($module:ident) => {{
                let pk = $module::PublicKey::from_bytes(public_key)
                    .map_err(|_| PrecompileError::KemLengthMismatch)?;
                let (ss, ct) = $module::encapsulate(&pk);
                Ok((ct.as_bytes().to_vec(), ss.as_bytes().to_vec()))
            }};
        }
        match mode {
            MlKemMode::Kem512 => encaps_at!(mlkem512),
            MlKemMode::Kem768 => encaps_at!(mlkem768),
            MlKemMode::Kem1024 => encaps_at!(mlkem1024),
        }
    }

    fn mlkem_decapsulate(
        &self,
        mode: MlKemMode,
        secret_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, PrecompileError> {
        macro_rules! decaps_at {
            ($module:ident) => {{
                let sk = $module::SecretKey::from_bytes(secret_key)
                    .map_err(|_| PrecompileError::KemLengthMismatch)?;
                let ct = $module::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| PrecompileError::KemLengthMismatch)?;
                let ss = $module::decapsulate(&ct, &sk);
                Ok(ss.as_bytes().to_vec())
            }};
        }
        match mode {
            MlKemMode::Kem512 => decaps_at!(mlkem512),
            MlKemMode::Kem768 => decaps_at!(mlkem768),
            MlKemMode::Kem1024 => decaps_at!(mlkem1024),
        }
    }
}

static CRYPTO: OnceCell<Box<dyn Crypto>> = OnceCell::new();

/// Installs a crypto backend for the whole process. Returns `false` if a
/// backend was already installed; the first installation wins.
pub fn install_crypto(crypto: Box<dyn Crypto>) -> bool {
    CRYPTO.set(crypto).is_ok()
}

/// Returns the installed crypto backend, falling back to [`DefaultCrypto`].
pub fn crypto() -> &'static dyn Crypto {
    CRYPTO
        .get_or_init(|| Box::new(DefaultCrypto))
        .as_ref()
}
