//! FHE primitive provider.
//!
//! [`FheProvider`] is the narrow surface the FHE precompile dispatches
//! into. A production deployment backs it with a TFHE library; the
//! in-tree [`CpuFheProvider`] is a reference backend whose ciphertexts are
//! keystream-masked words, deterministic in `(value, type, provider key)`,
//! which preserves every algebraic contract of the precompile.
use crate::interface::PrecompileError;
use alloy_primitives::U256;

/// Encrypted-integer type tag stored with every handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FheType {
    /// Encrypted boolean.
    Bool,
    /// 4-bit unsigned.
    U4,
    /// 8-bit unsigned.
    U8,
    /// 16-bit unsigned.
    U16,
    /// 32-bit unsigned.
    U32,
    /// 64-bit unsigned.
    U64,
    /// 128-bit unsigned.
    U128,
    /// 160-bit unsigned, the address type.
    U160,
    /// 256-bit unsigned.
    U256,
}

impl FheType {
    /// Parses a type tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Bool),
            1 => Some(Self::U4),
            2 => Some(Self::U8),
            3 => Some(Self::U16),
            4 => Some(Self::U32),
            5 => Some(Self::U64),
            6 => Some(Self::U128),
            7 => Some(Self::U160),
            8 => Some(Self::U256),
            _ => None,
        }
    }

    /// The type tag byte.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::U4 => 1,
            Self::U8 => 2,
            Self::U16 => 3,
            Self::U32 => 4,
            Self::U64 => 5,
            Self::U128 => 6,
            Self::U160 => 7,
            Self::U256 => 8,
        }
    }

    /// Bit width of the plaintext domain.
    pub const fn bits(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::U4 => 4,
            Self::U8 => 8,
            Self::U16 => 16,
            Self::U32 => 32,
            Self::U64 => 64,
            Self::U128 => 128,
            Self::U160 => 160,
            Self::U256 => 256,
        }
    }

    /// Truncates a word into the type's plaintext domain.
    pub fn mask(self, value: U256) -> U256 {
        if self.bits() == 256 {
            value
        } else {
            value & ((U256::from(1u8) << self.bits()) - U256::from(1u8))
        }
    }

    /// The all-ones plaintext of the type.
    pub fn all_ones(self) -> U256 {
        self.mask(U256::MAX)
    }
}

/// Binary arithmetic and bitwise operations; operands share a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FheBinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Integer division; an encrypted zero divisor yields all-ones.
    Div,
    /// Remainder; an encrypted zero divisor yields the dividend.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

/// Comparison operations; the output is always an encrypted boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FheCompareOp {
    /// Strictly less.
    Lt,
    /// Less or equal.
    Le,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Ge,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
}

/// Unary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FheUnaryOp {
    /// Bitwise complement within the type width.
    Not,
    /// Two's-complement negation within the type width.
    Neg,
}

/// Shift and rotate operations; the amount is a cleartext byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FheShiftOp {
    /// Left shift; amounts at or above the width yield zero.
    Shl,
    /// Right shift; amounts at or above the width yield zero.
    Shr,
    /// Left rotation, modulo the width.
    Rotl,
    /// Right rotation, modulo the width.
    Rotr,
}

/// The FHE primitive surface.
pub trait FheProvider: Send + Sync {
    /// Trivially encrypts a plaintext into a ciphertext of the type.
    fn encrypt(&self, value: U256, ty: FheType) -> Vec<u8>;

    /// Decrypts a ciphertext of the type.
    fn decrypt(&self, ciphertext: &[u8], ty: FheType) -> Result<U256, PrecompileError>;

    /// Binary operation over two same-type ciphertexts.
    fn binary_op(
        &self,
        op: FheBinaryOp,
        lhs: &[u8],
        rhs: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Binary operation with a cleartext right operand. Scalar division by
    /// a cleartext zero yields the all-ones ciphertext of the type.
    fn scalar_op(
        &self,
        op: FheBinaryOp,
        lhs: &[u8],
        scalar: U256,
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Comparison over two same-type ciphertexts; boolean output.
    fn compare(
        &self,
        op: FheCompareOp,
        lhs: &[u8],
        rhs: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Unary operation.
    fn unary_op(
        &self,
        op: FheUnaryOp,
        operand: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Shift or rotate by a cleartext amount.
    fn shift(
        &self,
        op: FheShiftOp,
        operand: &[u8],
        amount: u8,
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// `cond ? a : b` over an encrypted boolean condition.
    fn select(
        &self,
        cond: &[u8],
        a: &[u8],
        b: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Re-types a ciphertext, truncating or zero-extending bitwise.
    fn cast(
        &self,
        operand: &[u8],
        from: FheType,
        to: FheType,
    ) -> Result<Vec<u8>, PrecompileError>;

    /// Seed-deterministic encrypted randomness.
    fn random(&self, seed: &[u8], ty: FheType) -> Vec<u8>;

    /// Re-encrypts a ciphertext under a caller-supplied public key.
    fn seal(
        &self,
        ciphertext: &[u8],
        ty: FheType,
        public_key: &[u8; 32],
    ) -> Result<Vec<u8>, PrecompileError>;
}

/// Reference layout: `tag:1 ‖ nonce:32 ‖ masked:32`.
const CT_LEN: usize = 65;

/// CPU reference backend.
#[derive(Clone, Debug)]
pub struct CpuFheProvider {
    key: [u8; 32],
}

impl Default for CpuFheProvider {
    fn default() -> Self {
        Self {
            key: *blake3::hash(b"pars/fhe/reference-key").as_bytes(),
        }
    }
}

impl CpuFheProvider {
    /// A provider with an explicit masking key.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn keystream(&self, nonce: &[u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(b"stream");
        hasher.update(nonce);
        *hasher.finalize().as_bytes()
    }

    fn nonce_for(&self, value: &U256, ty: FheType) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(b"nonce");
        hasher.update(&[ty.tag()]);
        hasher.update(&value.to_be_bytes::<32>());
        *hasher.finalize().as_bytes()
    }
}

impl FheProvider for CpuFheProvider {
    fn encrypt(&self, value: U256, ty: FheType) -> Vec<u8> {
        let value = ty.mask(value);
        let nonce = self.nonce_for(&value, ty);
        let stream = self.keystream(&nonce);
        let plain = value.to_be_bytes::<32>();

        let mut out = Vec::with_capacity(CT_LEN);
        out.push(ty.tag());
        out.extend_from_slice(&nonce);
        out.extend(plain.iter().zip(stream.iter()).map(|(p, k)| p ^ k));
        out
    }

    fn decrypt(&self, ciphertext: &[u8], ty: FheType) -> Result<U256, PrecompileError> {
        if ciphertext.len() != CT_LEN || ciphertext[0] != ty.tag() {
            return Err(PrecompileError::DeserializationFailed);
        }
        let nonce: [u8; 32] = ciphertext[1..33].try_into().expect("length checked");
        let stream = self.keystream(&nonce);
        let mut plain = [0u8; 32];
        for (i, byte) in ciphertext[33..].iter().enumerate() {
            plain[i] = byte ^ stream[i];
        }
        Ok(ty.mask(U256::from_be_bytes(plain)))
    }

    fn binary_op(
        &self,
        op: FheBinaryOp,
        lhs: &[u8],
        rhs: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let a = self.decrypt(lhs, ty)?;
        let b = self.decrypt(rhs, ty)?;
        Ok(self.encrypt(apply_binary(op, a, b, ty), ty))
    }

    fn scalar_op(
        &self,
        op: FheBinaryOp,
        lhs: &[u8],
        scalar: U256,
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let a = self.decrypt(lhs, ty)?;
        let b = ty.mask(scalar);
        Ok(self.encrypt(apply_binary(op, a, b, ty), ty))
    }

    fn compare(
        &self,
        op: FheCompareOp,
        lhs: &[u8],
        rhs: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let a = self.decrypt(lhs, ty)?;
        let b = self.decrypt(rhs, ty)?;
        let result = match op {
            FheCompareOp::Lt => a < b,
            FheCompareOp::Le => a <= b,
            FheCompareOp::Gt => a > b,
            FheCompareOp::Ge => a >= b,
            FheCompareOp::Eq => a == b,
            FheCompareOp::Ne => a != b,
        };
        Ok(self.encrypt(U256::from(result as u8), FheType::Bool))
    }

    fn unary_op(
        &self,
        op: FheUnaryOp,
        operand: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let a = self.decrypt(operand, ty)?;
        let result = match op {
            FheUnaryOp::Not => ty.mask(!a),
            FheUnaryOp::Neg => ty.mask(U256::ZERO.wrapping_sub(a)),
        };
        Ok(self.encrypt(result, ty))
    }

    fn shift(
        &self,
        op: FheShiftOp,
        operand: &[u8],
        amount: u8,
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let a = self.decrypt(operand, ty)?;
        let bits = ty.bits();
        let result = match op {
            FheShiftOp::Shl => {
                if (amount as usize) >= bits {
                    U256::ZERO
                } else {
                    ty.mask(a << (amount as usize))
                }
            }
            FheShiftOp::Shr => {
                if (amount as usize) >= bits {
                    U256::ZERO
                } else {
                    a >> (amount as usize)
                }
            }
            FheShiftOp::Rotl => {
                // operands sit below 2^bits, so the complementary shift
                // contributes exactly the rotated-out bits
                let k = amount as usize % bits;
                ty.mask((a << k) | (a >> (bits - k)))
            }
            FheShiftOp::Rotr => {
                let k = amount as usize % bits;
                ty.mask((a >> k) | (a << (bits - k)))
            }
        };
        Ok(self.encrypt(result, ty))
    }

    fn select(
        &self,
        cond: &[u8],
        a: &[u8],
        b: &[u8],
        ty: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let flag = self.decrypt(cond, FheType::Bool)?;
        let a = self.decrypt(a, ty)?;
        let b = self.decrypt(b, ty)?;
        Ok(self.encrypt(if flag.is_zero() { b } else { a }, ty))
    }

    fn cast(
        &self,
        operand: &[u8],
        from: FheType,
        to: FheType,
    ) -> Result<Vec<u8>, PrecompileError> {
        let value = self.decrypt(operand, from)?;
        Ok(self.encrypt(to.mask(value), to))
    }

    fn random(&self, seed: &[u8], ty: FheType) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(b"rand");
        hasher.update(seed);
        let value = U256::from_be_bytes(*hasher.finalize().as_bytes());
        self.encrypt(ty.mask(value), ty)
    }

    fn seal(
        &self,
        ciphertext: &[u8],
        ty: FheType,
        public_key: &[u8; 32],
    ) -> Result<Vec<u8>, PrecompileError> {
        let value = self.decrypt(ciphertext, ty)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pars/fhe/seal");
        hasher.update(public_key);
        let stream = *hasher.finalize().as_bytes();
        let plain = value.to_be_bytes::<32>();
        Ok(plain.iter().zip(stream.iter()).map(|(p, k)| p ^ k).collect())
    }
}

fn apply_binary(op: FheBinaryOp, a: U256, b: U256, ty: FheType) -> U256 {
    match op {
        FheBinaryOp::Add => ty.mask(a.wrapping_add(b)),
        FheBinaryOp::Sub => ty.mask(a.wrapping_sub(b)),
        FheBinaryOp::Mul => ty.mask(a.wrapping_mul(b)),
        FheBinaryOp::Div => {
            if b.is_zero() {
                ty.all_ones()
            } else {
                a / b
            }
        }
        FheBinaryOp::Rem => {
            if b.is_zero() {
                a
            } else {
                a % b
            }
        }
        FheBinaryOp::And => a & b,
        FheBinaryOp::Or => a | b,
        FheBinaryOp::Xor => a ^ b,
        FheBinaryOp::Min => a.min(b),
        FheBinaryOp::Max => a.max(b),
    }
}
