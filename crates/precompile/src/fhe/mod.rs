//! FHE precompile: a handle-indirect VM over encrypted integers.
//!
//! Ciphertexts are stored once and addressed by a content-derived 32-byte
//! handle; every operation consumes and produces handles. The type tag
//! recorded with each handle drives primitive dispatch. Binary, bitwise
//! and select ops silently type-check against the stored tags: a mismatch
//! yields the zero handle, which callers treat as invalid.
//!
//! Operand layouts per class, selector first:
//! binary `[op, lhs:32, rhs:32]`, scalar `[op, handle:32, scalar:32]`,
//! unary `[op, handle:32]`, shift `[op, handle:32, bits:1]`,
//! select `[op, cond:32, a:32, b:32]`, cast `[op, handle:32, target:1]`,
//! encrypt `[op, plaintext:32]`, decrypt/verify `[op, handle:32]`,
//! rand `[op, seed:32]` (the host passes the caller address as seed),
//! sealOutput `[op, handle:32, pubkey:32]`.
use crate::{
    gas::fhe as gas,
    interface::{PrecompileError, PrecompileOutput, PrecompileResult, PrecompileWithAddress},
    prefix_address,
    utilities::bool_to_word,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use once_cell::sync::OnceCell;

pub mod provider;
pub mod store;

pub use provider::{
    CpuFheProvider, FheBinaryOp, FheCompareOp, FheProvider, FheShiftOp, FheType, FheUnaryOp,
};

/// FHE precompile address (`0x0500…`, right-padded).
pub const ADDRESS: Address = prefix_address(0x0500);

/// FHE precompile.
pub const FHE: PrecompileWithAddress = PrecompileWithAddress(ADDRESS, fhe_run);

// Arithmetic over two handles.
/// add selector.
pub const OP_ADD: u8 = 0x01;
/// sub selector.
pub const OP_SUB: u8 = 0x02;
/// mul selector.
pub const OP_MUL: u8 = 0x03;
/// div selector.
pub const OP_DIV: u8 = 0x04;
/// rem selector.
pub const OP_REM: u8 = 0x05;

// Arithmetic against a cleartext scalar.
/// scalarAdd selector.
pub const OP_SCALAR_ADD: u8 = 0x06;
/// scalarSub selector.
pub const OP_SCALAR_SUB: u8 = 0x07;
/// scalarMul selector.
pub const OP_SCALAR_MUL: u8 = 0x08;
/// scalarDiv selector.
pub const OP_SCALAR_DIV: u8 = 0x09;
/// scalarRem selector.
pub const OP_SCALAR_REM: u8 = 0x0a;

// Comparisons; output is always bool-typed.
/// lt selector.
pub const OP_LT: u8 = 0x10;
/// le selector.
pub const OP_LE: u8 = 0x11;
/// gt selector.
pub const OP_GT: u8 = 0x12;
/// ge selector.
pub const OP_GE: u8 = 0x13;
/// eq selector.
pub const OP_EQ: u8 = 0x14;
/// ne selector.
pub const OP_NE: u8 = 0x15;
/// min selector.
pub const OP_MIN: u8 = 0x16;
/// max selector.
pub const OP_MAX: u8 = 0x17;

// Bitwise and unary.
/// and selector.
pub const OP_AND: u8 = 0x20;
/// or selector.
pub const OP_OR: u8 = 0x21;
/// xor selector.
pub const OP_XOR: u8 = 0x22;
/// not selector.
pub const OP_NOT: u8 = 0x23;
/// neg selector.
pub const OP_NEG: u8 = 0x24;

// Shifts and rotations.
/// shl selector.
pub const OP_SHL: u8 = 0x28;
/// shr selector.
pub const OP_SHR: u8 = 0x29;
/// rotl selector.
pub const OP_ROTL: u8 = 0x2a;
/// rotr selector.
pub const OP_ROTR: u8 = 0x2b;

// Structure.
/// select selector.
pub const OP_SELECT: u8 = 0x30;
/// cast selector.
pub const OP_CAST: u8 = 0x31;

/// Base of the trivial-encrypt selectors: `0x40 + type tag`, covering
/// asEbool through asEuint256 and asEaddress.
pub const OP_ENCRYPT_BASE: u8 = 0x40;

// Utility.
/// rand selector.
pub const OP_RAND: u8 = 0x50;
/// decrypt selector.
pub const OP_DECRYPT: u8 = 0x51;
/// verify selector.
pub const OP_VERIFY: u8 = 0x52;
/// sealOutput selector.
pub const OP_SEAL_OUTPUT: u8 = 0x53;

static PROVIDER: OnceCell<Box<dyn FheProvider>> = OnceCell::new();

/// Installs an FHE backend for the whole process. The first installation
/// wins; returns `false` otherwise.
pub fn install_provider(provider: Box<dyn FheProvider>) -> bool {
    PROVIDER.set(provider).is_ok()
}

/// Returns the installed backend, falling back to [`CpuFheProvider`].
pub fn fhe_provider() -> &'static dyn FheProvider {
    PROVIDER
        .get_or_init(|| Box::new(CpuFheProvider::default()))
        .as_ref()
}

/// Gas for an FHE call, pure in the selector byte.
pub fn required_gas(input: &[u8]) -> u64 {
    let Some(&op) = input.first() else { return 0 };
    match op {
        OP_ADD | OP_SUB | OP_SCALAR_ADD | OP_SCALAR_SUB => gas::ARITH,
        OP_MUL | OP_SCALAR_MUL => gas::MUL,
        OP_DIV | OP_REM | OP_SCALAR_DIV | OP_SCALAR_REM => gas::DIV,
        OP_LT | OP_LE | OP_GT | OP_GE | OP_EQ | OP_NE | OP_MIN | OP_MAX => gas::COMPARE,
        OP_AND | OP_OR | OP_XOR => gas::BITWISE,
        OP_NOT | OP_NEG => gas::UNARY,
        OP_SHL | OP_SHR | OP_ROTL | OP_ROTR => gas::SHIFT,
        OP_SELECT => gas::SELECT,
        OP_CAST => gas::CAST,
        op if encrypt_type(op).is_some() => gas::ENCRYPT,
        OP_RAND => gas::RAND,
        OP_DECRYPT => gas::DECRYPT,
        OP_VERIFY => gas::VERIFY,
        OP_SEAL_OUTPUT => gas::SEAL_OUTPUT,
        _ => 0,
    }
}

fn encrypt_type(op: u8) -> Option<FheType> {
    op.checked_sub(OP_ENCRYPT_BASE).and_then(FheType::from_byte)
}

fn binary_op(op: u8) -> Option<FheBinaryOp> {
    match op {
        OP_ADD | OP_SCALAR_ADD => Some(FheBinaryOp::Add),
        OP_SUB | OP_SCALAR_SUB => Some(FheBinaryOp::Sub),
        OP_MUL | OP_SCALAR_MUL => Some(FheBinaryOp::Mul),
        OP_DIV | OP_SCALAR_DIV => Some(FheBinaryOp::Div),
        OP_REM | OP_SCALAR_REM => Some(FheBinaryOp::Rem),
        OP_AND => Some(FheBinaryOp::And),
        OP_OR => Some(FheBinaryOp::Or),
        OP_XOR => Some(FheBinaryOp::Xor),
        OP_MIN => Some(FheBinaryOp::Min),
        OP_MAX => Some(FheBinaryOp::Max),
        _ => None,
    }
}

fn compare_op(op: u8) -> Option<FheCompareOp> {
    match op {
        OP_LT => Some(FheCompareOp::Lt),
        OP_LE => Some(FheCompareOp::Le),
        OP_GT => Some(FheCompareOp::Gt),
        OP_GE => Some(FheCompareOp::Ge),
        OP_EQ => Some(FheCompareOp::Eq),
        OP_NE => Some(FheCompareOp::Ne),
        _ => None,
    }
}

fn take_handle(input: &[u8], offset: usize) -> Result<B256, PrecompileError> {
    input
        .get(offset..offset + 32)
        .map(B256::from_slice)
        .ok_or(PrecompileError::InvalidInputLength)
}

fn lookup(handle: &B256) -> Result<(Bytes, FheType), PrecompileError> {
    store::get(handle).ok_or(PrecompileError::UnknownHandle)
}

fn exact_len(input: &[u8], len: usize) -> Result<(), PrecompileError> {
    if input.len() == len {
        Ok(())
    } else {
        Err(PrecompileError::InvalidInputLength)
    }
}

/// Runs the FHE precompile.
pub fn fhe_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = required_gas(input);
    if cost == 0 {
        return Err(PrecompileError::UnknownSelector);
    }
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let op = input[0];
    let provider = fhe_provider();

    let bytes: Bytes = if let Some(cmp) = compare_op(op) {
        exact_len(input, 65)?;
        let (lhs, lhs_ty) = lookup(&take_handle(input, 1)?)?;
        let (rhs, rhs_ty) = lookup(&take_handle(input, 33)?)?;
        if lhs_ty != rhs_ty {
            B256::ZERO.into()
        } else {
            let ct = provider.compare(cmp, &lhs, &rhs, lhs_ty)?;
            store::insert(ct, FheType::Bool).into()
        }
    } else {
        match op {
            OP_ADD | OP_SUB | OP_MUL | OP_DIV | OP_REM | OP_AND | OP_OR | OP_XOR | OP_MIN
            | OP_MAX => {
                exact_len(input, 65)?;
                let (lhs, lhs_ty) = lookup(&take_handle(input, 1)?)?;
                let (rhs, rhs_ty) = lookup(&take_handle(input, 33)?)?;
                if lhs_ty != rhs_ty {
                    B256::ZERO.into()
                } else {
                    let bin = binary_op(op).expect("arm covers binary selectors");
                    let ct = provider.binary_op(bin, &lhs, &rhs, lhs_ty)?;
                    store::insert(ct, lhs_ty).into()
                }
            }
            OP_SCALAR_ADD | OP_SCALAR_SUB | OP_SCALAR_MUL | OP_SCALAR_DIV | OP_SCALAR_REM => {
                exact_len(input, 65)?;
                let (lhs, ty) = lookup(&take_handle(input, 1)?)?;
                let scalar = U256::from_be_slice(&input[33..65]);
                let bin = binary_op(op).expect("arm covers scalar selectors");
                let ct = provider.scalar_op(bin, &lhs, scalar, ty)?;
                store::insert(ct, ty).into()
            }
            OP_NOT | OP_NEG => {
                exact_len(input, 33)?;
                let (operand, ty) = lookup(&take_handle(input, 1)?)?;
                let unary = if op == OP_NOT {
                    FheUnaryOp::Not
                } else {
                    FheUnaryOp::Neg
                };
                let ct = provider.unary_op(unary, &operand, ty)?;
                store::insert(ct, ty).into()
            }
            OP_SHL | OP_SHR | OP_ROTL | OP_ROTR => {
                exact_len(input, 34)?;
                let (operand, ty) = lookup(&take_handle(input, 1)?)?;
                let shift = match op {
                    OP_SHL => FheShiftOp::Shl,
                    OP_SHR => FheShiftOp::Shr,
                    OP_ROTL => FheShiftOp::Rotl,
                    _ => FheShiftOp::Rotr,
                };
                let ct = provider.shift(shift, &operand, input[33], ty)?;
                store::insert(ct, ty).into()
            }
            OP_SELECT => {
                exact_len(input, 97)?;
                let (cond, cond_ty) = lookup(&take_handle(input, 1)?)?;
                let (a, a_ty) = lookup(&take_handle(input, 33)?)?;
                let (b, b_ty) = lookup(&take_handle(input, 65)?)?;
                if cond_ty != FheType::Bool || a_ty != b_ty {
                    B256::ZERO.into()
                } else {
                    let ct = provider.select(&cond, &a, &b, a_ty)?;
                    store::insert(ct, a_ty).into()
                }
            }
            OP_CAST => {
                exact_len(input, 34)?;
                let (operand, from) = lookup(&take_handle(input, 1)?)?;
                let to =
                    FheType::from_byte(input[33]).ok_or(PrecompileError::InvalidInputLength)?;
                let ct = provider.cast(&operand, from, to)?;
                store::insert(ct, to).into()
            }
            OP_RAND => {
                exact_len(input, 33)?;
                let ct = provider.random(&input[1..33], FheType::U256);
                store::insert(ct, FheType::U256).into()
            }
            OP_DECRYPT => {
                exact_len(input, 33)?;
                let (ct, ty) = lookup(&take_handle(input, 1)?)?;
                let value = provider.decrypt(&ct, ty)?;
                value.to_be_bytes::<32>().to_vec().into()
            }
            OP_VERIFY => {
                exact_len(input, 33)?;
                bool_to_word(store::contains(&take_handle(input, 1)?))
            }
            OP_SEAL_OUTPUT => {
                exact_len(input, 65)?;
                let (ct, ty) = lookup(&take_handle(input, 1)?)?;
                let public_key: [u8; 32] =
                    input[33..65].try_into().expect("length checked");
                provider.seal(&ct, ty, &public_key)?.into()
            }
            op => {
                let ty = encrypt_type(op).ok_or(PrecompileError::UnknownSelector)?;
                exact_len(input, 33)?;
                let value = U256::from_be_slice(&input[1..33]);
                let ct = provider.encrypt(ty.mask(value), ty);
                store::insert(ct, ty).into()
            }
        }
    };

    Ok(PrecompileOutput::new(cost, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(value: u64, ty: FheType) -> B256 {
        let mut input = vec![OP_ENCRYPT_BASE + ty.tag()];
        input.extend_from_slice(&U256::from(value).to_be_bytes::<32>());
        let out = fhe_run(&input, 10_000_000).unwrap();
        B256::from_slice(&out.bytes)
    }

    fn decrypt(handle: B256) -> U256 {
        let mut input = vec![OP_DECRYPT];
        input.extend_from_slice(handle.as_slice());
        let out = fhe_run(&input, 10_000_000).unwrap();
        U256::from_be_slice(&out.bytes)
    }

    fn run_binary(op: u8, lhs: B256, rhs: B256) -> B256 {
        let mut input = vec![op];
        input.extend_from_slice(lhs.as_slice());
        input.extend_from_slice(rhs.as_slice());
        let out = fhe_run(&input, 10_000_000).unwrap();
        B256::from_slice(&out.bytes)
    }

    #[test]
    fn homomorphic_identities_hold() {
        let a = 250u64;
        let b = 13u64;
        let ea = encrypt(a, FheType::U8);
        let eb = encrypt(b, FheType::U8);

        let cases: &[(u8, u64)] = &[
            (OP_ADD, (a + b) % 256),
            (OP_SUB, a - b),
            (OP_MUL, (a * b) % 256),
            (OP_AND, a & b),
            (OP_OR, a | b),
            (OP_XOR, a ^ b),
            (OP_MIN, b),
            (OP_MAX, a),
        ];
        for &(op, expected) in cases {
            let handle = run_binary(op, ea, eb);
            assert_eq!(decrypt(handle), U256::from(expected), "op {op:#x}");
        }
    }

    #[test]
    fn comparisons_return_bool_handles() {
        let ea = encrypt(5, FheType::U32);
        let eb = encrypt(7, FheType::U32);
        let lt = run_binary(OP_LT, ea, eb);
        let (_, ty) = store::get(&lt).unwrap();
        assert_eq!(ty, FheType::Bool);
        assert_eq!(decrypt(lt), U256::from(1u8));
        assert_eq!(decrypt(run_binary(OP_GE, ea, eb)), U256::ZERO);
    }

    #[test]
    fn type_mismatch_yields_zero_handle() {
        let ea = encrypt(5, FheType::U8);
        let eb = encrypt(5, FheType::U16);
        let mut input = vec![OP_ADD];
        input.extend_from_slice(ea.as_slice());
        input.extend_from_slice(eb.as_slice());
        let out = fhe_run(&input, 10_000_000).unwrap();
        assert_eq!(out.bytes.as_ref(), B256::ZERO.as_slice());
    }

    #[test]
    fn unknown_handle_is_a_lookup_failure() {
        let mut input = vec![OP_DECRYPT];
        input.extend_from_slice(B256::repeat_byte(0x77).as_slice());
        assert_eq!(
            fhe_run(&input, 10_000_000).unwrap_err(),
            PrecompileError::UnknownHandle
        );
    }

    #[test]
    fn scalar_div_by_zero_is_all_ones() {
        let ea = encrypt(9, FheType::U8);
        let mut input = vec![OP_SCALAR_DIV];
        input.extend_from_slice(ea.as_slice());
        input.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        let out = fhe_run(&input, 10_000_000).unwrap();
        assert_eq!(decrypt(B256::from_slice(&out.bytes)), U256::from(0xffu8));
    }

    #[test]
    fn cast_retags_the_result() {
        let ea = encrypt(0x1234, FheType::U16);
        let mut input = vec![OP_CAST];
        input.extend_from_slice(ea.as_slice());
        input.push(FheType::U8.tag());
        let out = fhe_run(&input, 10_000_000).unwrap();
        let handle = B256::from_slice(&out.bytes);
        let (_, ty) = store::get(&handle).unwrap();
        assert_eq!(ty, FheType::U8);
        assert_eq!(decrypt(handle), U256::from(0x34u8));
    }

    #[test]
    fn select_picks_by_encrypted_condition() {
        let cond = encrypt(1, FheType::Bool);
        let a = encrypt(10, FheType::U32);
        let b = encrypt(20, FheType::U32);
        let mut input = vec![OP_SELECT];
        input.extend_from_slice(cond.as_slice());
        input.extend_from_slice(a.as_slice());
        input.extend_from_slice(b.as_slice());
        let out = fhe_run(&input, 10_000_000).unwrap();
        assert_eq!(decrypt(B256::from_slice(&out.bytes)), U256::from(10u8));
    }

    #[test]
    fn rand_is_deterministic_per_caller() {
        let mut input = vec![OP_RAND];
        input.extend_from_slice(B256::repeat_byte(0xaa).as_slice());
        let first = fhe_run(&input, 10_000_000).unwrap();
        let second = fhe_run(&input, 10_000_000).unwrap();
        assert_eq!(first.bytes, second.bytes);

        let mut other = vec![OP_RAND];
        other.extend_from_slice(B256::repeat_byte(0xbb).as_slice());
        assert_ne!(fhe_run(&other, 10_000_000).unwrap().bytes, first.bytes);
    }

    #[test]
    fn verify_reports_handle_presence() {
        let ea = encrypt(1, FheType::U8);
        let mut input = vec![OP_VERIFY];
        input.extend_from_slice(ea.as_slice());
        assert_eq!(
            fhe_run(&input, 10_000_000).unwrap().bytes,
            bool_to_word(true)
        );
    }

    #[test]
    fn unknown_selector_prices_at_zero() {
        assert_eq!(required_gas(&[0xee]), 0);
        assert_eq!(
            fhe_run(&[0xee], 10_000_000).unwrap_err(),
            PrecompileError::UnknownSelector
        );
    }
}
