//! # pars-threshold
//!
//! Coordinated threshold-signature and MPC key lifecycle for Pars: the
//! [`manager::KeyManager`] owns request/complete bookkeeping, quotas and
//! status transitions; the [`client::MpcClient`] executes keygen, signing,
//! refresh and reshare over an in-memory party network, forking on the
//! protocol tag (LSS, FROST, CGGMP21, Ringtail); and
//! [`precompiles::ThresholdPrecompile`] exposes the read surface at the
//! manager's reserved address.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod client;
pub mod error;
pub mod manager;
pub mod network;
pub mod precompiles;
pub mod protocols;
pub mod shamir;
pub mod types;

pub use client::{MpcClient, DEFAULT_DEADLINE};
pub use error::ThresholdError;
pub use manager::{derive_evm_address, Clock, KeyManager, SystemClock};
pub use types::{
    KeyStatus, KeyType, KeygenRequest, Permissions, Protocol, RefreshRequest, RequestStatus,
    ReshareRequest, SignRequest, ThresholdKey, MAX_PARTIES,
};
