//! Script-layer construction, recognition, and signing for a unidirectional
//! Bitcoin micropayment channel.
//!
//! A **deposit script** locks the payer's funds into the channel and opens
//! three spend paths (cooperative commit, early close with the spend
//! secret, timeout refund). A **commit script** records an off-chain
//! settlement and opens two spend paths (payout after a relative delay,
//! revoke with the punishment secret). This crate compiles both templates
//! to canonical Script bytecode, recognizes untrusted bytecode against
//! them, extracts their fields, and produces the `scriptSig` for each of
//! the seven legal spends.
//!
//! The module layout mirrors the dependency order: [`assembler`] is the
//! byte-level leaf, [`template`] and [`fields`] build on it to compile,
//! recognize, and read back script fields, [`signer`] builds scriptSigs
//! for each spend path, and [`dispatch`] provides the scoped
//! recognize-then-sign entry point external callers are expected to use.

pub mod assembler;
pub mod dispatch;
pub mod error;
pub mod fields;
pub mod hash;
pub mod signer;
pub mod template;

pub use dispatch::{sign_input, SpendRequest};
pub use error::Error;
pub use fields::{
    get_commit_delay_time, get_commit_payee_pubkey, get_commit_payer_pubkey,
    get_commit_revoke_secret_hash, get_commit_spend_secret_hash, get_deposit_expire_time,
    get_deposit_payee_pubkey, get_deposit_payer_pubkey, get_deposit_spend_secret_hash,
    get_spend_secret_from_payout,
};
pub use hash::hash160;
pub use signer::{KeyStore, SignContext, SpendPath, StandardSigner, TxLoader};
pub use template::{
    compile_commit_script, compile_deposit_script, validate_commit_script,
    validate_deposit_script,
};
