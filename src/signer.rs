//! Building signed `scriptSig`s for each of the seven channel spend paths.
//!
//! This module owns no cryptographic state of its own: sighash computation
//! and private-key lookup are delegated to the [`SignContext`] and
//! [`KeyStore`] collaborators respectively, so the core never constructs a
//! transaction preimage itself. [`TxLoader`] and [`StandardSigner`] round
//! out the external interface for the one path (`sign_deposit_fund`) that
//! is ordinary wallet signing rather than a custom template spend.

use crate::assembler;
use crate::error::Error;
use crate::hash::hash160;

/// `SIGHASH_ALL`. The payee side of a finalize-commit always signs with
/// this type; the payer side's type is whatever it used when creating the
/// commit and is read back out of its own signature during finalization.
pub const SIGHASH_ALL: u8 = 0x01;

/// Length in bytes of the placeholder signature `sign_created_commit`
/// splices into the scriptSig in place of the payee's signature, chosen to
/// match a maximal 72-byte DER signature plus its trailing sighash byte so
/// the transaction's size (and fee) does not change across finalization.
pub const PLACEHOLDER_SIG_LEN: usize = 73;

/// Which of the seven legal spend paths a `scriptSig` is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendPath {
    /// Ordinary wallet signing of the inputs that fund a deposit.
    DepositFund,
    /// Payer creates a commit spend of the deposit's multisig branch.
    CreateCommit,
    /// Payee completes the commit spend after verifying the payer's half.
    FinalizeCommit,
    /// Payer recovers funds early by revealing the spend secret.
    Change,
    /// Payer recovers funds after the deposit's timeout.
    Expire,
    /// Payee settles the commit output after its relative delay.
    Payout,
    /// Payer punishes a stale commit by revealing the revoke secret.
    Revoke,
}

/// Resolves the 32-byte sighash for a given sighash type and subscript.
/// The core never builds the transaction preimage itself; this collaborator
/// does, using whatever transaction and input index it was constructed for.
pub trait SignContext {
    fn sighash(&self, sighash_type: u8, script_to_hash: &[u8]) -> Result<[u8; 32], Error>;
}

/// Maps `hash160(pubkey)` to the private key that can sign for it.
pub trait KeyStore {
    fn secret_key_for(&self, pubkey_hash: &[u8; 20]) -> Result<secp256k1::SecretKey, Error>;
}

/// Resolves previously-broadcast transactions referenced by an input's
/// previous-output pointer.
pub trait TxLoader {
    fn load(&self, txid: &bitcoin::Txid) -> Result<bitcoin::Transaction, Error>;
}

/// The host's generic transaction signer, used verbatim for the
/// deposit-funding inputs (ordinary P2PKH/P2SH, no custom template).
///
/// Implementors report a generic signing failure (e.g. the host library's
/// own signer rejecting an input) as [`Error::BadSignature`]; this crate
/// never constructs that variant itself, since deposit-funding inputs are
/// the collaborator's responsibility, not a custom channel template.
pub trait StandardSigner {
    fn sign_standard_inputs(
        &self,
        tx: &mut bitcoin::Transaction,
        tx_loader: &dyn TxLoader,
        key_store: &dyn KeyStore,
    ) -> Result<(), Error>;
}

/// Sign the inputs that fund a deposit. Pure delegation: these are
/// ordinary wallet inputs, not a custom channel template.
pub fn sign_deposit_fund(
    tx: &mut bitcoin::Transaction,
    signer: &dyn StandardSigner,
    tx_loader: &dyn TxLoader,
    key_store: &dyn KeyStore,
) -> Result<(), Error> {
    signer.sign_standard_inputs(tx, tx_loader, key_store)
}

fn sign_der(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    pubkey_hash: &[u8; 20],
    sighash_type: u8,
    script_to_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let secret_key = key_store.secret_key_for(pubkey_hash)?;
    let digest = sign_ctx.sighash(sighash_type, script_to_hash)?;
    let message = secp256k1::Message::from_digest(digest);
    let secp = secp256k1::Secp256k1::signing_only();
    let sig = secp.sign_ecdsa(&message, &secret_key);
    let mut der = sig.serialize_der().to_vec();
    der.push(sighash_type);
    Ok(der)
}

/// Payer's half of a commit spend: `OP_0 <payer_sig> <placeholder_sig> OP_1
/// <deposit_script>`. Not yet finalizable; the payee's signature is a
/// fixed-length placeholder.
pub fn build_create_commit_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payer_pubkey_hash: &[u8; 20],
    deposit_script: &[u8],
    sighash_type: u8,
) -> Result<Vec<u8>, Error> {
    let payer_sig = sign_der(
        sign_ctx,
        key_store,
        payer_pubkey_hash,
        sighash_type,
        deposit_script,
    )?;

    let mut out = Vec::new();
    out.push(0x00); // OP_0: dummy for CHECKMULTISIG's off-by-one stack bug
    assembler::push_data(&payer_sig, &mut out);
    assembler::push_data(&[0u8; PLACEHOLDER_SIG_LEN], &mut out);
    assembler::push_int(1, &mut out);
    assembler::push_data(deposit_script, &mut out);
    Ok(out)
}

fn create_commit_reference() -> Result<Vec<u8>, Error> {
    assembler::compile_asm("OP_0 deadbeef deadbeef OP_1 deadbeef")
}

/// Payee's half: verifies the payer's signature from a create-commit
/// scriptSig, then replaces the placeholder with its own signature.
///
/// Fails with [`Error::InvalidPayerSignature`] if the payer's signature is
/// not valid DER (`"not in DER format"`) or does not verify against
/// `payer_pubkey` over the recomputed sighash (`"invalid r s values"`).
pub fn build_finalize_commit_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payee_pubkey_hash: &[u8; 20],
    payer_pubkey: &bitcoin::PublicKey,
    deposit_script: &[u8],
    partial_scriptsig: &[u8],
) -> Result<Vec<u8>, Error> {
    let reference = create_commit_reference()?;
    crate::template::validate_against_reference(&reference, partial_scriptsig)?;

    let (payer_sig_word, _) = assembler::get_word(partial_scriptsig, 1)?;
    let payer_sig = payer_sig_word
        .data
        .as_deref()
        .ok_or(Error::MalformedScript)?;
    let (sighash_type, der) = payer_sig
        .split_last()
        .ok_or(Error::InvalidPayerSignature("not in DER format"))?;
    let sig = secp256k1::ecdsa::Signature::from_der(der).map_err(|_| {
        tracing::warn!("create-commit scriptSig did not carry a DER-encoded payer signature");
        Error::InvalidPayerSignature("not in DER format")
    })?;

    let digest = sign_ctx.sighash(*sighash_type, deposit_script)?;
    let message = secp256k1::Message::from_digest(digest);
    let secp = secp256k1::Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &sig, &payer_pubkey.inner).map_err(|_| {
        tracing::warn!("payer signature did not verify against the claimed pubkey");
        Error::InvalidPayerSignature("invalid r s values")
    })?;

    let payee_sig = sign_der(
        sign_ctx,
        key_store,
        payee_pubkey_hash,
        SIGHASH_ALL,
        deposit_script,
    )?;

    let mut out = Vec::new();
    out.push(0x00);
    assembler::push_data(payer_sig, &mut out);
    assembler::push_data(&payee_sig, &mut out);
    assembler::push_int(1, &mut out);
    assembler::push_data(deposit_script, &mut out);
    Ok(out)
}

/// Payer recovers the deposit early by revealing the spend secret:
/// `<payer_sig> <spend_secret> OP_1 OP_0 <deposit_script>`.
///
/// Fails with [`Error::PreimageMismatch`] before any signing if
/// `hash160(spend_secret)` does not match `spend_secret_hash`.
pub fn build_change_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payer_pubkey_hash: &[u8; 20],
    deposit_script: &[u8],
    spend_secret: &[u8],
    spend_secret_hash: &[u8; 20],
    sighash_type: u8,
) -> Result<Vec<u8>, Error> {
    if hash160(spend_secret) != *spend_secret_hash {
        return Err(Error::PreimageMismatch);
    }
    let payer_sig = sign_der(
        sign_ctx,
        key_store,
        payer_pubkey_hash,
        sighash_type,
        deposit_script,
    )?;

    let mut out = Vec::new();
    assembler::push_data(&payer_sig, &mut out);
    assembler::push_data(spend_secret, &mut out);
    assembler::push_int(1, &mut out);
    out.push(0x00);
    assembler::push_data(deposit_script, &mut out);
    Ok(out)
}

/// Payer recovers the deposit after its timeout:
/// `<payer_sig> OP_0 OP_0 <deposit_script>`.
pub fn build_expire_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payer_pubkey_hash: &[u8; 20],
    deposit_script: &[u8],
    sighash_type: u8,
) -> Result<Vec<u8>, Error> {
    let payer_sig = sign_der(
        sign_ctx,
        key_store,
        payer_pubkey_hash,
        sighash_type,
        deposit_script,
    )?;

    let mut out = Vec::new();
    assembler::push_data(&payer_sig, &mut out);
    out.push(0x00);
    out.push(0x00);
    assembler::push_data(deposit_script, &mut out);
    Ok(out)
}

/// Payee settles a commit output after its relative delay:
/// `<payee_sig> <spend_secret> OP_1 <commit_script>`.
pub fn build_payout_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payee_pubkey_hash: &[u8; 20],
    commit_script: &[u8],
    spend_secret: &[u8],
    sighash_type: u8,
) -> Result<Vec<u8>, Error> {
    let payee_sig = sign_der(
        sign_ctx,
        key_store,
        payee_pubkey_hash,
        sighash_type,
        commit_script,
    )?;

    let mut out = Vec::new();
    assembler::push_data(&payee_sig, &mut out);
    assembler::push_data(spend_secret, &mut out);
    assembler::push_int(1, &mut out);
    assembler::push_data(commit_script, &mut out);
    Ok(out)
}

/// Payer punishes a stale commit by revealing the revoke secret:
/// `<payer_sig> <revoke_secret> OP_0 <commit_script>`.
pub fn build_revoke_scriptsig(
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
    payer_pubkey_hash: &[u8; 20],
    commit_script: &[u8],
    revoke_secret: &[u8],
    sighash_type: u8,
) -> Result<Vec<u8>, Error> {
    let payer_sig = sign_der(
        sign_ctx,
        key_store,
        payer_pubkey_hash,
        sighash_type,
        commit_script,
    )?;

    let mut out = Vec::new();
    assembler::push_data(&payer_sig, &mut out);
    assembler::push_data(revoke_secret, &mut out);
    out.push(0x00);
    assembler::push_data(commit_script, &mut out);
    Ok(out)
}
