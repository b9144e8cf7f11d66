//! Scoped template registration and dispatch.
//!
//! A generic transaction signer recognizes `scriptPubKey`s by trying a
//! list of registered template matchers. For the duration of a single
//! [`sign_input`] call we prepend a matcher for the deposit or commit
//! template with `OP_PUBKEY`/`OP_PUBKEYHASH` wildcard slots and the
//! concrete `expire_time`/`delay_time` baked in; on every exit path the
//! matcher is removed again. The registry is thread-local so concurrent
//! signing on different threads never contends for it.

use std::cell::RefCell;

use crate::assembler::{self, Word};
use crate::error::Error;
use crate::hash::hash160;
use crate::signer::{self, KeyStore, SignContext, SpendPath};
use crate::template;

thread_local! {
    static REGISTRY: RefCell<Vec<RegisteredTemplate>> = const { RefCell::new(Vec::new()) };
}

struct RegisteredTemplate {
    spend_path: SpendPath,
}

/// Number of matchers currently registered on this thread. Exposed for
/// tests asserting that the registry returns to its prior state after a
/// `sign_input` call, success or failure.
pub fn registry_depth() -> usize {
    REGISTRY.with(|r| r.borrow().len())
}

/// RAII guard for a single scoped registration. Pushes on construction,
/// pops on drop — including on an early return via `?` — so LIFO order is
/// maintained on every exit path without an explicit try/finally.
struct RegistrationGuard;

impl RegistrationGuard {
    fn new(spend_path: SpendPath) -> Self {
        REGISTRY.with(|r| r.borrow_mut().insert(0, RegisteredTemplate { spend_path }));
        RegistrationGuard
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        REGISTRY.with(|r| {
            r.borrow_mut().remove(0);
        });
    }
}

/// Which script kind a matcher recognizes.
#[derive(Debug, Clone, Copy)]
enum TemplateKind {
    Deposit,
    Commit,
}

/// Captured wildcard pushes from a successful match, in template order.
struct Capture {
    pubkeys: Vec<bitcoin::PublicKey>,
    hashes: Vec<[u8; 20]>,
}

fn matcher_template(kind: TemplateKind, baked: u16) -> Result<Vec<u8>, Error> {
    match kind {
        TemplateKind::Deposit => template::render(
            template::DEPOSIT_TEMPLATE,
            &[
                ("payer", "OP_PUBKEY"),
                ("payee", "OP_PUBKEY"),
                ("hash", "OP_PUBKEYHASH"),
                ("expire", &baked.to_string()),
            ],
        ),
        TemplateKind::Commit => template::render(
            template::COMMIT_TEMPLATE,
            &[
                ("payer", "OP_PUBKEY"),
                ("payee", "OP_PUBKEY"),
                ("spend_hash", "OP_PUBKEYHASH"),
                ("revoke_hash", "OP_PUBKEYHASH"),
                ("delay", &baked.to_string()),
            ],
        ),
    }
}

fn is_wildcard_pubkey(word: &Word) -> bool {
    word.opcode == assembler::OP_PUBKEY
}

fn is_wildcard_hash(word: &Word) -> bool {
    word.opcode == assembler::OP_PUBKEYHASH
}

/// Match `candidate` against the matcher template for `kind` baked with
/// `baked`, capturing the wildcard pushes. For a deposit match, the 1st,
/// 3rd and 4th captured pubkeys must be identical (all `payer_pubkey`).
fn match_template(kind: TemplateKind, baked: u16, candidate: &[u8]) -> Result<Capture, Error> {
    let reference = matcher_template(kind, baked)?;

    let mut pubkeys = Vec::new();
    let mut hashes = Vec::new();
    let mut r_off = 0usize;
    let mut c_off = 0usize;

    while r_off < reference.len() && c_off < candidate.len() {
        let (r_word, r_next) = assembler::decode_word(&reference, r_off)?;
        let (c_word, c_next) = assembler::decode_word(candidate, c_off)?;

        if is_wildcard_pubkey(&r_word) {
            let data = c_word.data.as_deref().ok_or(Error::InvalidScript(hex::encode(candidate)))?;
            let inner = secp256k1::PublicKey::from_slice(data)?;
            pubkeys.push(bitcoin::PublicKey {
                inner,
                compressed: data.len() == 33,
            });
        } else if is_wildcard_hash(&r_word) {
            let data = c_word.data.as_deref().ok_or(Error::InvalidScript(hex::encode(candidate)))?;
            let hash: [u8; 20] = data
                .try_into()
                .map_err(|_| Error::InvalidScript(hex::encode(candidate)))?;
            hashes.push(hash);
        } else if r_word != c_word {
            return Err(Error::InvalidScript(hex::encode(candidate)));
        }

        r_off = r_next;
        c_off = c_next;
    }

    if r_off != reference.len() || c_off != candidate.len() {
        return Err(Error::InvalidScript(hex::encode(candidate)));
    }

    if matches!(kind, TemplateKind::Deposit) {
        let payer_occurrences = [&pubkeys[0], &pubkeys[2], &pubkeys[3]];
        if payer_occurrences.iter().any(|pk| **pk != pubkeys[0]) {
            return Err(Error::InvalidScript(hex::encode(candidate)));
        }
    }

    Ok(Capture { pubkeys, hashes })
}

/// A request to produce a signed input for one of the seven spend paths.
/// Carries exactly the data that path's `scriptSig` builder needs beyond
/// what the matcher captures from the previous output script.
pub enum SpendRequest {
    CreateCommit { sighash_type: u8 },
    FinalizeCommit { partial_scriptsig: Vec<u8> },
    Change {
        spend_secret: Vec<u8>,
        sighash_type: u8,
    },
    Expire { sighash_type: u8 },
    Payout {
        spend_secret: Vec<u8>,
        sighash_type: u8,
    },
    Revoke {
        revoke_secret: Vec<u8>,
        sighash_type: u8,
    },
}

impl SpendRequest {
    fn spend_path(&self) -> SpendPath {
        match self {
            SpendRequest::CreateCommit { .. } => SpendPath::CreateCommit,
            SpendRequest::FinalizeCommit { .. } => SpendPath::FinalizeCommit,
            SpendRequest::Change { .. } => SpendPath::Change,
            SpendRequest::Expire { .. } => SpendPath::Expire,
            SpendRequest::Payout { .. } => SpendPath::Payout,
            SpendRequest::Revoke { .. } => SpendPath::Revoke,
        }
    }

    fn template_kind(&self) -> TemplateKind {
        match self {
            SpendRequest::Payout { .. } | SpendRequest::Revoke { .. } => TemplateKind::Commit,
            _ => TemplateKind::Deposit,
        }
    }
}

/// Recognize `prev_script` against the deposit/commit template for
/// `request`'s spend path (with `sequence_value` baked in as the concrete
/// `expire_time`/`delay_time`), scope-register that recognition for the
/// duration of this call, and — on a match — build and install the
/// resulting `scriptSig` on `tx.input[input_index]`.
///
/// The registry is restored to its pre-call state on every exit path,
/// including an early `?` return from a failed match or a failed build.
pub fn sign_input(
    request: SpendRequest,
    sequence_value: u16,
    tx: &mut bitcoin::Transaction,
    input_index: usize,
    prev_script: &[u8],
    sign_ctx: &dyn SignContext,
    key_store: &dyn KeyStore,
) -> Result<(), Error> {
    let spend_path = request.spend_path();
    tracing::debug!(?spend_path, input_index, "signing channel script input");
    let _guard = RegistrationGuard::new(spend_path);
    let capture = match_template(request.template_kind(), sequence_value, prev_script)
        .inspect_err(|error| tracing::warn!(?spend_path, %error, "template did not match"))?;

    let scriptsig = match request {
        SpendRequest::CreateCommit { sighash_type } => {
            let payer_pubkey = &capture.pubkeys[0];
            signer::build_create_commit_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payer_pubkey.to_bytes()),
                prev_script,
                sighash_type,
            )?
        }
        SpendRequest::FinalizeCommit { partial_scriptsig } => {
            let payer_pubkey = &capture.pubkeys[0];
            let payee_pubkey = &capture.pubkeys[1];
            signer::build_finalize_commit_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payee_pubkey.to_bytes()),
                payer_pubkey,
                prev_script,
                &partial_scriptsig,
            )?
        }
        SpendRequest::Change {
            spend_secret,
            sighash_type,
        } => {
            let payer_pubkey = &capture.pubkeys[0];
            signer::build_change_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payer_pubkey.to_bytes()),
                prev_script,
                &spend_secret,
                &capture.hashes[0],
                sighash_type,
            )?
        }
        SpendRequest::Expire { sighash_type } => {
            let payer_pubkey = &capture.pubkeys[0];
            signer::build_expire_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payer_pubkey.to_bytes()),
                prev_script,
                sighash_type,
            )?
        }
        SpendRequest::Payout {
            spend_secret,
            sighash_type,
        } => {
            let payee_pubkey = &capture.pubkeys[0];
            signer::build_payout_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payee_pubkey.to_bytes()),
                prev_script,
                &spend_secret,
                sighash_type,
            )?
        }
        SpendRequest::Revoke {
            revoke_secret,
            sighash_type,
        } => {
            let payer_pubkey = &capture.pubkeys[1];
            signer::build_revoke_scriptsig(
                sign_ctx,
                key_store,
                &hash160(&payer_pubkey.to_bytes()),
                prev_script,
                &revoke_secret,
                sighash_type,
            )?
        }
    };

    let input = tx
        .input
        .get_mut(input_index)
        .ok_or(Error::OutOfRange(input_index))?;
    input.script_sig = bitcoin::ScriptBuf::from_bytes(scriptsig);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash160;
    use crate::template::compile_deposit_script;

    fn keypair(byte: u8) -> (secp256k1::SecretKey, bitcoin::PublicKey) {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[byte; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        (sk, bitcoin::PublicKey::new(pk))
    }

    struct FixedContext {
        digest: [u8; 32],
    }
    impl SignContext for FixedContext {
        fn sighash(&self, _sighash_type: u8, _script_to_hash: &[u8]) -> Result<[u8; 32], Error> {
            Ok(self.digest)
        }
    }

    struct SingleKeyStore {
        hash: [u8; 20],
        key: secp256k1::SecretKey,
    }
    impl KeyStore for SingleKeyStore {
        fn secret_key_for(&self, pubkey_hash: &[u8; 20]) -> Result<secp256k1::SecretKey, Error> {
            if *pubkey_hash == self.hash {
                Ok(self.key)
            } else {
                Err(Error::KeyNotFound(hex::encode(pubkey_hash)))
            }
        }
    }

    fn empty_tx_with_one_input() -> bitcoin::Transaction {
        bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![bitcoin::TxIn {
                previous_output: bitcoin::OutPoint::null(),
                script_sig: bitcoin::ScriptBuf::new(),
                sequence: bitcoin::Sequence::ZERO,
                witness: bitcoin::Witness::new(),
            }],
            output: vec![],
        }
    }

    #[test]
    fn registry_is_balanced_after_success_and_failure() {
        let (payer_sk, payer_pk) = keypair(41);
        let (_, payee_pk) = keypair(42);
        let spend_hash = hash160(b"spend-secret");
        let deposit_script =
            compile_deposit_script(&payer_pk, &payee_pk, &spend_hash, 1000).unwrap();

        let ctx = FixedContext { digest: [7; 32] };
        let store = SingleKeyStore {
            hash: hash160(&payer_pk.to_bytes()),
            key: payer_sk,
        };

        let before = registry_depth();
        let mut tx = empty_tx_with_one_input();
        sign_input(
            SpendRequest::CreateCommit {
                sighash_type: signer::SIGHASH_ALL,
            },
            1000,
            &mut tx,
            0,
            &deposit_script,
            &ctx,
            &store,
        )
        .unwrap();
        assert_eq!(registry_depth(), before);

        // A mismatched sequence value fails the match; the registry must
        // still be balanced afterward.
        let mut tx2 = empty_tx_with_one_input();
        let err = sign_input(
            SpendRequest::CreateCommit {
                sighash_type: signer::SIGHASH_ALL,
            },
            2000,
            &mut tx2,
            0,
            &deposit_script,
            &ctx,
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidScript(_)));
        assert_eq!(registry_depth(), before);
    }
}
