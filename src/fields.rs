//! Typed field accessors over an already-recognized deposit or commit
//! script, plus the payout-scriptSig probe used to recover a revealed
//! spend secret.
//!
//! None of these functions re-validate the template shape; callers are
//! expected to have gone through [`crate::template::validate_deposit_script`]
//! or [`crate::template::validate_commit_script`] first. Running an
//! accessor against an unrecognized script just surfaces whatever
//! [`crate::assembler`] error the malformed word produces.

use crate::assembler::{self, Word};
use crate::error::Error;

fn pubkey_from_word(word: &Word) -> Result<bitcoin::PublicKey, Error> {
    let data = word.data.as_deref().ok_or(Error::MalformedScript)?;
    let inner = secp256k1::PublicKey::from_slice(data)?;
    Ok(bitcoin::PublicKey {
        inner,
        compressed: data.len() == 33,
    })
}

fn hash160_from_word(word: &Word) -> Result<[u8; 20], Error> {
    let data = word.data.as_deref().ok_or(Error::MalformedScript)?;
    data.try_into().map_err(|_| Error::MalformedScript)
}

/// Word index of `payer_pubkey` in a compiled deposit script.
const DEPOSIT_PAYER_PUBKEY: usize = 2;
/// Word index of `payee_pubkey` in a compiled deposit script.
const DEPOSIT_PAYEE_PUBKEY: usize = 3;
/// Word index of `spend_secret_hash` in a compiled deposit script.
const DEPOSIT_SPEND_SECRET_HASH: usize = 9;
/// Word index of `expire_time` in a compiled deposit script.
const DEPOSIT_EXPIRE_TIME: usize = 14;

/// Word index of `delay_time` in a compiled commit script.
const COMMIT_DELAY_TIME: usize = 1;
/// Word index of `spend_secret_hash` in a compiled commit script.
const COMMIT_SPEND_SECRET_HASH: usize = 5;
/// Word index of `payee_pubkey` in a compiled commit script.
const COMMIT_PAYEE_PUBKEY: usize = 7;
/// Word index of `revoke_secret_hash` in a compiled commit script.
const COMMIT_REVOKE_SECRET_HASH: usize = 11;
/// Word index of `payer_pubkey` in a compiled commit script.
const COMMIT_PAYER_PUBKEY: usize = 13;

pub fn get_deposit_payer_pubkey(script: &[u8]) -> Result<bitcoin::PublicKey, Error> {
    let (word, _) = assembler::get_word(script, DEPOSIT_PAYER_PUBKEY)?;
    pubkey_from_word(&word)
}

pub fn get_deposit_payee_pubkey(script: &[u8]) -> Result<bitcoin::PublicKey, Error> {
    let (word, _) = assembler::get_word(script, DEPOSIT_PAYEE_PUBKEY)?;
    pubkey_from_word(&word)
}

pub fn get_deposit_spend_secret_hash(script: &[u8]) -> Result<[u8; 20], Error> {
    let (word, _) = assembler::get_word(script, DEPOSIT_SPEND_SECRET_HASH)?;
    hash160_from_word(&word)
}

pub fn get_deposit_expire_time(script: &[u8]) -> Result<u16, Error> {
    let (word, _) = assembler::get_word(script, DEPOSIT_EXPIRE_TIME)?;
    assembler::parse_sequence_value(&word)
}

pub fn get_commit_delay_time(script: &[u8]) -> Result<u16, Error> {
    let (word, _) = assembler::get_word(script, COMMIT_DELAY_TIME)?;
    assembler::parse_sequence_value(&word)
}

pub fn get_commit_spend_secret_hash(script: &[u8]) -> Result<[u8; 20], Error> {
    let (word, _) = assembler::get_word(script, COMMIT_SPEND_SECRET_HASH)?;
    hash160_from_word(&word)
}

pub fn get_commit_payee_pubkey(script: &[u8]) -> Result<bitcoin::PublicKey, Error> {
    let (word, _) = assembler::get_word(script, COMMIT_PAYEE_PUBKEY)?;
    pubkey_from_word(&word)
}

pub fn get_commit_revoke_secret_hash(script: &[u8]) -> Result<[u8; 20], Error> {
    let (word, _) = assembler::get_word(script, COMMIT_REVOKE_SECRET_HASH)?;
    hash160_from_word(&word)
}

pub fn get_commit_payer_pubkey(script: &[u8]) -> Result<bitcoin::PublicKey, Error> {
    let (word, _) = assembler::get_word(script, COMMIT_PAYER_PUBKEY)?;
    pubkey_from_word(&word)
}

/// Probe a payout transaction's first input for a revealed spend secret.
///
/// `raw_payout_tx` is the consensus-encoded payout transaction; `commit_script`
/// is the redeem script the payout is expected to spend. Returns `Ok(None)`
/// (not an error) when input 0's scriptSig does not have the payout
/// template's shape — `<sig> <spend_secret> OP_1 <commit_script>` — or when
/// its trailing push is not exactly `commit_script`, since the caller is
/// typically probing several candidate spends at once.
pub fn get_spend_secret_from_payout(
    raw_payout_tx: &[u8],
    commit_script: &[u8],
) -> Result<Option<Vec<u8>>, Error> {
    let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(raw_payout_tx)?;
    let input = tx.input.first().ok_or(Error::MalformedScript)?;
    let script_sig = input.script_sig.as_bytes();

    let reference = assembler::compile_asm("deadbeef deadbeef OP_1 deadbeef")?;
    if crate::template::validate_against_reference(&reference, script_sig).is_err() {
        return Ok(None);
    }

    let (redeem_word, _) = assembler::get_word(script_sig, 3)?;
    if redeem_word.data.as_deref() != Some(commit_script) {
        return Ok(None);
    }

    let (secret_word, _) = assembler::get_word(script_sig, 1)?;
    Ok(secret_word.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash160;
    use crate::template::{compile_commit_script, compile_deposit_script};

    fn test_pubkey(byte: u8) -> bitcoin::PublicKey {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[byte; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        bitcoin::PublicKey::new(pk)
    }

    #[test]
    fn deposit_accessors_round_trip() {
        let payer = test_pubkey(1);
        let payee = test_pubkey(2);
        let hash = hash160(b"spend-secret");
        let script = compile_deposit_script(&payer, &payee, &hash, 1000).unwrap();

        assert_eq!(get_deposit_payer_pubkey(&script).unwrap(), payer);
        assert_eq!(get_deposit_payee_pubkey(&script).unwrap(), payee);
        assert_eq!(get_deposit_spend_secret_hash(&script).unwrap(), hash);
        assert_eq!(get_deposit_expire_time(&script).unwrap(), 1000);
    }

    #[test]
    fn commit_accessors_round_trip() {
        let payer = test_pubkey(3);
        let payee = test_pubkey(4);
        let spend_hash = hash160(b"spend-secret");
        let revoke_hash = hash160(b"revoke-secret");
        let script =
            compile_commit_script(&payer, &payee, &spend_hash, &revoke_hash, 144).unwrap();

        assert_eq!(get_commit_delay_time(&script).unwrap(), 144);
        assert_eq!(get_commit_spend_secret_hash(&script).unwrap(), spend_hash);
        assert_eq!(get_commit_payee_pubkey(&script).unwrap(), payee);
        assert_eq!(
            get_commit_revoke_secret_hash(&script).unwrap(),
            revoke_hash
        );
        assert_eq!(get_commit_payer_pubkey(&script).unwrap(), payer);
    }

    #[test]
    fn spend_secret_from_unrelated_scriptsig_is_none() {
        let commit_script = assembler::compile_asm("OP_DROP").unwrap();
        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![bitcoin::TxIn {
                previous_output: bitcoin::OutPoint::null(),
                script_sig: bitcoin::ScriptBuf::from_bytes(
                    assembler::compile_asm("OP_DROP OP_DROP").unwrap(),
                ),
                sequence: bitcoin::Sequence::ZERO,
                witness: bitcoin::Witness::new(),
            }],
            output: vec![],
        };
        let raw = bitcoin::consensus::serialize(&tx);
        assert_eq!(
            get_spend_secret_from_payout(&raw, &commit_script).unwrap(),
            None
        );
    }

    #[test]
    fn spend_secret_from_payout_recovers_secret() {
        let payer = test_pubkey(5);
        let payee = test_pubkey(6);
        let secret = b"the-spend-secret-preimage-32byt".to_vec();
        let spend_hash = hash160(&secret);
        let revoke_hash = hash160(b"revoke-secret");
        let commit_script =
            compile_commit_script(&payer, &payee, &spend_hash, &revoke_hash, 144).unwrap();

        let mut script_sig = Vec::new();
        assembler::push_data(&[0u8; 71], &mut script_sig); // placeholder sig
        assembler::push_data(&secret, &mut script_sig);
        assembler::push_int(1, &mut script_sig);
        assembler::push_data(&commit_script, &mut script_sig);

        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![bitcoin::TxIn {
                previous_output: bitcoin::OutPoint::null(),
                script_sig: bitcoin::ScriptBuf::from_bytes(script_sig),
                sequence: bitcoin::Sequence::ZERO,
                witness: bitcoin::Witness::new(),
            }],
            output: vec![],
        };
        let raw = bitcoin::consensus::serialize(&tx);

        let recovered = get_spend_secret_from_payout(&raw, &commit_script)
            .unwrap()
            .unwrap();
        assert_eq!(recovered, secret);
    }
}
