//! Compiling and validating the two channel script templates.
//!
//! Both scripts are rendered from a fixed human-readable template (see
//! `DEPOSIT_TEMPLATE`/`COMMIT_TEMPLATE` below) by substituting the variable
//! fields and compiling the result with [`crate::assembler::compile_asm`].
//! Validating an untrusted script reuses the same rendering path with a
//! sentinel placeholder (the literal bytes `deadbeef`) standing in for
//! every variable field, then walks both scripts word-by-word.

use crate::assembler::{self, Word};
use crate::error::Error;

/// The sentinel data push used as a wildcard placeholder in reference
/// templates built for validation.
const SENTINEL: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
const SENTINEL_HEX: &str = "deadbeef";

pub(crate) const DEPOSIT_TEMPLATE: &str = "
    OP_IF
        2 {payer} {payee} 2 OP_CHECKMULTISIG
    OP_ELSE
        OP_IF
            OP_HASH160 {hash} OP_EQUALVERIFY
            {payer} OP_CHECKSIG
        OP_ELSE
            {expire} OP_NOP3 OP_DROP
            {payer} OP_CHECKSIG
        OP_ENDIF
    OP_ENDIF
";

pub(crate) const COMMIT_TEMPLATE: &str = "
    OP_IF
        {delay} OP_NOP3 OP_DROP
        OP_HASH160 {spend_hash} OP_EQUALVERIFY
        {payee} OP_CHECKSIG
    OP_ELSE
        OP_HASH160 {revoke_hash} OP_EQUALVERIFY
        {payer} OP_CHECKSIG
    OP_ENDIF
";

/// Substitute `{name}` placeholders in `template` with the given tokens and
/// compile the result. Shared by both script templates so the placeholder
/// substitution logic exists exactly once.
pub(crate) fn render(template: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>, Error> {
    let mut asm = template.to_string();
    for (name, token) in fields {
        asm = asm.replace(&format!("{{{name}}}"), token);
    }
    assembler::compile_asm(&asm)
}

/// Compile the deposit scriptPubKey for concrete field values.
pub fn compile_deposit_script(
    payer_pubkey: &bitcoin::PublicKey,
    payee_pubkey: &bitcoin::PublicKey,
    spend_secret_hash: &[u8; 20],
    expire_time: u16,
) -> Result<Vec<u8>, Error> {
    render(
        DEPOSIT_TEMPLATE,
        &[
            ("payer", &hex::encode(payer_pubkey.to_bytes())),
            ("payee", &hex::encode(payee_pubkey.to_bytes())),
            ("hash", &hex::encode(spend_secret_hash)),
            ("expire", &expire_time.to_string()),
        ],
    )
}

/// Compile the commit scriptPubKey for concrete field values.
pub fn compile_commit_script(
    payer_pubkey: &bitcoin::PublicKey,
    payee_pubkey: &bitcoin::PublicKey,
    spend_secret_hash: &[u8; 20],
    revoke_secret_hash: &[u8; 20],
    delay_time: u16,
) -> Result<Vec<u8>, Error> {
    render(
        COMMIT_TEMPLATE,
        &[
            ("payer", &hex::encode(payer_pubkey.to_bytes())),
            ("payee", &hex::encode(payee_pubkey.to_bytes())),
            ("spend_hash", &hex::encode(spend_secret_hash)),
            ("revoke_hash", &hex::encode(revoke_secret_hash)),
            ("delay", &delay_time.to_string()),
        ],
    )
}

/// The deposit reference template, with every variable field (including
/// `expire_time`) replaced by the `deadbeef` sentinel.
fn deposit_reference() -> Result<Vec<u8>, Error> {
    render(
        DEPOSIT_TEMPLATE,
        &[
            ("payer", SENTINEL_HEX),
            ("payee", SENTINEL_HEX),
            ("hash", SENTINEL_HEX),
            ("expire", SENTINEL_HEX),
        ],
    )
}

/// The commit reference template, with every variable field (including
/// `delay_time`) replaced by the `deadbeef` sentinel.
fn commit_reference() -> Result<Vec<u8>, Error> {
    render(
        COMMIT_TEMPLATE,
        &[
            ("payer", SENTINEL_HEX),
            ("payee", SENTINEL_HEX),
            ("spend_hash", SENTINEL_HEX),
            ("revoke_hash", SENTINEL_HEX),
            ("delay", SENTINEL_HEX),
        ],
    )
}

/// Walk `reference` and `candidate` word by word. A reference word that is
/// a data push equal to the sentinel `deadbeef` accepts any data push on
/// the candidate side (a wildcard slot); every other word must be
/// byte-identical on both sides. Both cursors must reach end-of-script at
/// the same time.
pub fn validate_against_reference(reference: &[u8], candidate: &[u8]) -> Result<(), Error> {
    let mut r_off = 0usize;
    let mut c_off = 0usize;

    while r_off < reference.len() && c_off < candidate.len() {
        let (r_word, r_next) = assembler::decode_word(reference, r_off)?;
        let (c_word, c_next) = assembler::decode_word(candidate, c_off)?;

        if is_sentinel(&r_word) {
            if !c_word.is_push() {
                return Err(Error::InvalidScript(hex::encode(candidate)));
            }
        } else if r_word != c_word {
            return Err(Error::InvalidScript(hex::encode(candidate)));
        }

        r_off = r_next;
        c_off = c_next;
    }

    if r_off != reference.len() || c_off != candidate.len() {
        return Err(Error::InvalidScript(hex::encode(candidate)));
    }
    Ok(())
}

fn is_sentinel(word: &Word) -> bool {
    word.data.as_deref() == Some(&SENTINEL[..])
}

/// Validate that `script` matches the deposit script template. If
/// `check_sequence` is set, also confirm its `expire_time` word decodes to
/// a value in `[0, 0xFFFF]`.
pub fn validate_deposit_script(script: &[u8], check_sequence: bool) -> Result<(), Error> {
    let reference = deposit_reference()?;
    validate_against_reference(&reference, script)?;
    if check_sequence {
        let (word, _) = assembler::get_word(script, 14)?;
        assembler::parse_sequence_value(&word)?;
    }
    Ok(())
}

/// Validate that `script` matches the commit script template. If
/// `check_sequence` is set, also confirm its `delay_time` word decodes to
/// a value in `[0, 0xFFFF]`.
pub fn validate_commit_script(script: &[u8], check_sequence: bool) -> Result<(), Error> {
    let reference = commit_reference()?;
    validate_against_reference(&reference, script)?;
    if check_sequence {
        let (word, _) = assembler::get_word(script, 1)?;
        assembler::parse_sequence_value(&word)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash160;

    fn test_pubkey(byte: u8) -> bitcoin::PublicKey {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[byte; 32]).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        bitcoin::PublicKey::new(pk)
    }

    #[test]
    fn compile_deposit_then_validate_round_trips() {
        let payer = test_pubkey(1);
        let payee = test_pubkey(2);
        let hash = hash160(b"spend-secret");
        let script = compile_deposit_script(&payer, &payee, &hash, 1000).unwrap();
        validate_deposit_script(&script, true).unwrap();
    }

    #[test]
    fn sequence_edge_values_round_trip() {
        let payer = test_pubkey(1);
        let payee = test_pubkey(2);
        let hash = hash160(b"spend-secret");
        let revoke = hash160(b"revoke-secret");

        let zero = compile_commit_script(&payer, &payee, &hash, &revoke, 0).unwrap();
        validate_commit_script(&zero, true).unwrap();

        let max = compile_commit_script(&payer, &payee, &hash, &revoke, 0xFFFF).unwrap();
        validate_commit_script(&max, true).unwrap();
    }

    #[test]
    fn overflowing_sequence_value_rejected() {
        // expire_time=0 compiles its word 14 as a lone OP_0 byte; splice in
        // a 3-byte minimal push of 0x10000 at that position instead.
        let payer = test_pubkey(1);
        let payee = test_pubkey(2);
        let hash = hash160(b"spend-secret");
        let script = compile_deposit_script(&payer, &payee, &hash, 0).unwrap();

        let mut offset = 0;
        for _ in 0..14 {
            let (_, next) = assembler::decode_word(&script, offset).unwrap();
            offset = next;
        }
        let (expire_word, after_expire) = assembler::decode_word(&script, offset).unwrap();
        assert_eq!(expire_word.opcode, 0, "expire_time=0 encodes as OP_0");

        let mut patched = script[..offset].to_vec();
        patched.extend_from_slice(&[0x03, 0x00, 0x00, 0x01]);
        patched.extend_from_slice(&script[after_expire..]);

        assert!(validate_deposit_script(&patched, true).is_err());
    }

    #[test]
    fn single_byte_mutation_is_rejected() {
        let payer = test_pubkey(1);
        let payee = test_pubkey(2);
        let hash = hash160(b"spend-secret");
        let reference = compile_deposit_script(&payer, &payee, &hash, 1000).unwrap();
        let mut mutated = reference.clone();
        let idx = mutated.len() - 10;
        mutated[idx] ^= 0xff;
        assert!(validate_against_reference(&reference, &mutated).is_err());
    }
}
