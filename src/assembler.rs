//! Bitcoin Script bytecode assembly and disassembly.
//!
//! This is the leaf component: it knows nothing about deposit or commit
//! scripts, only about the byte-level shape of Script words (opcode plus
//! optional immediate data) and about the canonical (minimal-push) encoding
//! rules that the rest of the crate relies on for byte-exact comparisons.

use bitcoin::opcodes::all as opcodes;

use crate::error::Error;

const OP_PUSHDATA1: u8 = opcodes::OP_PUSHDATA1.to_u8();
const OP_PUSHDATA2: u8 = opcodes::OP_PUSHDATA2.to_u8();
const OP_PUSHDATA4: u8 = opcodes::OP_PUSHDATA4.to_u8();
const OP_PUSHNUM_1: u8 = opcodes::OP_PUSHNUM_1.to_u8();
const OP_PUSHNUM_16: u8 = opcodes::OP_PUSHNUM_16.to_u8();

/// Non-executing template-matching placeholder for "any pubkey push here",
/// used only by [`crate::dispatch`]'s matcher templates, never emitted in a
/// compiled deposit/commit script.
pub const OP_PUBKEY: u8 = opcodes::OP_PUBKEY.to_u8();
/// Non-executing template-matching placeholder for "any 20-byte push
/// here", used only by [`crate::dispatch`]'s matcher templates.
pub const OP_PUBKEYHASH: u8 = opcodes::OP_PUBKEYHASH.to_u8();

/// Max sequence value a deposit/commit script is allowed to encode, per
/// the `CHECKSEQUENCEVERIFY` relative-locktime field width.
pub const MAX_SEQUENCE: u32 = 0x0000_FFFF;

/// A single decoded Script word: an opcode byte plus the immediate data it
/// pushes, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// The opcode byte.
    pub opcode: u8,
    /// The pushed data, if this word is a data push.
    pub data: Option<Vec<u8>>,
}

impl Word {
    /// `true` if this word pushes data onto the stack.
    pub fn is_push(&self) -> bool {
        self.data.is_some()
    }
}

/// Human-readable form of a word, used in error messages.
pub fn disassemble(word: &Word) -> String {
    if word.opcode == 0 {
        // OP_0 is itself a (zero-length) data push; show its mnemonic
        // rather than the empty hex string `is_push()` would suggest.
        "OP_0".to_string()
    } else if let Some(data) = &word.data {
        hex::encode(data)
    } else {
        opcode_name(word.opcode).unwrap_or_else(|| format!("OP_UNKNOWN_{:#04x}", word.opcode))
    }
}

fn opcode_name(opcode: u8) -> Option<String> {
    let name = match opcode {
        0x00 => "OP_0",
        0x63 => "OP_IF",
        0x67 => "OP_ELSE",
        0x68 => "OP_ENDIF",
        0x69 => "OP_VERIFY",
        0x6a => "OP_RETURN",
        0x75 => "OP_DROP",
        0x76 => "OP_DUP",
        0x87 => "OP_EQUAL",
        0x88 => "OP_EQUALVERIFY",
        0xa9 => "OP_HASH160",
        0xac => "OP_CHECKSIG",
        0xae => "OP_CHECKMULTISIG",
        0xb2 => "OP_NOP3",
        _ if opcode == OP_PUBKEY => "OP_PUBKEY",
        _ if opcode == OP_PUBKEYHASH => "OP_PUBKEYHASH",
        _ if (OP_PUSHNUM_1..=OP_PUSHNUM_16).contains(&opcode) => {
            return Some(format!("OP_{}", opcode - OP_PUSHNUM_1 + 1));
        }
        _ => return None,
    };
    Some(name.to_string())
}

/// Decode the word starting at `offset`, returning it plus the offset of
/// the next word.
///
/// Word boundaries follow the standard Bitcoin Script push-data rules:
/// opcodes `1..=75` push that many immediate bytes, `76`/`77`/`78`
/// (`OP_PUSHDATA1`/`2`/`4`) push a length-prefixed blob, everything else
/// takes no immediate data.
pub fn decode_word(bytes: &[u8], offset: usize) -> Result<(Word, usize), Error> {
    if offset >= bytes.len() {
        return Err(Error::MalformedScript);
    }
    let opcode = bytes[offset];
    let mut pos = offset + 1;

    let data = match opcode {
        // OP_0 pushes a zero-length byte string; rust-bitcoin's own
        // `Instruction::PushBytes` treats it the same way, so `is_push()`
        // reports it as a data push like any other minimal-push word.
        0 => Some(Vec::new()),
        1..=75 => Some(take(bytes, &mut pos, opcode as usize)?),
        OP_PUSHDATA1 => {
            let len = take(bytes, &mut pos, 1)?[0] as usize;
            Some(take(bytes, &mut pos, len)?)
        }
        OP_PUSHDATA2 => {
            let raw = take(bytes, &mut pos, 2)?;
            let len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
            Some(take(bytes, &mut pos, len)?)
        }
        OP_PUSHDATA4 => {
            let raw = take(bytes, &mut pos, 4)?;
            let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
            Some(take(bytes, &mut pos, len)?)
        }
        _ => None,
    };

    Ok((Word { opcode, data }, pos))
}

fn take(bytes: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>, Error> {
    let end = pos.checked_add(len).ok_or(Error::MalformedScript)?;
    let slice = bytes.get(*pos..end).ok_or(Error::MalformedScript)?;
    *pos = end;
    Ok(slice.to_vec())
}

/// Decode words sequentially and return the `index`-th one (0-based),
/// along with its disassembly.
///
/// Fails with [`Error::OutOfRange`] if the script has `index` or fewer
/// words; decode failures for a truncated word propagate as
/// [`Error::MalformedScript`].
pub fn get_word(bytes: &[u8], index: usize) -> Result<(Word, String), Error> {
    let mut offset = 0usize;
    let mut count = 0usize;
    let mut last = None;

    while offset < bytes.len() && count <= index {
        let (word, next) = decode_word(bytes, offset)?;
        offset = next;
        last = Some(word);
        count += 1;
    }

    if count != index + 1 {
        return Err(Error::OutOfRange(index));
    }
    let word = last.expect("count == index + 1 implies a word was decoded");
    let disassembly = disassemble(&word);
    Ok((word, disassembly))
}

/// Decode every word in a script, in order.
pub fn words(bytes: &[u8]) -> Result<Vec<Word>, Error> {
    let mut offset = 0;
    let mut out = Vec::new();
    while offset < bytes.len() {
        let (word, next) = decode_word(bytes, offset)?;
        offset = next;
        out.push(word);
    }
    Ok(out)
}

/// Append a minimal (canonical) data push for `data` to `out`.
pub fn push_data(data: &[u8], out: &mut Vec<u8>) {
    let len = data.len();
    if len <= 75 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Append a minimal encoding of the non-negative integer `n` to `out`,
/// using `OP_0`/`OP_1`..`OP_16` where possible and falling back to a
/// minimal little-endian data push otherwise.
pub fn push_int(n: u32, out: &mut Vec<u8>) {
    if n == 0 {
        out.push(0);
        return;
    }
    if (1..=16).contains(&n) {
        out.push(OP_PUSHNUM_1 + (n as u8) - 1);
        return;
    }
    let mut bytes = Vec::new();
    let mut v = n;
    while v > 0 {
        bytes.push((v & 0xff) as u8);
        v >>= 8;
    }
    // Avoid the top bit looking like a sign flag in CScriptNum encoding.
    if bytes.last().is_some_and(|b| b & 0x80 != 0) {
        bytes.push(0);
    }
    push_data(&bytes, out);
}

/// Compile a whitespace-separated sequence of tokens into bytecode.
///
/// Each token is one of: a known `OP_*` mnemonic, a decimal integer
/// (pushed with [`push_int`]), or an even-length hex literal (pushed with
/// [`push_data`]).
pub fn compile_asm(text: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for token in text.split_whitespace() {
        if let Some(opcode) = mnemonic(token) {
            out.push(opcode);
        } else if let Ok(n) = token.parse::<u32>() {
            push_int(n, &mut out);
        } else if is_hex(token) {
            let data = hex::decode(token)?;
            push_data(&data, &mut out);
        } else {
            return Err(Error::MalformedScript);
        }
    }
    Ok(out)
}

fn is_hex(token: &str) -> bool {
    !token.is_empty() && token.len() % 2 == 0 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

fn mnemonic(token: &str) -> Option<u8> {
    let opcode = match token {
        "OP_0" => opcodes::OP_PUSHBYTES_0.to_u8(),
        "OP_1" => OP_PUSHNUM_1,
        "OP_IF" => opcodes::OP_IF.to_u8(),
        "OP_ELSE" => opcodes::OP_ELSE.to_u8(),
        "OP_ENDIF" => opcodes::OP_ENDIF.to_u8(),
        "OP_DROP" => opcodes::OP_DROP.to_u8(),
        "OP_HASH160" => opcodes::OP_HASH160.to_u8(),
        "OP_EQUALVERIFY" => opcodes::OP_EQUALVERIFY.to_u8(),
        "OP_CHECKSIG" => opcodes::OP_CHECKSIG.to_u8(),
        "OP_CHECKMULTISIG" => opcodes::OP_CHECKMULTISIG.to_u8(),
        "OP_NOP3" => opcodes::OP_NOP3.to_u8(),
        "OP_PUBKEY" => OP_PUBKEY,
        "OP_PUBKEYHASH" => OP_PUBKEYHASH,
        _ => return None,
    };
    Some(opcode)
}

/// Decode a sequence value (as consumed by `OP_NOP3`/`CHECKSEQUENCEVERIFY`)
/// from an already-decoded word.
///
/// `OP_0` decodes to `0`; opcodes `1..=75` decode to the little-endian
/// integer of their immediate bytes; `OP_1`..`OP_16` decode to `opcode -
/// 80`. Any other word, or any value outside `[0, 0xFFFF]`, is rejected.
pub fn parse_sequence_value(word: &Word) -> Result<u16, Error> {
    let value: i64 = match word.opcode {
        0 => 0,
        1..=75 => {
            let data = word.data.as_deref().unwrap_or(&[]);
            if data.len() > 8 {
                i64::MAX
            } else {
                data.iter()
                    .enumerate()
                    .fold(0i64, |acc, (i, b)| acc | ((*b as i64) << (8 * i)))
            }
        }
        OP_PUSHNUM_1..=OP_PUSHNUM_16 => (word.opcode - OP_PUSHNUM_1 + 1) as i64,
        _ => -1,
    };
    if !(0..=MAX_SEQUENCE as i64).contains(&value) {
        return Err(Error::InvalidSequenceValue(disassemble(word)));
    }
    Ok(value as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn decode_word_handles_direct_push() {
        let script = compile_asm("deadbeef").unwrap();
        let (word, next) = decode_word(&script, 0).unwrap();
        assert_eq!(word.data.as_deref(), Some(&b"\xde\xad\xbe\xef"[..]));
        assert_eq!(next, script.len());
    }

    #[test]
    fn decode_word_rejects_truncated_push() {
        // OP_PUSHBYTES_4 claims 4 bytes but only 2 are present.
        let script = [0x04u8, 0xde, 0xad];
        assert!(matches!(
            decode_word(&script, 0),
            Err(Error::MalformedScript)
        ));
    }

    #[test]
    fn get_word_out_of_range() {
        let script = compile_asm("OP_DROP").unwrap();
        assert!(matches!(get_word(&script, 3), Err(Error::OutOfRange(3))));
    }

    #[test_case(0, "OP_0")]
    #[test_case(1, "01")]
    #[test_case(16, "OP_16")]
    #[test_case(0xFFFF, "ffff00")]
    fn sequence_value_round_trips(value: u32, _label: &str) {
        let mut bytes = Vec::new();
        push_int(value, &mut bytes);
        let (word, _) = decode_word(&bytes, 0).unwrap();
        assert_eq!(parse_sequence_value(&word).unwrap() as u32, value);
    }

    #[test]
    fn sequence_value_rejects_overflow() {
        let mut bytes = Vec::new();
        push_int(0x1_0000, &mut bytes);
        let (word, _) = decode_word(&bytes, 0).unwrap();
        assert!(matches!(
            parse_sequence_value(&word),
            Err(Error::InvalidSequenceValue(_))
        ));
    }
}
