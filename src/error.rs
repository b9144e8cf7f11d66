//! Top-level error type for the channel script layer.

/// Errors raised while assembling, validating, or signing channel scripts.
///
/// All variants are fatal to the operation that raised them; none are
/// retried internally. The one place an invalid input is *not* surfaced as
/// an error is [`crate::fields::get_spend_secret_from_payout`], which
/// returns `None` instead, since its caller is probing among several
/// possible spends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A candidate script did not match its reference template.
    #[error("invalid script: {0}")]
    InvalidScript(String),

    /// A sequence-value word decoded outside of `[0, 0xFFFF]`.
    #[error("invalid sequence value: {0}")]
    InvalidSequenceValue(String),

    /// The payer signature embedded in a create-commit scriptSig was
    /// malformed or did not verify during `sign_finalize_commit`.
    #[error("invalid payer signature: {0}")]
    InvalidPayerSignature(&'static str),

    /// Script bytecode was truncated or otherwise undecodable.
    #[error("malformed script: word decode ran past the end of the script")]
    MalformedScript,

    /// A word index was requested beyond the end of the script.
    #[error("word index {0} is out of range for this script")]
    OutOfRange(usize),

    /// A generic signing failure reported by the underlying signer.
    ///
    /// Constructed by [`crate::signer::StandardSigner`] implementors, not by
    /// this crate, since the deposit-funding inputs it covers are ordinary
    /// wallet signing delegated to that collaborator.
    #[error("signing failed: {0}")]
    BadSignature(String),

    /// The hash160 of a revealed preimage did not match the hash embedded
    /// in the script (e.g. `sign_change_recover` given the wrong secret).
    #[error("preimage does not match the embedded secret hash")]
    PreimageMismatch,

    /// No private key was registered for the given hash160 in the
    /// [`crate::signer::KeyStore`] collaborator.
    #[error("no key found for hash160 {0}")]
    KeyNotFound(String),

    /// A hex string could not be decoded.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A raw transaction could not be decoded from its consensus encoding.
    #[error("could not decode transaction: {0}")]
    Consensus(#[source] bitcoin::consensus::encode::Error),

    /// A secp256k1 operation (key parsing, sighash message construction)
    /// failed outside of the dedicated payer-signature verification path.
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[source] secp256k1::Error),
}

impl From<bitcoin::consensus::encode::Error> for Error {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        Error::Consensus(err)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(err: secp256k1::Error) -> Self {
        Error::Secp256k1(err)
    }
}
