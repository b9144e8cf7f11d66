//! hash160 (`RIPEMD160(SHA256(x))`), used throughout the channel scripts to
//! commit to spend/revoke secrets.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Compute `RIPEMD160(SHA256(data))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    ripe.into()
}
