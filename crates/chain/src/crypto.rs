//! crypto helpers for lattice-chain: sha3-512 hashing for the settlement state root
use sha3::{Digest, Sha3_512};

use crate::types::Hash;

/// compute sha3-512 raw bytes (64 bytes)
pub fn sha3_512_bytes(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    hasher.update(data);
    let sum = hasher.finalize();
    sum.into()
}

/// compute sha3-512 and return as Hash type
pub fn sha3_512(data: &[u8]) -> Hash {
    Hash::from_bytes(sha3_512_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_deterministic() {
        assert_eq!(sha3_512(b"hello"), sha3_512(b"hello"));
        assert_ne!(sha3_512(b"hello"), sha3_512(b"hello!"));
    }

    #[test]
    fn digest_is_64_bytes_hex() {
        assert_eq!(sha3_512(b"").to_hex().len(), 128);
    }
}
