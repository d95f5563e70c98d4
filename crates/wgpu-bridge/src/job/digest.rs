use std::fmt;

use sha2::{Digest as _, Sha256};

use super::SEED_LEN;

/// A 32-byte SHA-256 digest, most significant byte first.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Builds a digest from the eight big-endian state words SHA-256 produces.
    pub fn from_words(words: [u32; 8]) -> Self {
        let mut bytes = [0u8; 32];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Self(bytes)
    }

    /// SHA-256 of [`message`]`(nonce, seed)`, computed on the CPU.
    pub fn of_nonce(nonce: u64, seed: &[u8; SEED_LEN]) -> Self {
        Self(Sha256::digest(message(nonce, seed)).into())
    }

    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in self.0 {
            if byte != 0 {
                return bits + byte.leading_zeros();
            }
            bits += 8;
        }
        bits
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The 32-byte message hashed for `nonce`: little-endian nonce, then the seed.
pub fn message(nonce: u64, seed: &[u8; SEED_LEN]) -> [u8; 32] {
    let mut msg = [0u8; 32];
    msg[..8].copy_from_slice(&nonce.to_le_bytes());
    msg[8..].copy_from_slice(seed);
    msg
}

/// Seed as the six big-endian message words the shader consumes.
pub(crate) fn seed_words(seed: &[u8; SEED_LEN]) -> [u32; 6] {
    let mut words = [0u32; 6];
    for (word, chunk) in words.iter_mut().zip(seed.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}
