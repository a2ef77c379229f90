//! Chunked authenticated encryption of file bodies.
//!
//! Plaintext is split into fixed-size slices (1 KiB by default, the last one
//! may be shorter) and each slice is sealed independently under the session
//! key with a fresh random nonce. Chunks carry no index: their position in
//! the stream is the only ordering information.
//!
//! Sealing and opening fan out over the rayon pool; results are always
//! assembled in stream order.

use std::num::NonZeroUsize;

use rand_core::{OsRng, RngCore};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{PqVaultError, Result};
use crate::kem::SessionKey;
use crate::primitives::{AeadCipher, Aes256GcmCipher};
use crate::{CHUNK_SIZE, NONCE_SIZE};

const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(CHUNK_SIZE) {
    Some(n) => n,
    None => panic!("CHUNK_SIZE must be non-zero"),
};

/// One sealed slice of plaintext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the authentication tag appended
    pub sealed_body: Vec<u8>,
}

impl Chunk {
    /// Value of the on-disk length field
    pub fn len(&self) -> usize {
        self.sealed_body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sealed_body.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkCipher<A = Aes256GcmCipher> {
    cipher: A,
    chunk_size: NonZeroUsize,
}

impl Default for ChunkCipher {
    fn default() -> Self {
        Self::new(Aes256GcmCipher)
    }
}

impl<A: AeadCipher> ChunkCipher<A> {
    pub fn new(cipher: A) -> Self {
        Self {
            cipher,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the plaintext chunk size. Opening does not depend on it, but
    /// containers sealed with a non-default size are not format 1.0.
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    /// Empty plaintext yields zero chunks.
    pub fn seal_chunks(&self, session_key: &SessionKey, plaintext: &[u8]) -> Result<Vec<Chunk>> {
        let chunks = plaintext
            .par_chunks(self.chunk_size.get())
            .enumerate()
            .map(|(index, slice)| {
                let mut nonce = [0u8; NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce);
                let sealed_body = self
                    .cipher
                    .seal(session_key.as_bytes(), &nonce, slice)
                    .map_err(|_| PqVaultError::encryption(format!("sealing chunk {} failed", index)))?;
                Ok(Chunk { nonce, sealed_body })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            plaintext_len = plaintext.len(),
            chunks = chunks.len(),
            "sealed chunk stream"
        );
        Ok(chunks)
    }

    /// Opens every chunk and concatenates the plaintext. Reports the lowest
    /// failing index and returns no partial plaintext.
    pub fn open_chunks(&self, session_key: &SessionKey, chunks: &[Chunk]) -> Result<Vec<u8>> {
        let opened: Vec<std::result::Result<Vec<u8>, usize>> = chunks
            .par_iter()
            .enumerate()
            .map(|(index, chunk)| {
                self.cipher
                    .open(session_key.as_bytes(), &chunk.nonce, &chunk.sealed_body)
                    .map_err(|_| index)
            })
            .collect();

        let mut plaintext = Vec::with_capacity(chunks.len() * self.chunk_size.get());
        for slice in opened {
            match slice {
                Ok(bytes) => plaintext.extend_from_slice(&bytes),
                Err(index) => {
                    warn!(index, "chunk authentication failed");
                    return Err(PqVaultError::ChunkAuthenticationFailed(index));
                }
            }
        }

        debug!(chunks = chunks.len(), plaintext_len = plaintext.len(), "opened chunk stream");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ChaCha20Poly1305Cipher;
    use crate::TAG_SIZE;

    fn key(b: u8) -> SessionKey {
        SessionKey::from_bytes([b; 32])
    }

    #[test]
    fn test_empty_plaintext_gives_zero_chunks() {
        let cc = ChunkCipher::default();
        let chunks = cc.seal_chunks(&key(1), b"").unwrap();
        assert!(chunks.is_empty());
        assert_eq!(cc.open_chunks(&key(1), &chunks).unwrap(), b"");
    }

    #[test]
    fn test_single_empty_chunk_opens_to_empty() {
        let cc = ChunkCipher::default();
        let k = key(1);
        let nonce = [5u8; NONCE_SIZE];
        let sealed_body = Aes256GcmCipher.seal(k.as_bytes(), &nonce, b"").unwrap();
        assert_eq!(sealed_body.len(), TAG_SIZE);

        let out = cc.open_chunks(&k, &[Chunk { nonce, sealed_body }]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_chunk_boundaries() {
        let cc = ChunkCipher::default();
        let plaintext = vec![0xAAu8; CHUNK_SIZE * 2 + 7];
        let chunks = cc.seal_chunks(&key(2), &plaintext).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK_SIZE + TAG_SIZE);
        assert_eq!(chunks[1].len(), CHUNK_SIZE + TAG_SIZE);
        assert_eq!(chunks[2].len(), 7 + TAG_SIZE);

        assert_eq!(cc.open_chunks(&key(2), &chunks).unwrap(), plaintext);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_chunk() {
        let cc = ChunkCipher::default();
        let chunks = cc.seal_chunks(&key(2), &vec![1u8; CHUNK_SIZE * 4]).unwrap();
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_nonces_are_unique() {
        let cc = ChunkCipher::default();
        let chunks = cc.seal_chunks(&key(3), &vec![0u8; CHUNK_SIZE * 64]).unwrap();
        let nonces: std::collections::HashSet<_> = chunks.iter().map(|c| c.nonce).collect();
        assert_eq!(nonces.len(), chunks.len());
    }

    #[test]
    fn test_order_is_preserved() {
        let cc = ChunkCipher::default();
        let plaintext: Vec<u8> = (0..CHUNK_SIZE * 16).map(|i| (i / CHUNK_SIZE) as u8).collect();
        let chunks = cc.seal_chunks(&key(4), &plaintext).unwrap();
        assert_eq!(cc.open_chunks(&key(4), &chunks).unwrap(), plaintext);
    }

    #[test]
    fn test_reports_first_failing_chunk() {
        let cc = ChunkCipher::default();
        let mut chunks = cc.seal_chunks(&key(5), &vec![9u8; CHUNK_SIZE * 5]).unwrap();
        chunks[3].sealed_body[0] ^= 1;
        chunks[1].nonce[0] ^= 1;

        let err = cc.open_chunks(&key(5), &chunks).unwrap_err();
        assert!(matches!(err, PqVaultError::ChunkAuthenticationFailed(1)));
    }

    #[test]
    fn test_swapped_chunks_still_positional() {
        // chunks carry no index, so a swap is only detectable at a higher layer
        let cc = ChunkCipher::default();
        let mut plaintext = vec![1u8; CHUNK_SIZE];
        plaintext.extend(vec![2u8; CHUNK_SIZE]);
        let mut chunks = cc.seal_chunks(&key(6), &plaintext).unwrap();
        chunks.swap(0, 1);

        let out = cc.open_chunks(&key(6), &chunks).unwrap();
        assert_eq!(out[0], 2);
        assert_eq!(out[CHUNK_SIZE], 1);
    }

    #[test]
    fn test_wrong_session_key_fails_at_chunk_zero() {
        let cc = ChunkCipher::default();
        let chunks = cc.seal_chunks(&key(7), b"hello").unwrap();
        let err = cc.open_chunks(&key(8), &chunks).unwrap_err();
        assert!(matches!(err, PqVaultError::ChunkAuthenticationFailed(0)));
    }

    #[test]
    fn test_custom_chunk_size_and_cipher() {
        let cc = ChunkCipher::new(ChaCha20Poly1305Cipher)
            .with_chunk_size(NonZeroUsize::new(3).unwrap());
        let chunks = cc.seal_chunks(&key(9), b"abcdefg").unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(cc.open_chunks(&key(9), &chunks).unwrap(), b"abcdefg");
    }
}
