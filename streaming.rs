//! Streaming container encryption for large files.
//!
//! [`ContainerStreamWriter`] writes the header as soon as the session key is
//! encapsulated, then seals the input in batches and appends chunks as they
//! are produced. The output is byte-compatible with
//! [`ContainerCodec::decode`](crate::container::ContainerCodec::decode):
//! batches are whole multiples of the chunk size, so boundaries land exactly
//! where buffered encryption would put them.
//!
//! There is no streaming decryptor: a chunk that fails authentication must
//! invalidate the whole file, so plaintext is only released after every chunk
//! has verified.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::engine::EncryptionEngine;
use crate::error::{PqVaultError, Result};
use crate::primitives::{AeadCipher, Aes256GcmCipher, Kem, Kyber1024};

/// Chunks sealed per batch
const CHUNKS_PER_BATCH: usize = 64;

pub struct ContainerStreamWriter<K = Kyber1024, A = Aes256GcmCipher> {
    engine: EncryptionEngine<K, A>,
}

impl<K: Kem, A: AeadCipher> ContainerStreamWriter<K, A> {
    pub fn new(engine: EncryptionEngine<K, A>) -> Self {
        Self { engine }
    }

    /// Encrypts everything from `reader` into `writer` for `public_key`.
    /// Returns the number of plaintext bytes consumed.
    pub async fn encrypt_stream<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        public_key: &[u8],
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let encapsulation = self.engine.encapsulator().encapsulate(public_key)?;
        let header = self
            .engine
            .codec()
            .encode_header(&encapsulation.encapsulated_session_key)?;
        writer.write_all(&header).await?;

        let chunk_cipher = self.engine.chunk_cipher();
        let mut buffer = Zeroizing::new(vec![0u8; chunk_cipher.chunk_size() * CHUNKS_PER_BATCH]);
        let mut total_bytes = 0u64;
        let mut total_chunks = 0usize;

        loop {
            let n = fill(reader, &mut buffer).await?;
            if n == 0 {
                break;
            }

            let chunks = chunk_cipher.seal_chunks(&encapsulation.session_key, &buffer[..n])?;
            for chunk in &chunks {
                let length = u32::try_from(chunk.len())
                    .map_err(|_| PqVaultError::encryption("chunk exceeds u32 length"))?;
                writer.write_all(&chunk.nonce).await?;
                writer.write_u32(length).await?;
                writer.write_all(&chunk.sealed_body).await?;
            }

            total_bytes += n as u64;
            total_chunks += chunks.len();
            debug!(batch_bytes = n, total_bytes, "sealed stream batch");

            if n < buffer.len() {
                break;
            }
        }

        writer.flush().await?;
        info!(bytes = total_bytes, chunks = total_chunks, "container stream encrypted");
        Ok(total_bytes)
    }
}

/// Reads until `buf` is full or the reader hits EOF.
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
