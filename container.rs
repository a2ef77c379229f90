//! Container byte layout.
//!
//! ```text
//! offset 0      [header: HEADER_SIZE bytes]
//!                 {"kyberEncryptedSessionKey":"<base64>","version":"1.0"} + 0x00 padding
//! offset 10240  [chunk 0][chunk 1]...
//!
//! chunk: [nonce:12][length:4, big-endian u32][sealed body: length bytes]
//! ```
//!
//! Encoding and decoding are pure functions of their inputs. Decoding fails
//! closed on any structural damage and never guesses field boundaries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{PqVaultError, Result};
use crate::{FORMAT_VERSION, HEADER_SIZE, NONCE_SIZE};

/// Size of the big-endian chunk length field
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Serialized header record. Field names and order are part of the format.
#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord {
    #[serde(rename = "kyberEncryptedSessionKey")]
    kyber_encrypted_session_key: String,
    version: String,
}

/// Parsed container contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContainer {
    pub encapsulated_session_key: Vec<u8>,
    pub version: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct ContainerCodec {
    version: String,
}

impl Default for ContainerCodec {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
        }
    }
}

impl ContainerCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes only the fixed-size header region.
    pub fn encode_header(&self, encapsulated_session_key: &[u8]) -> Result<Vec<u8>> {
        let record = HeaderRecord {
            kyber_encrypted_session_key: STANDARD.encode(encapsulated_session_key),
            version: self.version.clone(),
        };
        let text = serde_json::to_vec(&record)
            .map_err(|e| PqVaultError::encryption(format!("serializing header: {}", e)))?;
        if text.len() > HEADER_SIZE {
            return Err(PqVaultError::HeaderOverflow(text.len()));
        }

        let mut header = text;
        header.resize(HEADER_SIZE, 0);
        Ok(header)
    }

    /// Appends one chunk in wire form.
    pub fn encode_chunk(&self, out: &mut Vec<u8>, chunk: &Chunk) -> Result<()> {
        let length = u32::try_from(chunk.len()).map_err(|_| {
            PqVaultError::encryption(format!("chunk of {} bytes exceeds u32 length", chunk.len()))
        })?;
        out.extend_from_slice(&chunk.nonce);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&chunk.sealed_body);
        Ok(())
    }

    pub fn encode(&self, encapsulated_session_key: &[u8], chunks: &[Chunk]) -> Result<Vec<u8>> {
        let body_len: usize = chunks
            .iter()
            .map(|c| NONCE_SIZE + LENGTH_FIELD_SIZE + c.len())
            .sum();

        let mut out = self.encode_header(encapsulated_session_key)?;
        out.reserve(body_len);
        for chunk in chunks {
            self.encode_chunk(&mut out, chunk)?;
        }

        debug!(container_len = out.len(), chunks = chunks.len(), "encoded container");
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedContainer> {
        if bytes.len() < HEADER_SIZE {
            return Err(PqVaultError::ContainerTooSmall(bytes.len()));
        }
        let (header, mut rest) = bytes.split_at(HEADER_SIZE);
        let (encapsulated_session_key, version) = parse_header(header)?;

        let mut chunks = Vec::new();
        let mut offset = HEADER_SIZE;
        while !rest.is_empty() {
            let truncated = PqVaultError::TruncatedChunk {
                index: chunks.len(),
                offset,
            };
            if rest.len() < NONCE_SIZE + LENGTH_FIELD_SIZE {
                return Err(truncated);
            }
            let (nonce, tail) = rest.split_at(NONCE_SIZE);
            let (length, tail) = tail.split_at(LENGTH_FIELD_SIZE);
            let length = u32::from_be_bytes([length[0], length[1], length[2], length[3]]) as usize;
            if tail.len() < length {
                return Err(truncated);
            }
            let (sealed_body, tail) = tail.split_at(length);

            let mut chunk_nonce = [0u8; NONCE_SIZE];
            chunk_nonce.copy_from_slice(nonce);
            chunks.push(Chunk {
                nonce: chunk_nonce,
                sealed_body: sealed_body.to_vec(),
            });

            offset += NONCE_SIZE + LENGTH_FIELD_SIZE + length;
            rest = tail;
        }

        debug!(container_len = bytes.len(), chunks = chunks.len(), "decoded container");
        Ok(DecodedContainer {
            encapsulated_session_key,
            version,
            chunks,
        })
    }
}

/// Parses the header record up to the first padding byte.
pub(crate) fn parse_header(header: &[u8]) -> Result<(Vec<u8>, String)> {
    let end = header.iter().position(|&b| b == 0).unwrap_or(header.len());
    let record: HeaderRecord = serde_json::from_slice(&header[..end])
        .map_err(|e| PqVaultError::malformed(format!("header record: {}", e)))?;
    let encapsulated = STANDARD
        .decode(record.kyber_encrypted_session_key.as_bytes())
        .map_err(|e| PqVaultError::malformed(format!("encapsulated key is not base64: {}", e)))?;
    Ok((encapsulated, record.version))
}
