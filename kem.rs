//! Per-file session key establishment.
//!
//! The session key is *generated* by KEM encapsulation against the recipient's
//! public key. Callers never supply their own symmetric key material here.

use tracing::debug;
use zeroize::Zeroize;

use crate::error::{PqVaultError, Result};
use crate::primitives::{Kem, Kyber1024};
use crate::KEY_SIZE;

/// Recipient private key bytes. Zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    bytes: Vec<u8>,
}

impl PrivateKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub private_key: PrivateKey,
}

/// Symmetric key for one file's chunk stream. Lives only for the duration of
/// an encrypt or decrypt call and is zeroized on drop.
pub struct SessionKey {
    bytes: [u8; KEY_SIZE],
}

impl SessionKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Output of one encapsulation: the KEM ciphertext stored in the container
/// header and the session key it binds.
#[derive(Debug)]
pub struct Encapsulation {
    pub encapsulated_session_key: Vec<u8>,
    pub session_key: SessionKey,
}

#[derive(Debug, Clone)]
pub struct KeyEncapsulator<K = Kyber1024> {
    kem: K,
}

impl<K: Kem> KeyEncapsulator<K> {
    /// Takes an already-initialized KEM handle.
    pub fn new(kem: K) -> Self {
        Self { kem }
    }

    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        let (public_key, secret) = self
            .kem
            .keypair()
            .map_err(|e| PqVaultError::primitive(e.0))?;
        debug!(public_key_len = public_key.len(), "generated KEM key pair");
        Ok(KeyPair {
            public_key,
            private_key: PrivateKey::from_bytes(secret.to_vec()),
        })
    }

    pub fn encapsulate(&self, public_key: &[u8]) -> Result<Encapsulation> {
        if public_key.len() != K::PUBLIC_KEY_SIZE {
            return Err(PqVaultError::key_size(K::PUBLIC_KEY_SIZE, public_key.len()));
        }
        let (ciphertext, shared) = self
            .kem
            .encapsulate(public_key)
            .map_err(|e| PqVaultError::primitive(e.0))?;
        Ok(Encapsulation {
            encapsulated_session_key: ciphertext,
            session_key: SessionKey::from_bytes(*shared),
        })
    }

    pub fn decapsulate(
        &self,
        encapsulated_session_key: &[u8],
        private_key: &PrivateKey,
    ) -> Result<SessionKey> {
        if private_key.len() != K::SECRET_KEY_SIZE {
            return Err(PqVaultError::key_size(K::SECRET_KEY_SIZE, private_key.len()));
        }
        if encapsulated_session_key.len() != K::CIPHERTEXT_SIZE {
            return Err(PqVaultError::decapsulation(format!(
                "expected {}-byte KEM ciphertext, got {}",
                K::CIPHERTEXT_SIZE,
                encapsulated_session_key.len()
            )));
        }
        let shared = self
            .kem
            .decapsulate(encapsulated_session_key, private_key.as_bytes())
            .map_err(|e| PqVaultError::decapsulation(e.0))?;
        Ok(SessionKey::from_bytes(*shared))
    }
}
