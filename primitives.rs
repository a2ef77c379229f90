//! Narrow interfaces over the external cryptographic primitives.
//!
//! The container core never names a concrete algorithm. It is generic over
//! three traits:
//!
//! - [`Kem`]: key encapsulation (`keypair`, `encapsulate`, `decapsulate`)
//! - [`PasswordHash`]: memory-hard password hashing
//! - [`AeadCipher`]: authenticated encryption with a 96-bit nonce
//!
//! The shipped implementations are Kyber-1024 ([`Kyber1024`]), Argon2id
//! ([`Argon2idHasher`]), AES-256-GCM ([`Aes256GcmCipher`], the container
//! default) and ChaCha20-Poly1305 ([`ChaCha20Poly1305Cipher`]).

use aes_gcm::Aes256Gcm;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use pqcrypto_kyber::kyber1024;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::kdf::KdfParams;
use crate::{KEY_SIZE, NONCE_SIZE};

/// Failure reported by a primitive implementation
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PrimitiveError(pub String);

/// AEAD seal or open failure. Carries no detail so callers cannot build an oracle.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("aead failure")]
pub struct AeadError;

/// Key encapsulation mechanism
pub trait Kem: Send + Sync {
    const PUBLIC_KEY_SIZE: usize;
    const SECRET_KEY_SIZE: usize;
    const CIPHERTEXT_SIZE: usize;

    /// Returns `(public_key, secret_key)`.
    fn keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), PrimitiveError>;

    /// Generates a fresh shared secret bound to `public_key`.
    /// Returns `(ciphertext, shared_secret)`.
    fn encapsulate(
        &self,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Zeroizing<[u8; KEY_SIZE]>), PrimitiveError>;

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_SIZE]>, PrimitiveError>;
}

/// Memory-hard password hash
pub trait PasswordHash: Send + Sync {
    /// Fills `out` with the digest of `password` under `salt`.
    fn hash(&self, password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), PrimitiveError>;
}

/// Authenticated cipher with a 256-bit key and 96-bit nonce
pub trait AeadCipher: Send + Sync {
    /// Returns ciphertext with the authentication tag appended.
    fn seal(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AeadError>;

    fn open(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AeadError>;
}

/// Kyber-1024 (ML-KEM-1024 parameter sizes) via `pqcrypto-kyber`.
///
/// Obtain a handle with [`Kyber1024::initialize`], which runs a self-test
/// before any key material is produced.
#[derive(Debug, Clone, Copy)]
pub struct Kyber1024 {
    _initialized: (),
}

impl Kyber1024 {
    pub fn initialize() -> Result<Self, PrimitiveError> {
        let kem = Self { _initialized: () };
        let (pk, sk) = kem.keypair()?;
        let (ct, sent) = kem.encapsulate(&pk)?;
        let received = kem.decapsulate(&ct, &sk)?;
        if *sent != *received {
            return Err(PrimitiveError(
                "kyber1024 self-test failed: shared secrets disagree".into(),
            ));
        }
        tracing::debug!("kyber1024 self-test passed");
        Ok(kem)
    }
}

impl Kem for Kyber1024 {
    const PUBLIC_KEY_SIZE: usize = kyber1024::public_key_bytes();
    const SECRET_KEY_SIZE: usize = kyber1024::secret_key_bytes();
    const CIPHERTEXT_SIZE: usize = kyber1024::ciphertext_bytes();

    fn keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), PrimitiveError> {
        let (pk, sk) = kyber1024::keypair();
        Ok((pk.as_bytes().to_vec(), Zeroizing::new(sk.as_bytes().to_vec())))
    }

    fn encapsulate(
        &self,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Zeroizing<[u8; KEY_SIZE]>), PrimitiveError> {
        let pk = kyber1024::PublicKey::from_bytes(public_key)
            .map_err(|e| PrimitiveError(format!("invalid kyber public key: {:?}", e)))?;
        let (ss, ct) = kyber1024::encapsulate(&pk);
        Ok((ct.as_bytes().to_vec(), shared_secret(ss.as_bytes())?))
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_SIZE]>, PrimitiveError> {
        let ct = kyber1024::Ciphertext::from_bytes(ciphertext)
            .map_err(|e| PrimitiveError(format!("invalid kyber ciphertext: {:?}", e)))?;
        let sk = kyber1024::SecretKey::from_bytes(secret_key)
            .map_err(|e| PrimitiveError(format!("invalid kyber secret key: {:?}", e)))?;
        let ss = kyber1024::decapsulate(&ct, &sk);
        shared_secret(ss.as_bytes())
    }
}

fn shared_secret(bytes: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, PrimitiveError> {
    if bytes.len() != KEY_SIZE {
        return Err(PrimitiveError(format!(
            "unexpected shared secret length {}",
            bytes.len()
        )));
    }
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Argon2id (v0x13) with fixed parameters.
#[derive(Debug, Clone)]
pub struct Argon2idHasher {
    params: KdfParams,
}

impl Argon2idHasher {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }
}

impl Default for Argon2idHasher {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

impl PasswordHash for Argon2idHasher {
    fn hash(&self, password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), PrimitiveError> {
        self.params
            .validate()
            .map_err(|e| PrimitiveError(e.to_string()))?;
        let params = Params::new(
            self.params.mem_cost_kib,
            self.params.time_cost,
            self.params.parallelism,
            Some(out.len()),
        )
        .map_err(|e| PrimitiveError(format!("invalid Argon2id params: {}", e)))?;

        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password, salt, out)
            .map_err(|e| PrimitiveError(format!("Argon2id failed: {}", e)))
    }
}

/// AES-256-GCM, 16-byte tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl AeadCipher for Aes256GcmCipher {
    fn seal(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        Aes256Gcm::new(key.into())
            .encrypt(nonce.into(), plaintext)
            .map_err(|_| AeadError)
    }

    fn open(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        Aes256Gcm::new(key.into())
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| AeadError)
    }
}

/// ChaCha20-Poly1305 (IETF, 96-bit nonce), 16-byte tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaCha20Poly1305Cipher;

impl AeadCipher for ChaCha20Poly1305Cipher {
    fn seal(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        ChaCha20Poly1305::new(key.into())
            .encrypt(nonce.into(), plaintext)
            .map_err(|_| AeadError)
    }

    fn open(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        ChaCha20Poly1305::new(key.into())
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| AeadError)
    }
}
