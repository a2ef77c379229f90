//! The two public operations: `encrypt_container` and `decrypt_container`.
//!
//! Encryption needs only the recipient's public key. Decryption needs the
//! password and the sealed private key; the session key is recovered by
//! decapsulating the header's KEM ciphertext and is dropped (zeroized) before
//! returning.

use secrecy::SecretString;
use tracing::{debug, info};

use crate::chunk::ChunkCipher;
use crate::container::ContainerCodec;
use crate::error::{PqVaultError, Result};
use crate::kem::{KeyEncapsulator, PrivateKey};
use crate::primitives::{AeadCipher, Aes256GcmCipher, Argon2idHasher, Kem, Kyber1024, PasswordHash};
use crate::vault::{PrivateKeyVault, SealedPrivateKey};
use crate::FORMAT_VERSION;

#[derive(Debug, Clone)]
pub struct EncryptionEngine<K = Kyber1024, A = Aes256GcmCipher> {
    encapsulator: KeyEncapsulator<K>,
    chunks: ChunkCipher<A>,
    codec: ContainerCodec,
}

impl<K: Kem> EncryptionEngine<K, Aes256GcmCipher> {
    pub fn new(kem: K) -> Self {
        Self::with_parts(KeyEncapsulator::new(kem), ChunkCipher::default())
    }
}

impl<K: Kem, A: AeadCipher> EncryptionEngine<K, A> {
    pub fn with_parts(encapsulator: KeyEncapsulator<K>, chunks: ChunkCipher<A>) -> Self {
        Self {
            encapsulator,
            chunks,
            codec: ContainerCodec::new(),
        }
    }

    pub fn encapsulator(&self) -> &KeyEncapsulator<K> {
        &self.encapsulator
    }

    pub fn chunk_cipher(&self) -> &ChunkCipher<A> {
        &self.chunks
    }

    pub fn codec(&self) -> &ContainerCodec {
        &self.codec
    }

    /// Encrypts `plaintext` for the holder of `public_key`.
    pub fn encrypt_container(&self, plaintext: &[u8], public_key: &[u8]) -> Result<Vec<u8>> {
        let encapsulation = self.encapsulator.encapsulate(public_key)?;
        let chunks = self
            .chunks
            .seal_chunks(&encapsulation.session_key, plaintext)?;
        let container = self
            .codec
            .encode(&encapsulation.encapsulated_session_key, &chunks)?;

        info!(
            plaintext_len = plaintext.len(),
            container_len = container.len(),
            chunks = chunks.len(),
            "container encrypted"
        );
        Ok(container)
    }
}

#[derive(Debug, Clone)]
pub struct DecryptionEngine<K = Kyber1024, A = Aes256GcmCipher, H = Argon2idHasher> {
    encapsulator: KeyEncapsulator<K>,
    vault: PrivateKeyVault<A, H>,
    chunks: ChunkCipher<A>,
    codec: ContainerCodec,
}

impl<K: Kem> DecryptionEngine<K, Aes256GcmCipher, Argon2idHasher> {
    /// Uses the format-default vault (frozen Argon2id parameters).
    pub fn new(kem: K) -> Self {
        Self::with_parts(
            KeyEncapsulator::new(kem),
            PrivateKeyVault::default(),
            ChunkCipher::default(),
        )
    }
}

impl<K: Kem, A: AeadCipher, H: PasswordHash> DecryptionEngine<K, A, H> {
    pub fn with_parts(
        encapsulator: KeyEncapsulator<K>,
        vault: PrivateKeyVault<A, H>,
        chunks: ChunkCipher<A>,
    ) -> Self {
        Self {
            encapsulator,
            vault,
            chunks,
            codec: ContainerCodec::new(),
        }
    }

    pub fn vault(&self) -> &PrivateKeyVault<A, H> {
        &self.vault
    }

    /// Unseals the private key with `password`, then decrypts. The container
    /// is parsed first so structural damage is reported without paying for
    /// the password hash.
    pub fn decrypt_container(
        &self,
        container: &[u8],
        password: &SecretString,
        sealed: &SealedPrivateKey,
    ) -> Result<Vec<u8>> {
        let decoded = self.codec.decode(container)?;
        check_version(&decoded.version)?;
        let private_key = self.vault.unseal(sealed, password)?;
        self.open_decoded(decoded, &private_key)
    }

    /// Decrypts with an already-unsealed private key, e.g. when opening many
    /// containers after a single unseal.
    pub fn decrypt_with_private_key(
        &self,
        container: &[u8],
        private_key: &PrivateKey,
    ) -> Result<Vec<u8>> {
        let decoded = self.codec.decode(container)?;
        check_version(&decoded.version)?;
        self.open_decoded(decoded, private_key)
    }

    fn open_decoded(
        &self,
        decoded: crate::container::DecodedContainer,
        private_key: &PrivateKey,
    ) -> Result<Vec<u8>> {
        let session_key = self
            .encapsulator
            .decapsulate(&decoded.encapsulated_session_key, private_key)?;
        debug!(chunks = decoded.chunks.len(), "session key recovered");

        let plaintext = self.chunks.open_chunks(&session_key, &decoded.chunks)?;
        info!(plaintext_len = plaintext.len(), "container decrypted");
        Ok(plaintext)
    }
}

fn check_version(version: &str) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(PqVaultError::UnsupportedVersion(version.to_string()));
    }
    Ok(())
}
