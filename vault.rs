//! Password sealing of the recipient's private key.
//!
//! Containers are bound to the public key, which never changes, so rotating
//! the password only replaces the [`SealedPrivateKey`] triple. No container is
//! read or rewritten.

use rand_core::{OsRng, RngCore};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PqVaultError, Result};
use crate::kdf::PasswordKeyDeriver;
use crate::kem::PrivateKey;
use crate::primitives::{AeadCipher, Aes256GcmCipher, Argon2idHasher, PasswordHash};
use crate::{NONCE_SIZE, SALT_SIZE};

/// Private key encrypted under a password-derived key. Persisted as a unit;
/// salt and nonce are not secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPrivateKey {
    #[serde(with = "b64")]
    ciphertext: Vec<u8>,
    #[serde(with = "b64_array")]
    salt: [u8; SALT_SIZE],
    #[serde(with = "b64_array")]
    nonce: [u8; NONCE_SIZE],
}

impl SealedPrivateKey {
    /// Rebuilds a sealed key from stored fields, validating the fixed sizes.
    pub fn from_parts(ciphertext: Vec<u8>, salt: &[u8], nonce: &[u8]) -> Result<Self> {
        let salt: [u8; SALT_SIZE] = salt
            .try_into()
            .map_err(|_| PqVaultError::InvalidSaltSize(salt.len()))?;
        let nonce: [u8; NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_| PqVaultError::InvalidNonceSize(nonce.len()))?;
        Ok(Self {
            ciphertext,
            salt,
            nonce,
        })
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }
}

impl std::fmt::Debug for SealedPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedPrivateKey")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("salt", &self.salt)
            .field("nonce", &self.nonce)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PrivateKeyVault<A = Aes256GcmCipher, H = Argon2idHasher> {
    deriver: PasswordKeyDeriver<H>,
    cipher: A,
}

impl Default for PrivateKeyVault {
    fn default() -> Self {
        Self::new(PasswordKeyDeriver::default(), Aes256GcmCipher)
    }
}

impl<A: AeadCipher, H: PasswordHash> PrivateKeyVault<A, H> {
    pub fn new(deriver: PasswordKeyDeriver<H>, cipher: A) -> Self {
        Self { deriver, cipher }
    }

    /// Seals `private_key` under a fresh salt and nonce.
    pub fn seal(&self, private_key: &PrivateKey, password: &SecretString) -> Result<SealedPrivateKey> {
        let derived = self.deriver.derive(password, None)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .seal(derived.key.as_bytes(), &nonce, private_key.as_bytes())
            .map_err(|_| PqVaultError::encryption("sealing private key failed"))?;

        debug!(ciphertext_len = ciphertext.len(), "sealed private key");
        Ok(SealedPrivateKey {
            ciphertext,
            salt: derived.salt,
            nonce,
        })
    }

    /// Fails with [`PqVaultError::AuthenticationFailed`] on a wrong password or a
    /// tampered blob, without saying which.
    pub fn unseal(&self, sealed: &SealedPrivateKey, password: &SecretString) -> Result<PrivateKey> {
        let derived = self.deriver.derive(password, Some(&sealed.salt[..]))?;
        match self
            .cipher
            .open(derived.key.as_bytes(), &sealed.nonce, &sealed.ciphertext)
        {
            Ok(bytes) => Ok(PrivateKey::from_bytes(bytes)),
            Err(_) => {
                warn!("private key unseal rejected");
                Err(PqVaultError::AuthenticationFailed)
            }
        }
    }

    /// Re-seals under `new_password`. Every field of the returned triple is new.
    pub fn rotate(
        &self,
        sealed: &SealedPrivateKey,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<SealedPrivateKey> {
        let private_key = self.unseal(sealed, old_password)?;
        let rotated = self.seal(&private_key, new_password)?;
        info!("private key password rotated");
        Ok(rotated)
    }
}

pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

mod b64_array {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        super::b64::serialize(bytes, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let v = super::b64::deserialize(d)?;
        let len = v.len();
        v.try_into().map_err(|_| {
            serde::de::Error::custom(format!("expected {} bytes, got {}", N, len))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;

    fn vault() -> PrivateKeyVault {
        PrivateKeyVault::new(
            PasswordKeyDeriver::new(Argon2idHasher::new(KdfParams::testing())),
            Aes256GcmCipher,
        )
    }

    fn key() -> PrivateKey {
        PrivateKey::from_bytes((0..3168u32).map(|i| (i % 251) as u8).collect())
    }

    #[test]
    fn test_seal_unseal_round_trip() {
        let v = vault();
        let pw = SecretString::from("p@ss1");
        let sealed = v.seal(&key(), &pw).unwrap();
        assert_eq!(sealed.ciphertext().len(), 3168 + crate::TAG_SIZE);

        let opened = v.unseal(&sealed, &pw).unwrap();
        assert_eq!(opened.as_bytes(), key().as_bytes());
    }

    #[test]
    fn test_wrong_password_is_authentication_failure() {
        let v = vault();
        let sealed = v.seal(&key(), &SecretString::from("p@ss1")).unwrap();
        let err = v.unseal(&sealed, &SecretString::from("wrong")).unwrap_err();
        assert!(matches!(err, PqVaultError::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_blob_is_same_failure() {
        let v = vault();
        let pw = SecretString::from("p@ss1");
        let sealed = v.seal(&key(), &pw).unwrap();
        let mut ct = sealed.ciphertext().to_vec();
        ct[10] ^= 0x80;
        let tampered = SealedPrivateKey::from_parts(ct, sealed.salt(), sealed.nonce()).unwrap();
        let err = v.unseal(&tampered, &pw).unwrap_err();
        assert!(matches!(err, PqVaultError::AuthenticationFailed));
    }

    #[test]
    fn test_rotate_replaces_every_field() {
        let v = vault();
        let old = SecretString::from("p@ss1");
        let new = SecretString::from("p@ss2");
        let sealed = v.seal(&key(), &old).unwrap();

        let rotated = v.rotate(&sealed, &old, &new).unwrap();
        assert_ne!(rotated.ciphertext(), sealed.ciphertext());
        assert_ne!(rotated.salt(), sealed.salt());
        assert_ne!(rotated.nonce(), sealed.nonce());

        assert_eq!(v.unseal(&rotated, &new).unwrap().as_bytes(), key().as_bytes());
        assert!(matches!(
            v.unseal(&rotated, &old),
            Err(PqVaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_rotate_with_wrong_old_password_fails() {
        let v = vault();
        let sealed = v.seal(&key(), &SecretString::from("p@ss1")).unwrap();
        let err = v
            .rotate(&sealed, &SecretString::from("nope"), &SecretString::from("p@ss2"))
            .unwrap_err();
        assert!(matches!(err, PqVaultError::AuthenticationFailed));
    }

    #[test]
    fn test_from_parts_validates_sizes() {
        assert!(matches!(
            SealedPrivateKey::from_parts(vec![1], &[0u8; 8], &[0u8; 12]),
            Err(PqVaultError::InvalidSaltSize(8))
        ));
        assert!(matches!(
            SealedPrivateKey::from_parts(vec![1], &[0u8; 16], &[0u8; 24]),
            Err(PqVaultError::InvalidNonceSize(24))
        ));
    }

    #[test]
    fn test_json_shape_and_round_trip() {
        let v = vault();
        let sealed = v.seal(&key(), &SecretString::from("pw")).unwrap();
        let json = serde_json::to_string(&sealed).unwrap();
        assert!(json.contains("\"ciphertext\""));
        assert!(json.contains("\"salt\""));
        assert!(json.contains("\"nonce\""));

        let back: SealedPrivateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sealed);
    }

    #[test]
    fn test_json_rejects_short_salt() {
        let json = r#"{"ciphertext":"AAAA","salt":"AAAA","nonce":"AAAAAAAAAAAAAAAA"}"#;
        assert!(serde_json::from_str::<SealedPrivateKey>(json).is_err());
    }

    #[test]
    fn test_chacha_vault_round_trip() {
        let v = PrivateKeyVault::new(
            PasswordKeyDeriver::new(Argon2idHasher::new(KdfParams::testing())),
            crate::primitives::ChaCha20Poly1305Cipher,
        );
        let pw = SecretString::from("pw");
        let sealed = v.seal(&key(), &pw).unwrap();
        assert_eq!(v.unseal(&sealed, &pw).unwrap().as_bytes(), key().as_bytes());
    }
}
