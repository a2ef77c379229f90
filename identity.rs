//! Identity persistence: the public key plus its password-sealed private key.
//!
//! This module provides [`IdentityManager`] for creating, loading and
//! re-passwording the identity file.
//!
//! ## On-disk format
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "publicKey": "<base64, 1568 bytes>",
//!   "sealedPrivateKey": { "ciphertext": "...", "salt": "...", "nonce": "..." },
//!   "kdf": { "mem_cost_kib": 65536, "time_cost": 3, "parallelism": 1 }
//! }
//! ```
//!
//! `kdf` records the Argon2id parameters that sealed the private key. Files
//! without it were sealed with the format-v1 defaults. Unsealing always uses
//! the recorded parameters, whatever the current config says.
//!
//! ## Security Features
//!
//! - Unix file permissions set to 0600 (owner read/write only)
//! - Rotation rewrites via temp file + rename, never leaving a half-written identity
//! - Key generation and Argon2id run on the blocking pool

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PqVaultError, Result};
use crate::kdf::{KdfParams, PasswordKeyDeriver};
use crate::kem::{KeyEncapsulator, PrivateKey};
use crate::primitives::{Aes256GcmCipher, Argon2idHasher, Kem, Kyber1024};
use crate::vault::{PrivateKeyVault, SealedPrivateKey};
use crate::FORMAT_VERSION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFile {
    pub version: String,
    #[serde(with = "crate::vault::b64")]
    pub public_key: Vec<u8>,
    pub sealed_private_key: SealedPrivateKey,
    #[serde(default)]
    pub kdf: KdfParams,
}

/// Owns the identity file for one recipient.
pub struct IdentityManager {
    path: PathBuf,
    identity: IdentityFile,
    vault: PrivateKeyVault,
}

impl IdentityManager {
    /// Generates a key pair, seals the private key under `password` and writes
    /// the identity file. Refuses to overwrite an existing identity.
    pub async fn create(cfg: &Config, password: SecretString) -> Result<Self> {
        let path = PathBuf::from(&cfg.identity_path);
        if fs::try_exists(&path).await? {
            return Err(PqVaultError::storage(format!(
                "identity file {} already exists",
                path.display()
            )));
        }

        info!(path = %path.display(), "generating new identity");
        cfg.kdf.validate()?;
        let vault = vault_for(&cfg.kdf);
        let kdf = cfg.kdf.clone();
        let sealing_vault = vault.clone();
        let identity = tokio::task::spawn_blocking(move || -> Result<IdentityFile> {
            let kem = Kyber1024::initialize().map_err(|e| PqVaultError::primitive(e.0))?;
            let pair = KeyEncapsulator::new(kem).generate_key_pair()?;
            let sealed = sealing_vault.seal(&pair.private_key, &password)?;
            Ok(IdentityFile {
                version: FORMAT_VERSION.to_string(),
                public_key: pair.public_key.clone(),
                sealed_private_key: sealed,
                kdf,
            })
        })
        .await??;

        write_identity(&path, &identity, true).await?;
        info!(path = %path.display(), "identity created");
        Ok(Self {
            path,
            identity,
            vault,
        })
    }

    pub async fn load(cfg: &Config) -> Result<Self> {
        let path = PathBuf::from(&cfg.identity_path);
        info!(path = %path.display(), "loading identity");
        let data = fs::read(&path).await.map_err(|e| {
            PqVaultError::storage(format!("reading identity {}: {}", path.display(), e))
        })?;
        let identity: IdentityFile = serde_json::from_slice(&data)
            .map_err(|e| PqVaultError::format(format!("parsing identity {}: {}", path.display(), e)))?;

        if identity.version != FORMAT_VERSION {
            return Err(PqVaultError::UnsupportedVersion(identity.version));
        }
        if identity.public_key.len() != Kyber1024::PUBLIC_KEY_SIZE {
            warn!(found_bytes = identity.public_key.len(), "invalid public key size");
            return Err(PqVaultError::key_size(
                Kyber1024::PUBLIC_KEY_SIZE,
                identity.public_key.len(),
            ));
        }

        identity.kdf.validate()?;
        if identity.kdf != cfg.kdf {
            warn!(
                recorded = ?identity.kdf,
                configured = ?cfg.kdf,
                "identity was sealed with different kdf parameters; using the recorded ones"
            );
        }

        let vault = vault_for(&identity.kdf);
        Ok(Self {
            path,
            identity,
            vault,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn public_key(&self) -> &[u8] {
        &self.identity.public_key
    }

    pub fn sealed_private_key(&self) -> &SealedPrivateKey {
        &self.identity.sealed_private_key
    }

    /// Argon2id parameters the private key is sealed under.
    pub fn kdf(&self) -> &KdfParams {
        &self.identity.kdf
    }

    pub fn vault(&self) -> &PrivateKeyVault {
        &self.vault
    }

    /// Recovers the private key. Runs Argon2id on the blocking pool.
    pub async fn unseal(&self, password: SecretString) -> Result<PrivateKey> {
        let vault = self.vault.clone();
        let sealed = self.identity.sealed_private_key.clone();
        tokio::task::spawn_blocking(move || vault.unseal(&sealed, &password)).await?
    }

    /// Re-seals the private key under `new_password` and atomically replaces
    /// the identity file. The public key, and so every stored container, is
    /// left untouched.
    pub async fn rotate_password(
        &mut self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<()> {
        let vault = self.vault.clone();
        let sealed = self.identity.sealed_private_key.clone();
        let rotated = tokio::task::spawn_blocking(move || {
            vault.rotate(&sealed, &old_password, &new_password)
        })
        .await??;

        let next = IdentityFile {
            sealed_private_key: rotated,
            ..self.identity.clone()
        };
        write_identity(&self.path, &next, false).await?;
        self.identity = next;
        info!(path = %self.path.display(), "identity password rotated");
        Ok(())
    }
}

fn vault_for(kdf: &KdfParams) -> PrivateKeyVault {
    PrivateKeyVault::new(
        PasswordKeyDeriver::new(Argon2idHasher::new(kdf.clone())),
        Aes256GcmCipher,
    )
}

/// Writes with 0600 permissions. With `create_new` the file must not exist;
/// otherwise the content goes to a sibling temp file that is renamed over
/// the original.
async fn write_identity(path: &Path, identity: &IdentityFile, create_new: bool) -> Result<()> {
    let json = serde_json::to_vec_pretty(identity)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let target = path.to_path_buf();
    let staging = if create_new {
        target.clone()
    } else {
        target.with_extension("json.tmp")
    };

    let staged = staging.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut f = options.open(&staged)?;
        f.write_all(&json)?;
        f.sync_all()?;
        Ok(())
    })
    .await??;

    if !create_new {
        fs::rename(&staging, &target).await?;
    }
    Ok(())
}
