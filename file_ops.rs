//! Named container storage.
//!
//! This module provides [`ContainerStore`], which encrypts files into
//! containers under a storage directory and decrypts them back.
//!
//! ## Features
//!
//! - Buffered and streaming encryption (both produce the same format)
//! - Decryption with an unsealed private key or a password
//! - Metadata sidecars, listing and deletion
//! - Whole-container crypto runs on the blocking pool

use std::path::PathBuf;

use secrecy::SecretString;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

use crate::engine::{DecryptionEngine, EncryptionEngine};
use crate::error::{PqVaultError, Result};
use crate::identity::IdentityManager;
use crate::kem::PrivateKey;
use crate::metadata::{FileMetadata, SIDECAR_SUFFIX};
use crate::primitives::Kyber1024;
use crate::streaming::ContainerStreamWriter;

pub struct ContainerStore {
    encryptor: EncryptionEngine,
    decryptor: DecryptionEngine,
    public_key: Vec<u8>,
    root: PathBuf,
}

impl ContainerStore {
    /// Store that encrypts for `public_key`.
    pub fn new(public_key: impl Into<Vec<u8>>, root: impl Into<PathBuf>) -> Result<Self> {
        let kem = Kyber1024::initialize().map_err(|e| PqVaultError::primitive(e.0))?;
        Ok(Self {
            encryptor: EncryptionEngine::new(kem),
            decryptor: DecryptionEngine::new(kem),
            public_key: public_key.into(),
            root: root.into(),
        })
    }

    pub fn for_identity(identity: &IdentityManager, root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(identity.public_key(), root)
    }

    fn container_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name == "."
            || name == ".."
            || name.ends_with(SIDECAR_SUFFIX)
        {
            return Err(PqVaultError::storage(format!("invalid container name {:?}", name)));
        }
        Ok(self.root.join(name))
    }

    pub async fn write_encrypted(&self, name: &str, data: &[u8]) -> Result<()> {
        debug!(file = name, size = data.len(), "encrypting file (buffer mode)");
        let path = self.container_path(name)?;
        fs::create_dir_all(&self.root).await?;

        let engine = self.encryptor.clone();
        let public_key = self.public_key.clone();
        let plaintext = data.to_vec();
        let container = tokio::task::spawn_blocking(move || {
            engine.encrypt_container(&plaintext, &public_key)
        })
        .await??;

        fs::write(&path, &container).await?;
        FileMetadata::record(&path, data.len() as u64, container.len() as u64).await?;
        info!(file = name, original_size = data.len(), encrypted_size = container.len(), "file encrypted successfully");
        Ok(())
    }

    /// Write a container from a stream source (for large files)
    pub async fn write_encrypted_stream<R>(&self, name: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        debug!(file = name, "encrypting file (streaming mode)");
        let path = self.container_path(name)?;
        fs::create_dir_all(&self.root).await?;

        let mut file = fs::File::create(&path).await.map_err(|e| {
            PqVaultError::storage(format!("creating {:?}: {}", &path, e))
        })?;

        let writer = ContainerStreamWriter::new(self.encryptor.clone());
        let bytes_written = match writer.encrypt_stream(reader, &mut file, &self.public_key).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                fs::remove_file(&path).await.ok();
                error!(file = name, error = %e, "streaming encryption failed");
                return Err(e);
            }
        };

        let container_size = fs::metadata(&path).await?.len();
        FileMetadata::record(&path, bytes_written, container_size).await?;
        info!(file = name, bytes = bytes_written, "file encrypted successfully (streaming)");
        Ok(bytes_written)
    }

    /// Decrypts with an already-unsealed private key.
    pub async fn read_encrypted(&self, name: &str, private_key: &PrivateKey) -> Result<Vec<u8>> {
        debug!(file = name, "decrypting file");
        let path = self.container_path(name)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| PqVaultError::storage(format!("reading {:?}: {}", &path, e)))?;

        let engine = self.decryptor.clone();
        let key = private_key.clone();
        let encrypted_size = data.len();
        let result = tokio::task::spawn_blocking(move || engine.decrypt_with_private_key(&data, &key))
            .await?;

        match &result {
            Ok(plaintext) => info!(file = name, encrypted_size, decrypted_size = plaintext.len(), "file decrypted successfully"),
            Err(e) => error!(file = name, error = %e, "decryption failed"),
        }
        result
    }

    /// Unseals the identity's private key with `password`, then decrypts.
    pub async fn read_encrypted_with_password(
        &self,
        name: &str,
        identity: &IdentityManager,
        password: SecretString,
    ) -> Result<Vec<u8>> {
        let private_key = identity.unseal(password).await?;
        self.read_encrypted(name, &private_key).await
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.container_path(name) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete a container and its metadata
    pub async fn delete_file(&self, name: &str) -> Result<()> {
        info!(file = name, "deleting container");
        let path = self.container_path(name)?;
        let meta_path = FileMetadata::sidecar_path(&path);

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .map_err(|e| PqVaultError::storage(format!("deleting {:?}: {}", &path, e)))?;
            debug!(file = name, "container deleted");
        } else {
            warn!(file = name, "file not found during delete");
        }

        if fs::try_exists(&meta_path).await.unwrap_or(false) {
            fs::remove_file(&meta_path).await.ok();
            debug!(file = name, "metadata file deleted");
        }

        Ok(())
    }

    /// Returns `(filename, container_bytes, has_metadata)` sorted by name
    pub async fn list_files(&self) -> Result<Vec<(String, u64, bool)>> {
        let mut files = Vec::new();

        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(files);
        }

        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();

            if path.is_dir() || FileMetadata::is_sidecar(&path) {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let size = entry.metadata().await?.len();
            let has_metadata = fs::try_exists(FileMetadata::sidecar_path(&path))
                .await
                .unwrap_or(false);

            files.push((filename, size, has_metadata));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    pub async fn get_metadata(&self, name: &str) -> Result<FileMetadata> {
        let path = self.container_path(name)?;
        FileMetadata::load(&path).await
    }
}
