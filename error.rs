use thiserror::Error;

/// Result alias used throughout the container core
pub type Result<T> = std::result::Result<T, PqVaultError>;

/// Error kinds surfaced by pqvault operations
#[derive(Debug, Error)]
pub enum PqVaultError {
    /// Caller supplied a key of the wrong length for the KEM parameter set
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid salt size: expected 16 bytes, got {0}")]
    InvalidSaltSize(usize),

    #[error("invalid nonce size: expected 12 bytes, got {0}")]
    InvalidNonceSize(usize),

    /// Wrong password or tampered sealed private key. The two causes are
    /// deliberately indistinguishable.
    #[error("unable to unseal private key: wrong password or corrupted key data")]
    AuthenticationFailed,

    /// KEM ciphertext is malformed or does not belong to the supplied key pair
    #[error("decapsulation failed: {0}")]
    DecapsulationFailed(String),

    /// A chunk's authentication tag did not verify
    #[error("chunk {0} failed authentication")]
    ChunkAuthenticationFailed(usize),

    #[error("container too small: {0} bytes is shorter than the header region")]
    ContainerTooSmall(usize),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("truncated chunk {index} at offset {offset}")]
    TruncatedChunk { index: usize, offset: usize },

    /// Serialized header record does not fit in the fixed header region
    #[error("header record of {0} bytes exceeds the header region")]
    HeaderOverflow(usize),

    /// An external primitive could not initialize or run
    #[error("cryptographic primitive unavailable: {0}")]
    PrimitiveUnavailable(String),

    /// Argon2id cost parameters outside what the primitive accepts
    #[error("invalid kdf parameters: {0}")]
    InvalidKdfParams(String),

    #[error("unsupported container version: {0}")]
    UnsupportedVersion(String),

    /// Sealing failures (input too long for the AEAD, oversized chunk)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// File storage and I/O errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted identity or metadata could not be parsed
    #[error("Format error: {0}")]
    Format(String),
}

impl PqVaultError {
    pub fn key_size(expected: usize, actual: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    pub fn decapsulation(msg: impl Into<String>) -> Self {
        Self::DecapsulationFailed(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    pub fn primitive(msg: impl Into<String>) -> Self {
        Self::PrimitiveUnavailable(msg.into())
    }

    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

impl From<std::io::Error> for PqVaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PqVaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PqVaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("background task failed: {}", err))
    }
}
