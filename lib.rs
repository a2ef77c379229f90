//! # pqvault - Hybrid Post-Quantum File Containers
//!
//! pqvault encrypts files for a recipient's Kyber-1024 public key into a
//! self-describing container that can sit on an untrusted server. The
//! recipient's private key is itself sealed under a password, and changing
//! that password never touches a single stored container byte.
//!
//! ## Features
//!
//! - **KEM session keys**: every container gets a fresh Kyber-1024 encapsulation
//! - **Chunked AEAD**: 1 KiB plaintext chunks, each sealed with its own random nonce
//! - **Password-sealed private key**: Argon2id + HKDF-SHA256 wrapping key
//! - **O(1) password rotation**: only the sealed key triple is replaced
//! - **Secure memory**: session keys, private keys and derived keys are zeroized on drop
//!
//! ## Quick Start
//!
//! ```no_run
//! use pqvault::{
//!     DecryptionEngine, EncryptionEngine, KeyEncapsulator, Kyber1024, PrivateKeyVault,
//! };
//! use secrecy::SecretString;
//!
//! fn main() -> pqvault::Result<()> {
//!     let kem = Kyber1024::initialize().map_err(|e| pqvault::PqVaultError::primitive(e.0))?;
//!     let pair = KeyEncapsulator::new(kem).generate_key_pair()?;
//!
//!     let password = SecretString::from("p@ss1");
//!     let sealed = PrivateKeyVault::default().seal(&pair.private_key, &password)?;
//!
//!     let container = EncryptionEngine::new(kem).encrypt_container(b"hello", &pair.public_key)?;
//!     let plaintext = DecryptionEngine::new(kem).decrypt_container(&container, &password, &sealed)?;
//!     assert_eq!(plaintext, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Container Layout
//!
//! ```text
//! [header: 10240 bytes][chunk 0][chunk 1]...
//!
//! header: {"kyberEncryptedSessionKey":"<base64>","version":"1.0"} + zero padding
//! chunk:  [nonce:12][length:4, big-endian][sealed body: length bytes]
//! ```

pub mod chunk;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod identity;
pub mod kdf;
pub mod kem;
pub mod metadata;
pub mod primitives;
pub mod streaming;
pub mod vault;

pub use chunk::{Chunk, ChunkCipher};
pub use container::{ContainerCodec, DecodedContainer};
pub use engine::{DecryptionEngine, EncryptionEngine};
pub use error::{PqVaultError, Result};
pub use kdf::{KdfParams, PasswordKeyDeriver};
pub use kem::{KeyEncapsulator, KeyPair, PrivateKey, SessionKey};
pub use primitives::{Aes256GcmCipher, Argon2idHasher, ChaCha20Poly1305Cipher, Kyber1024};
pub use vault::{PrivateKeyVault, SealedPrivateKey};

/// Symmetric key size (256-bit)
pub const KEY_SIZE: usize = 32;

/// AEAD nonce size (96-bit)
pub const NONCE_SIZE: usize = 12;

/// AEAD authentication tag size
pub const TAG_SIZE: usize = 16;

/// Password salt size
pub const SALT_SIZE: usize = 16;

/// Fixed size of the container header region
pub const HEADER_SIZE: usize = 10 * 1024;

/// Plaintext bytes per chunk. Not recorded in the container; encoder and
/// decoder must agree on it.
pub const CHUNK_SIZE: usize = 1024;

/// Container format version written into every header
pub const FORMAT_VERSION: &str = "1.0";
