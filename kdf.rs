//! Password → symmetric key derivation.
//!
//! `password, salt → Argon2id digest → HKDF-SHA256(info = purpose) → 256-bit key`
//!
//! The HKDF step binds the derived key to [`PRIVATE_KEY_WRAP_PURPOSE`], so a
//! digest computed for the same password and salt can never double as key
//! material for anything else.

use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{PqVaultError, Result};
use crate::primitives::{Argon2idHasher, PasswordHash};
use crate::{KEY_SIZE, SALT_SIZE};

/// HKDF info string for keys that wrap the recipient's private key
pub const PRIVATE_KEY_WRAP_PURPOSE: &[u8] = b"pqvault/v1/private-key-wrap";

/// Argon2id cost parameters.
///
/// The defaults are frozen for format version 1.0: changing them makes every
/// previously sealed private key unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Iterations (default: 3)
    pub time_cost: u32,
    /// Lanes (default: 1)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for real identities.
    pub fn testing() -> Self {
        Self {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Rejects costs Argon2id cannot run with (zero lanes, memory below
    /// `8 * parallelism` KiB, zero iterations and so on).
    pub fn validate(&self) -> Result<()> {
        // argon2 computes `8 * p_cost` before range-checking it
        if !(argon2::Params::MIN_P_COST..=argon2::Params::MAX_P_COST).contains(&self.parallelism) {
            return Err(PqVaultError::InvalidKdfParams(format!(
                "parallelism {} outside {}..={}",
                self.parallelism,
                argon2::Params::MIN_P_COST,
                argon2::Params::MAX_P_COST
            )));
        }

        argon2::Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map(|_| ())
        .map_err(|e| {
            PqVaultError::InvalidKdfParams(format!(
                "mem_cost_kib={} time_cost={} parallelism={}: {}",
                self.mem_cost_kib, self.time_cost, self.parallelism, e
            ))
        })
    }
}

/// A password-derived 256-bit key. Zeroized on drop.
pub struct PasswordKey {
    bytes: [u8; KEY_SIZE],
}

impl PasswordKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for PasswordKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key plus the salt that produced it. On the sealing path the salt is fresh
/// and must be persisted by the caller.
#[derive(Debug)]
pub struct DerivedKey {
    pub key: PasswordKey,
    pub salt: [u8; SALT_SIZE],
}

/// Turns passwords into wrapping keys.
///
/// Each call is deliberately expensive (hundreds of milliseconds, tens of MiB)
/// and blocks the calling thread; async callers belong on `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct PasswordKeyDeriver<H = Argon2idHasher> {
    hasher: H,
}

impl Default for PasswordKeyDeriver<Argon2idHasher> {
    fn default() -> Self {
        Self::new(Argon2idHasher::default())
    }
}

impl<H: PasswordHash> PasswordKeyDeriver<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Derives a key from `password`. With `salt == None` a fresh 16-byte salt
    /// is drawn; a supplied salt must be exactly 16 bytes.
    pub fn derive(&self, password: &SecretString, salt: Option<&[u8]>) -> Result<DerivedKey> {
        let salt: [u8; SALT_SIZE] = match salt {
            Some(s) => s
                .try_into()
                .map_err(|_| PqVaultError::InvalidSaltSize(s.len()))?,
            None => {
                let mut fresh = [0u8; SALT_SIZE];
                OsRng.fill_bytes(&mut fresh);
                fresh
            }
        };

        let mut digest = Zeroizing::new([0u8; KEY_SIZE]);
        self.hasher
            .hash(password.expose_secret().as_bytes(), &salt, &mut digest[..])
            .map_err(|e| PqVaultError::primitive(e.0))?;

        let hk = Hkdf::<Sha256>::new(Some(&salt[..]), &digest[..]);
        let mut key = PasswordKey { bytes: [0u8; KEY_SIZE] };
        hk.expand(PRIVATE_KEY_WRAP_PURPOSE, &mut key.bytes)
            .map_err(|e| PqVaultError::primitive(format!("HKDF expand failed: {}", e)))?;

        debug!("derived password key");
        Ok(DerivedKey { key, salt })
    }
}
