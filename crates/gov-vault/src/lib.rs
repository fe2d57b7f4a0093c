// SPDX-License-Identifier: MIT OR Apache-2.0
//! Passphrase-protected Ed25519 key vault for the kernel's signing roles.
//!
//! Every signature the kernel produces — a release manifest signature, an
//! approval token signature, a receipt signature — comes from exactly one
//! of three isolated roles: [`KeyRole::Release`], [`KeyRole::Approver`], or
//! [`KeyRole::Receipt`]. Isolating the roles means a compromised approver
//! key can forge approvals but not releases, and vice versa.
//!
//! Each role's Ed25519 secret key is stored encrypted at rest with
//! AES-256-GCM, keyed by PBKDF2-HMAC-SHA256 over a caller-supplied
//! passphrase and a random per-key salt. The secret is only ever decrypted
//! for the duration of a single [`KeyVault::sign`] call, and the decrypted
//! buffer is zeroed immediately afterward.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gov_error::{ErrorCode, GovError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ROUNDS: u32 = 200_000;
const SECRET_KEY_LEN: usize = 32;

/// One of the kernel's three isolated signing roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// Signs release manifests.
    Release,
    /// Signs approval tokens.
    Approver,
    /// Signs ledger receipts.
    Receipt,
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Release => "release",
            Self::Approver => "approver",
            Self::Receipt => "receipt",
        };
        f.write_str(s)
    }
}

/// Errors local to the vault, translated to [`GovError`] at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The passphrase failed to decrypt the stored key (wrong passphrase or
    /// tampered ciphertext; AEAD cannot distinguish the two).
    #[error("invalid passphrase for key role {role}")]
    InvalidPassphrase {
        /// Role whose key could not be decrypted.
        role: KeyRole,
    },
    /// No key has been generated or imported for this role yet.
    #[error("no key stored for role {role}")]
    NoKeyForRole {
        /// Role that was looked up.
        role: KeyRole,
    },
    /// A key already exists for this role; delete it first to replace it.
    #[error("a key already exists for role {role}")]
    KeyAlreadyExists {
        /// Role that already has a key.
        role: KeyRole,
    },
    /// Imported key material was the wrong length or otherwise malformed.
    #[error("malformed key material: {0}")]
    Malformed(String),
    /// Signature verification failed (distinct from decryption failure).
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<VaultError> for GovError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidPassphrase { role } => GovError::new(
                ErrorCode::ResourceKeychainFailure,
                format!("invalid passphrase for key role {role}"),
            )
            .with_context("role", role.to_string()),
            VaultError::NoKeyForRole { role } => GovError::new(
                ErrorCode::ResourceKeychainFailure,
                format!("no key stored for role {role}"),
            )
            .with_context("role", role.to_string()),
            VaultError::KeyAlreadyExists { role } => GovError::new(
                ErrorCode::ResourceKeychainFailure,
                format!("a key already exists for role {role}"),
            )
            .with_context("role", role.to_string()),
            VaultError::Malformed(msg) => {
                GovError::new(ErrorCode::ResourceKeychainFailure, msg)
            }
            VaultError::VerificationFailed => {
                GovError::new(ErrorCode::SignatureInvalid, "signature verification failed")
            }
        }
    }
}

/// One role's key, encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptedKey {
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    public_key_hex: String,
}

/// A passphrase-protected collection of per-role Ed25519 keys.
///
/// `KeyVault` is `Send + Sync`: its only mutable state is the `HashMap`
/// itself, guarded like any other owned value — callers share it behind a
/// `Mutex` if they need concurrent access, the same pattern the nonce store
/// in `gov-approval` uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyVault {
    keys: HashMap<KeyRole, EncryptedKey>,
}

impl KeyVault {
    /// Create an empty vault with no keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh Ed25519 key for `role`, encrypt it under
    /// `passphrase`, and return its public address as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyAlreadyExists`] if `role` already has a key.
    pub fn generate(&mut self, role: KeyRole, passphrase: &str) -> Result<String, VaultError> {
        if self.keys.contains_key(&role) {
            return Err(VaultError::KeyAlreadyExists { role });
        }
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = self.store(role, passphrase, signing_key)?;
        Ok(address)
    }

    /// Import an externally generated 32-byte Ed25519 secret key for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyAlreadyExists`] if `role` already has a key,
    /// or [`VaultError::Malformed`] if `secret_key` is not 32 bytes.
    pub fn import(
        &mut self,
        role: KeyRole,
        passphrase: &str,
        secret_key: &[u8],
    ) -> Result<String, VaultError> {
        if self.keys.contains_key(&role) {
            return Err(VaultError::KeyAlreadyExists { role });
        }
        let bytes: [u8; SECRET_KEY_LEN] = secret_key
            .try_into()
            .map_err(|_| VaultError::Malformed(format!(
                "secret key must be {SECRET_KEY_LEN} bytes, got {}",
                secret_key.len()
            )))?;
        let signing_key = SigningKey::from_bytes(&bytes);
        self.store(role, passphrase, signing_key)
    }

    /// Remove the key stored for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoKeyForRole`] if `role` has no stored key.
    pub fn delete(&mut self, role: KeyRole) -> Result<(), VaultError> {
        self.keys
            .remove(&role)
            .map(|_| ())
            .ok_or(VaultError::NoKeyForRole { role })
    }

    /// Public address (lowercase hex `VerifyingKey`) for `role`, if stored.
    #[must_use]
    pub fn address(&self, role: KeyRole) -> Option<String> {
        self.keys.get(&role).map(|k| k.public_key_hex.clone())
    }

    /// Roles that currently have a stored key, in declaration order.
    #[must_use]
    pub fn list(&self) -> Vec<KeyRole> {
        [KeyRole::Release, KeyRole::Approver, KeyRole::Receipt]
            .into_iter()
            .filter(|r| self.keys.contains_key(r))
            .collect()
    }

    /// Decrypt `role`'s key under `passphrase`, sign `message`, scrub the
    /// decrypted secret, and return the signature as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoKeyForRole`] if `role` has no stored key, or
    /// [`VaultError::InvalidPassphrase`] if decryption fails.
    pub fn sign(
        &self,
        role: KeyRole,
        passphrase: &str,
        message: &[u8],
    ) -> Result<String, VaultError> {
        let mut secret = self.decrypt_secret(role, passphrase)?;
        let signing_key = SigningKey::from_bytes(&secret);
        let signature = signing_key.sign(message);
        scrub(&mut secret);
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Convenience wrapper over [`KeyVault::sign`] for signing a hex-encoded
    /// hash string (e.g. a release `root_hash`): signs the UTF-8 bytes of
    /// `hash_hex` exactly as it appears in the document being signed.
    ///
    /// # Errors
    ///
    /// Same as [`KeyVault::sign`].
    pub fn sign_hash(
        &self,
        role: KeyRole,
        passphrase: &str,
        hash_hex: &str,
    ) -> Result<String, VaultError> {
        self.sign(role, passphrase, hash_hex.as_bytes())
    }

    fn store(
        &mut self,
        role: KeyRole,
        passphrase: &str,
        signing_key: SigningKey,
    ) -> Result<String, VaultError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher_key = derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&cipher_key));
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut secret = signing_key.to_bytes();
        let ciphertext = cipher
            .encrypt(nonce, secret.as_ref())
            .map_err(|_| VaultError::Malformed("key encryption failed".to_string()))?;
        scrub(&mut secret);

        let public_key_hex = hex::encode(signing_key.verifying_key().to_bytes());
        self.keys.insert(
            role,
            EncryptedKey {
                salt,
                nonce: nonce_bytes,
                ciphertext,
                public_key_hex: public_key_hex.clone(),
            },
        );
        Ok(public_key_hex)
    }

    fn decrypt_secret(
        &self,
        role: KeyRole,
        passphrase: &str,
    ) -> Result<[u8; SECRET_KEY_LEN], VaultError> {
        let record = self.keys.get(&role).ok_or(VaultError::NoKeyForRole { role })?;
        let cipher_key = derive_key(passphrase, &record.salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&cipher_key));
        let nonce = Nonce::from_slice(&record.nonce);
        let plaintext = cipher
            .decrypt(nonce, record.ciphertext.as_ref())
            .map_err(|_| VaultError::InvalidPassphrase { role })?;
        plaintext
            .try_into()
            .map_err(|_| VaultError::InvalidPassphrase { role })
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}

fn scrub(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = 0;
    }
}

/// Verify a signature against a standalone public key, independent of any
/// vault instance. Used by `gov-release` and `gov-ledger` to check a
/// signature embedded in a document whose signer address they already know.
///
/// # Errors
///
/// Returns [`VaultError::Malformed`] if `public_key_hex` or `signature_hex`
/// are not valid hex of the expected length, and
/// [`VaultError::VerificationFailed`] if the signature does not verify.
pub fn verify_signature(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), VaultError> {
    let key_bytes = hex::decode(public_key_hex)
        .map_err(|e| VaultError::Malformed(format!("invalid public key hex: {e}")))?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| VaultError::Malformed("public key must be 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| VaultError::Malformed(format!("invalid public key: {e}")))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| VaultError::Malformed(format!("invalid signature hex: {e}")))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| VaultError::Malformed("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| VaultError::VerificationFailed)
}

/// A small fixed wordlist for [`generate_mnemonic`].
///
/// This is **not** the BIP-39 wordlist and the output is **not**
/// BIP-39-compatible: there is no checksum word and no standardized entropy
/// encoding. It exists only to give a human operator a pronounceable phrase
/// to write down next to an exported key.
const MNEMONIC_WORDS: &[&str] = &[
    "anchor", "basin", "cedar", "delta", "ember", "flint", "grove", "haven",
    "inlet", "joist", "kiln", "lumen", "mango", "niche", "orbit", "pivot",
    "quartz", "ridge", "sable", "timber", "umber", "vapor", "willow", "xenon",
    "yield", "zephyr", "amber", "birch", "coral", "dusk", "echo", "fable",
];

/// Generate a human-writable, non-BIP-39 mnemonic phrase of `word_count`
/// words, drawn with replacement from a 32-word list.
#[must_use]
pub fn generate_mnemonic(word_count: usize) -> String {
    let mut rng = OsRng;
    (0..word_count)
        .map(|_| MNEMONIC_WORDS[(rng.next_u32() as usize) % MNEMONIC_WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}
