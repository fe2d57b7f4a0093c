// SPDX-License-Identifier: MIT OR Apache-2.0
//! Release manifest builder and verifier.
//!
//! A release manifest is the hash-anchored, signed snapshot of a governance
//! tree that every downstream component binds to by `root_hash`: the tool
//! registry is only trusted under a specific release, approval tokens and
//! receipts carry the `root_hash` they were issued against, and the
//! executor refuses to run if the currently loaded release doesn't match
//! what a token was signed for.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use gov_core::FileEntry;
use gov_error::{ErrorCode, GovError};
use gov_vault::{verify_signature, KeyRole, KeyVault, VaultError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed subdirectories that make up a governance tree. Anything outside
/// these (at the release root) is not part of the release.
pub const GOVERNANCE_SUBDIRS: &[&str] = &[
    "constitution",
    "agents",
    "tools",
    "schemas",
    "policy",
    "contracts",
];

/// File extensions a release is allowed to contain. Anything else inside a
/// governance subdirectory is skipped, not an error: unexpected file types
/// (editor swap files, OS metadata) are common and shouldn't break a build.
pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "json", "yaml", "yml", "toml", "txt"];

/// Errors specific to building or verifying a release, translated to
/// [`GovError`] at the component boundary.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// Filesystem access failed while walking or hashing the tree.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A file referenced by the manifest is missing from disk.
    #[error("file missing from governance tree: {path}")]
    FileMissing {
        /// Manifest-relative path that could not be found.
        path: String,
    },
    /// A file's recomputed hash does not match the manifest entry.
    #[error("file hash mismatch for {path}: manifest says {expected}, disk has {actual}")]
    FileHashMismatch {
        /// Offending path.
        path: String,
        /// Hash recorded in the manifest.
        expected: String,
        /// Hash recomputed from disk.
        actual: String,
    },
    /// The manifest's `root_hash` does not match the recomputed root hash.
    #[error("root hash mismatch: manifest says {expected}, recomputed {actual}")]
    RootHashMismatch {
        /// Hash recorded in the manifest.
        expected: String,
        /// Hash recomputed from the (possibly re-hashed) file list.
        actual: String,
    },
    /// The manifest's signature did not verify against its declared signer.
    #[error("release manifest signature is invalid")]
    SignatureInvalid,
    /// Canonicalization of the manifest failed.
    #[error(transparent)]
    Canon(#[from] GovError),
    /// A vault operation (signing) failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<ReleaseError> for GovError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::Io { ref path, .. } => {
                GovError::new(ErrorCode::ResourceWalFailure, err.to_string())
                    .with_context("path", path.display().to_string())
            }
            ReleaseError::FileMissing { ref path } => {
                GovError::new(ErrorCode::HashFileMismatch, err.to_string())
                    .with_context("path", path.clone())
            }
            ReleaseError::FileHashMismatch {
                ref path,
                ref expected,
                ref actual,
            } => GovError::new(ErrorCode::HashFileMismatch, err.to_string())
                .with_context("path", path.clone())
                .with_context("expected", expected.clone())
                .with_context("actual", actual.clone()),
            ReleaseError::RootHashMismatch {
                ref expected,
                ref actual,
            } => GovError::new(ErrorCode::HashRootMismatch, err.to_string())
                .with_context("expected", expected.clone())
                .with_context("actual", actual.clone()),
            ReleaseError::SignatureInvalid => {
                GovError::new(ErrorCode::SignatureInvalid, err.to_string())
            }
            ReleaseError::Canon(inner) => inner,
            ReleaseError::Vault(inner) => inner.into(),
        }
    }
}

/// A hash-anchored, signed snapshot of a governance tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// Monotonically increasing release version tag, e.g. `"1.4.0"`.
    pub release_version: String,
    /// Files covered by this release, sorted by path (byte-wise).
    pub files: Vec<FileEntry>,
    /// `0x`-prefixed lowercase hex SHA-256 over the canonicalized,
    /// signature-excluded manifest.
    pub root_hash: String,
    /// Lowercase hex Ed25519 public key of the release signer.
    pub signer: String,
    /// Lowercase hex Ed25519 signature over `root_hash`'s UTF-8 bytes.
    pub signature: String,
    /// Wall-clock build time.
    pub created_at: DateTime<Utc>,
}

/// Walk `governance_root`'s fixed subdirectories, hash every allowlisted
/// file, and return an unsigned manifest (`signer`/`signature` empty).
///
/// # Errors
///
/// Returns [`ReleaseError::Io`] if a subdirectory cannot be read, or if a
/// file cannot be opened/hashed.
pub fn build_release(
    governance_root: &Path,
    release_version: impl Into<String>,
) -> Result<ReleaseManifest, ReleaseError> {
    let mut files = Vec::new();
    for subdir in GOVERNANCE_SUBDIRS {
        let dir = governance_root.join(subdir);
        if !dir.exists() {
            continue;
        }
        collect_files(&dir, governance_root, &mut files)?;
    }
    files.sort();

    let mut manifest = ReleaseManifest {
        release_version: release_version.into(),
        files,
        root_hash: String::new(),
        signer: String::new(),
        signature: String::new(),
        created_at: Utc::now(),
    };
    manifest.root_hash = compute_root_hash(&manifest)?;
    Ok(manifest)
}

/// Attach a release-role signature from `vault` to `manifest`, in place.
///
/// # Errors
///
/// Propagates [`VaultError`] if `passphrase` is wrong or no release key is
/// stored.
pub fn sign_release(
    manifest: &mut ReleaseManifest,
    vault: &KeyVault,
    passphrase: &str,
) -> Result<(), ReleaseError> {
    let signer = vault
        .address(KeyRole::Release)
        .ok_or(VaultError::NoKeyForRole {
            role: KeyRole::Release,
        })?;
    let signature = vault.sign_hash(KeyRole::Release, passphrase, &manifest.root_hash)?;
    manifest.signer = signer;
    manifest.signature = signature;
    Ok(())
}

/// Recompute every file hash and the root hash from `governance_root`, and
/// verify `manifest`'s signature.
///
/// # Errors
///
/// Returns [`ReleaseError::FileMissing`] or [`ReleaseError::FileHashMismatch`]
/// for the first offending file, [`ReleaseError::RootHashMismatch`] if the
/// recomputed root hash differs, or [`ReleaseError::SignatureInvalid`] if the
/// signature does not verify.
pub fn verify_release(
    manifest: &ReleaseManifest,
    governance_root: &Path,
) -> Result<(), ReleaseError> {
    for entry in &manifest.files {
        let disk_path = governance_root.join(&entry.path);
        if !disk_path.exists() {
            return Err(ReleaseError::FileMissing {
                path: entry.path.clone(),
            });
        }
        let actual = hash_file(&disk_path)?;
        if actual != entry.sha256 {
            return Err(ReleaseError::FileHashMismatch {
                path: entry.path.clone(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
    }

    let recomputed_root = compute_root_hash(manifest)?;
    if recomputed_root != manifest.root_hash {
        return Err(ReleaseError::RootHashMismatch {
            expected: manifest.root_hash.clone(),
            actual: recomputed_root,
        });
    }

    verify_signature(
        &manifest.signer,
        manifest.root_hash.as_bytes(),
        &manifest.signature,
    )
    .map_err(|_| ReleaseError::SignatureInvalid)?;

    Ok(())
}

fn compute_root_hash(manifest: &ReleaseManifest) -> Result<String, ReleaseError> {
    let value = serde_json::to_value(manifest).map_err(|e| {
        ReleaseError::Canon(GovError::new(
            ErrorCode::EncodingUnrepresentable,
            format!("manifest could not be converted to JSON: {e}"),
        ))
    })?;
    gov_canon::canonical_hash_excluding(&value, &["root_hash", "signer", "signature"])
        .map_err(ReleaseError::Canon)
}

fn hash_file(path: &Path) -> Result<String, ReleaseError> {
    let bytes = fs::read(path).map_err(|source| ReleaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(gov_canon::sha256_hex(&bytes))
}

fn collect_files(
    dir: &Path,
    governance_root: &Path,
    out: &mut Vec<FileEntry>,
) -> Result<(), ReleaseError> {
    let entries = fs::read_dir(dir).map_err(|source| ReleaseError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReleaseError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_skipped(&name) {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, governance_root, out)?;
            continue;
        }
        if !has_allowed_extension(&path) {
            continue;
        }
        let bytes = fs::read(&path).map_err(|source| ReleaseError::Io {
            path: path.clone(),
            source,
        })?;
        let rel = path
            .strip_prefix(governance_root)
            .unwrap_or(&path)
            .to_string_lossy();
        out.push(FileEntry::new(
            rel.to_string(),
            gov_canon::sha256_hex(&bytes),
            bytes.len() as u64,
        ));
    }
    Ok(())
}

/// Dotfiles, dotdirs, and common editor/OS ephemera are never part of a
/// release, even if they sit inside an allowlisted subdirectory.
fn is_skipped(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with('~')
        || name.ends_with(".tmp")
        || name.ends_with(".swp")
        || name == "__pycache__"
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_governance_tree(root: &Path) {
        for subdir in ["constitution", "tools"] {
            fs::create_dir_all(root.join(subdir)).unwrap();
        }
        fs::write(root.join("constitution/charter.md"), b"we govern this way").unwrap();
        fs::write(root.join("tools/send_email.json"), b"{\"risk\":\"medium\"}").unwrap();
        fs::write(root.join("tools/.DS_Store"), b"ignored").unwrap();
        fs::write(root.join("tools/scratch.tmp"), b"ignored").unwrap();
    }

    #[test]
    fn build_skips_dotfiles_and_ephemera() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let manifest = build_release(dir.path(), "1.0.0").unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert!(manifest.files.iter().all(|f| !f.path.contains(".DS_Store")));
    }

    #[test]
    fn build_is_deterministic_and_sorted() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let m1 = build_release(dir.path(), "1.0.0").unwrap();
        let m2 = build_release(dir.path(), "1.0.0").unwrap();
        assert_eq!(m1.root_hash, m2.root_hash);
        let mut sorted = m1.files.clone();
        sorted.sort();
        assert_eq!(m1.files, sorted);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let mut manifest = build_release(dir.path(), "1.0.0").unwrap();

        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Release, "pw").unwrap();
        sign_release(&mut manifest, &vault, "pw").unwrap();

        verify_release(&manifest, dir.path()).unwrap();
    }

    #[test]
    fn tampered_file_is_detected() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let mut manifest = build_release(dir.path(), "1.0.0").unwrap();
        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Release, "pw").unwrap();
        sign_release(&mut manifest, &vault, "pw").unwrap();

        fs::write(dir.path().join("constitution/charter.md"), b"tampered").unwrap();

        let err = verify_release(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, ReleaseError::FileHashMismatch { .. }));
    }

    #[test]
    fn tampered_root_hash_is_detected() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let mut manifest = build_release(dir.path(), "1.0.0").unwrap();
        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Release, "pw").unwrap();
        sign_release(&mut manifest, &vault, "pw").unwrap();

        manifest.root_hash = "0xdeadbeef".repeat(8);

        let err = verify_release(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, ReleaseError::RootHashMismatch { .. }));
    }

    #[test]
    fn invalid_signature_is_detected() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let mut manifest = build_release(dir.path(), "1.0.0").unwrap();
        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Release, "pw").unwrap();
        sign_release(&mut manifest, &vault, "pw").unwrap();

        manifest.signature = "00".repeat(64);

        let err = verify_release(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, ReleaseError::SignatureInvalid));
    }

    #[test]
    fn missing_file_is_detected() {
        let dir = tempdir().unwrap();
        write_governance_tree(dir.path());
        let manifest = build_release(dir.path(), "1.0.0").unwrap();
        fs::remove_file(dir.path().join("tools/send_email.json")).unwrap();
        let err = verify_release(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, ReleaseError::FileMissing { .. }));
    }
}
