// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-ahead log: durable append/commit/rollback of receipts.
//!
//! Every receipt is written to the log as `Pending` before the executor
//! commits to having run the tool. If the process crashes between the two,
//! recovery on the next startup surfaces the entry as `Pending` again so the
//! caller can decide whether to commit or roll it back, rather than losing
//! the record entirely.

use crate::Receipt;
use gov_error::{ErrorCode, GovError};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Lifecycle state of a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Appended but not yet committed.
    Pending,
    /// Committed: part of the durable, verifiable chain.
    Committed,
    /// Explicitly rolled back; excluded from the chain.
    RolledBack,
}

/// Errors specific to ledger operations, translated to [`GovError`] at the
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// WAL file could not be read or written.
    #[error("WAL io error: {0}")]
    Io(#[from] std::io::Error),
    /// A WAL line could not be parsed as a [`WalEvent`].
    #[error("malformed WAL entry: {0}")]
    Malformed(String),
    /// Canonicalization or hashing failed.
    #[error(transparent)]
    Canon(GovError),
    /// A vault operation (signing) failed.
    #[error(transparent)]
    Vault(#[from] gov_vault::VaultError),
    /// Referenced a receipt hash with no matching pending entry.
    #[error("no pending receipt with hash {0}")]
    NoSuchPending(String),
}

impl From<LedgerError> for GovError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Io(e) => {
                GovError::new(ErrorCode::ResourceWalFailure, format!("WAL io error: {e}"))
            }
            LedgerError::Malformed(msg) => {
                GovError::new(ErrorCode::SchemaInvalidReceipt, msg)
            }
            LedgerError::Canon(inner) => inner,
            LedgerError::Vault(inner) => inner.into(),
            LedgerError::NoSuchPending(hash) => {
                GovError::new(ErrorCode::ResourceWalFailure, format!("no pending receipt with hash {hash}"))
                    .with_context("receipt_hash", hash)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WalEvent {
    Append { receipt: Receipt },
    Commit { receipt_hash: String },
    RolledBack { receipt_hash: String },
}

struct WalEntry {
    receipt: Receipt,
    status: ReceiptStatus,
}

/// An append-only receipt log, optionally persisted to a JSON-lines file.
pub struct ReceiptLedger {
    entries: Vec<WalEntry>,
    wal_path: Option<PathBuf>,
}

impl ReceiptLedger {
    /// Open (and recover) a ledger backed by `wal_path`, or an in-memory
    /// ledger if `wal_path` is `None`.
    ///
    /// Recovery replays every event in the file in order; any receipt whose
    /// `append` was never followed by a `commit` or `rollback` comes back as
    /// [`ReceiptStatus::Pending`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file exists but cannot be read, or
    /// [`LedgerError::Malformed`] if a line is not valid WAL JSON.
    pub fn open(wal_path: Option<PathBuf>) -> Result<Self, LedgerError> {
        let entries = match &wal_path {
            Some(path) if path.exists() => replay(path)?,
            _ => Vec::new(),
        };
        Ok(Self { entries, wal_path })
    }

    /// Append `receipt` as [`ReceiptStatus::Pending`] and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the WAL file cannot be written.
    pub fn append_pending(&mut self, receipt: Receipt) -> Result<(), LedgerError> {
        self.write_event(&WalEvent::Append {
            receipt: receipt.clone(),
        })?;
        self.entries.push(WalEntry {
            receipt,
            status: ReceiptStatus::Pending,
        });
        Ok(())
    }

    /// Mark the pending receipt with `receipt_hash` as committed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchPending`] if no pending entry matches.
    pub fn commit(&mut self, receipt_hash: &str) -> Result<(), LedgerError> {
        self.transition(receipt_hash, ReceiptStatus::Committed)?;
        self.write_event(&WalEvent::Commit {
            receipt_hash: receipt_hash.to_string(),
        })
    }

    /// Mark the pending receipt with `receipt_hash` as rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchPending`] if no pending entry matches.
    pub fn rollback(&mut self, receipt_hash: &str) -> Result<(), LedgerError> {
        self.transition(receipt_hash, ReceiptStatus::RolledBack)?;
        self.write_event(&WalEvent::RolledBack {
            receipt_hash: receipt_hash.to_string(),
        })
    }

    fn transition(&mut self, receipt_hash: &str, status: ReceiptStatus) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.receipt.receipt_hash == receipt_hash && e.status == ReceiptStatus::Pending)
            .ok_or_else(|| LedgerError::NoSuchPending(receipt_hash.to_string()))?;
        entry.status = status;
        Ok(())
    }

    /// Every committed receipt, in append order.
    #[must_use]
    pub fn committed(&self) -> Vec<&Receipt> {
        self.entries
            .iter()
            .filter(|e| e.status == ReceiptStatus::Committed)
            .map(|e| &e.receipt)
            .collect()
    }

    /// Every pending receipt (e.g. surfaced by recovery), in append order.
    #[must_use]
    pub fn pending(&self) -> Vec<&Receipt> {
        self.entries
            .iter()
            .filter(|e| e.status == ReceiptStatus::Pending)
            .map(|e| &e.receipt)
            .collect()
    }

    /// The `receipt_hash` of the most recently committed receipt, or `None`
    /// if none have been committed yet (the next receipt signed against this
    /// tip is the genesis of its chain).
    #[must_use]
    pub fn tip_hash(&self) -> Option<String> {
        self.committed().last().map(|r| r.receipt_hash.clone())
    }

    fn write_event(&self, event: &WalEvent) -> Result<(), LedgerError> {
        let Some(path) = &self.wal_path else {
            return Ok(());
        };
        let mut file = open_append(path)?;
        let line = serde_json::to_string(event)
            .map_err(|e| LedgerError::Malformed(format!("failed to serialize WAL event: {e}")))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn replay(path: &Path) -> Result<Vec<WalEntry>, LedgerError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries: Vec<WalEntry> = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: WalEvent = serde_json::from_str(&line)
            .map_err(|e| LedgerError::Malformed(format!("line {}: {e}", line_no + 1)))?;
        match event {
            WalEvent::Append { receipt } => entries.push(WalEntry {
                receipt,
                status: ReceiptStatus::Pending,
            }),
            WalEvent::Commit { receipt_hash } => {
                if let Some(e) = entries.iter_mut().find(|e| e.receipt.receipt_hash == receipt_hash) {
                    e.status = ReceiptStatus::Committed;
                }
            }
            WalEvent::RolledBack { receipt_hash } => {
                if let Some(e) = entries.iter_mut().find(|e| e.receipt.receipt_hash == receipt_hash) {
                    e.status = ReceiptStatus::RolledBack;
                }
            }
        }
    }
    Ok(entries)
}

/// Anchors a Merkle root to an external system (a timestamping service, a
/// public ledger, a notarization API). The kernel ships no concrete
/// implementation; hosts provide one for their environment.
pub trait AnchorService: Send + Sync {
    /// Submit `merkle_root` for anchoring and return an opaque receipt
    /// identifier from the external system.
    ///
    /// # Errors
    ///
    /// Returns [`GovError`] with [`ErrorCode::ResourceAnchorUnreachable`] if
    /// the external system cannot be reached.
    fn anchor(&self, merkle_root: &str) -> Result<String, GovError>;
}

/// An [`AnchorService`] that performs no external call and returns the root
/// itself as the anchor identifier. Used in tests and as a default when no
/// external anchoring is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnchorService;

impl AnchorService for NoopAnchorService {
    fn anchor(&self, merkle_root: &str) -> Result<String, GovError> {
        Ok(merkle_root.to_string())
    }
}
