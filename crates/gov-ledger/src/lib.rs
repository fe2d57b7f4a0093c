// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! The receipt ledger: a hash-chained, Merkle-batched, write-ahead-logged
//! audit trail of every tool call decision the executor makes.
//!
//! A [`Receipt`] links to its predecessor by `prev_receipt_hash` (`None` for
//! the genesis receipt of a chain) and self-hashes every field except its
//! own `receipt_hash` and `signature`. [`wal`] makes appends durable before
//! they're committed; [`chain`] re-verifies the whole chain on demand;
//! [`merkle`] batches ranges of receipts for cheap external anchoring.

mod builder;
pub mod chain;
pub mod merkle;
pub mod wal;

pub use builder::ReceiptBuilder;
pub use chain::{ChainFault, verify_chain};
pub use merkle::{MerkleProofStep, generate_proof, merkle_root, verify_proof};
pub use wal::{AnchorService, LedgerError, NoopAnchorService, ReceiptLedger, ReceiptStatus};

use chrono::{DateTime, Utc};
use gov_core::{Action, Sensitivity};
use gov_error::{ErrorCode, GovError};
use gov_vault::verify_signature;
use serde::{Deserialize, Serialize};

/// One signed, hash-chained record of a tool call decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    /// Session this receipt belongs to.
    pub session_id: String,
    /// Position of this call within the session.
    pub sequence_number: u64,
    /// Tool that was called.
    pub tool_name: String,
    /// `gov_canon::action_hash` of the release, tool, and parameters.
    pub action_hash: String,
    /// Release `root_hash` the call was evaluated under.
    pub release_root_hash: String,
    /// Terminal decision the executor reached.
    pub decision: Action,
    /// Session taint at the time of the call.
    pub input_sensitivity: Sensitivity,
    /// Sensitivity assigned to this call's output.
    pub output_sensitivity: Sensitivity,
    /// Nonce of the approval token consumed for this call, if any.
    pub approval_nonce: Option<String>,
    /// `receipt_hash` of the immediately preceding receipt in this chain, or
    /// `None` for the first receipt (serializes to JSON `null`).
    pub prev_receipt_hash: Option<String>,
    /// `0x`-prefixed lowercase hex SHA-256 over every field above plus
    /// `recorded_at`, excluding this field and `signature`.
    pub receipt_hash: String,
    /// Lowercase hex Ed25519 public key of the receipt signer.
    pub signer: String,
    /// Lowercase hex Ed25519 signature over `receipt_hash`.
    pub signature: String,
    /// When the executor recorded this decision.
    pub recorded_at: DateTime<Utc>,
}

impl Receipt {
    /// Recompute this receipt's self-hash from its fields, independent of
    /// what's stored in `receipt_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`GovError`] if the receipt cannot be canonicalized.
    pub fn recompute_hash(&self) -> Result<String, GovError> {
        let value = serde_json::to_value(self).map_err(|e| {
            GovError::new(
                ErrorCode::EncodingUnrepresentable,
                format!("receipt could not be converted to JSON: {e}"),
            )
        })?;
        gov_canon::canonical_hash_excluding(&value, &["receipt_hash", "signer", "signature"])
    }

    /// Verify this receipt's stored hash matches its recomputed hash and its
    /// signature verifies against its declared signer.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::HashReceiptMismatch`] or
    /// [`ErrorCode::SignatureInvalid`].
    pub fn verify_self(&self) -> Result<(), GovError> {
        let recomputed = self.recompute_hash()?;
        if recomputed != self.receipt_hash {
            return Err(GovError::new(
                ErrorCode::HashReceiptMismatch,
                format!(
                    "receipt hash mismatch: stored {}, recomputed {recomputed}",
                    self.receipt_hash
                ),
            )
            .with_context("session_id", self.session_id.clone())
            .with_context("sequence_number", self.sequence_number));
        }
        verify_signature(&self.signer, self.receipt_hash.as_bytes(), &self.signature).map_err(
            |_| {
                GovError::new(ErrorCode::SignatureInvalid, "receipt signature is invalid")
                    .with_context("session_id", self.session_id.clone())
                    .with_context("sequence_number", self.sequence_number)
            },
        )
    }
}
