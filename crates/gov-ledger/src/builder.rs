// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fluent builder for constructing signed [`Receipt`]s.

use crate::wal::LedgerError;
use crate::Receipt;
use chrono::{DateTime, Utc};
use gov_core::{Action, Sensitivity};
use gov_vault::{KeyRole, KeyVault};

/// Fluent builder for constructing a [`Receipt`], finished by
/// [`ReceiptBuilder::sign`].
///
/// # Examples
///
/// ```
/// use gov_ledger::ReceiptBuilder;
/// use gov_vault::{KeyVault, KeyRole};
///
/// let mut vault = KeyVault::new();
/// vault.generate(KeyRole::Receipt, "pw").unwrap();
///
/// let receipt = ReceiptBuilder::new("session-1", 0, "read_file", "0xaction", "0xroot")
///     .sign(&vault, "pw", None)
///     .unwrap();
/// assert_eq!(receipt.sequence_number, 0);
/// ```
#[derive(Debug)]
pub struct ReceiptBuilder {
    session_id: String,
    sequence_number: u64,
    tool_name: String,
    action_hash: String,
    release_root_hash: String,
    decision: Action,
    input_sensitivity: Sensitivity,
    output_sensitivity: Sensitivity,
    approval_nonce: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl ReceiptBuilder {
    /// Start a new builder for one tool call's decision.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        sequence_number: u64,
        tool_name: impl Into<String>,
        action_hash: impl Into<String>,
        release_root_hash: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sequence_number,
            tool_name: tool_name.into(),
            action_hash: action_hash.into(),
            release_root_hash: release_root_hash.into(),
            decision: Action::Allow,
            input_sensitivity: Sensitivity::default(),
            output_sensitivity: Sensitivity::default(),
            approval_nonce: None,
            recorded_at: Utc::now(),
        }
    }

    /// Set the terminal decision the executor reached.
    #[must_use]
    pub fn decision(mut self, decision: Action) -> Self {
        self.decision = decision;
        self
    }

    /// Set the session taint in effect when the call ran.
    #[must_use]
    pub fn input_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.input_sensitivity = sensitivity;
        self
    }

    /// Set the sensitivity assigned to the call's output.
    #[must_use]
    pub fn output_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.output_sensitivity = sensitivity;
        self
    }

    /// Record the approval token nonce that authorized this call, if any.
    #[must_use]
    pub fn approval_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.approval_nonce = Some(nonce.into());
        self
    }

    /// Override the recorded timestamp (defaults to the time the builder
    /// was constructed).
    #[must_use]
    pub fn recorded_at(mut self, dt: DateTime<Utc>) -> Self {
        self.recorded_at = dt;
        self
    }

    /// Finish the receipt: compute its self-hash and sign it with the
    /// receipt-role key.
    ///
    /// # Errors
    ///
    /// Propagates [`gov_vault::VaultError`] wrapped in [`LedgerError`] if no
    /// receipt key is stored or `passphrase` is wrong.
    pub fn sign(
        self,
        vault: &KeyVault,
        passphrase: &str,
        prev_receipt_hash: Option<String>,
    ) -> Result<Receipt, LedgerError> {
        let mut receipt = Receipt {
            session_id: self.session_id,
            sequence_number: self.sequence_number,
            tool_name: self.tool_name,
            action_hash: self.action_hash,
            release_root_hash: self.release_root_hash,
            decision: self.decision,
            input_sensitivity: self.input_sensitivity,
            output_sensitivity: self.output_sensitivity,
            approval_nonce: self.approval_nonce,
            prev_receipt_hash,
            receipt_hash: String::new(),
            signer: String::new(),
            signature: String::new(),
            recorded_at: self.recorded_at,
        };
        receipt.receipt_hash = receipt.recompute_hash().map_err(LedgerError::Canon)?;
        let signer = vault
            .address(KeyRole::Receipt)
            .ok_or(gov_vault::VaultError::NoKeyForRole {
                role: KeyRole::Receipt,
            })?;
        let signature = vault.sign_hash(KeyRole::Receipt, passphrase, &receipt.receipt_hash)?;
        receipt.signer = signer;
        receipt.signature = signature;
        Ok(receipt)
    }
}
