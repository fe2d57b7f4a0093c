// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-chain verification, reporting every offending receipt rather than
//! stopping at the first.

use crate::Receipt;
use serde::{Deserialize, Serialize};

/// One way a receipt chain can fail verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainFault {
    /// The receipt's own hash or signature does not verify.
    SelfVerificationFailed {
        /// Index of the offending receipt.
        index: usize,
        /// Its `receipt_hash`.
        receipt_hash: String,
        /// Why self-verification failed.
        reason: String,
    },
    /// `prev_receipt_hash` does not match the predecessor's `receipt_hash`
    /// (or `None` for the first receipt).
    BrokenLink {
        /// Index of the offending receipt.
        index: usize,
        /// What `prev_receipt_hash` should have been.
        expected: Option<String>,
        /// What it actually was.
        actual: Option<String>,
    },
    /// The same `(session_id, sequence_number)` appears more than once.
    DuplicateSequence {
        /// Index of the second (duplicate) occurrence.
        index: usize,
        /// The session the duplicate occurred in.
        session_id: String,
        /// The duplicated sequence number.
        sequence_number: u64,
    },
}

/// Verify every link and self-hash in `receipts`, in order, returning a
/// fault for each receipt that fails any check.
///
/// Unlike a fail-fast verifier, this walks the entire chain so a caller can
/// see the full extent of corruption or tampering in one pass.
#[must_use]
pub fn verify_chain(receipts: &[Receipt]) -> Vec<ChainFault> {
    let mut faults = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut expected_prev: Option<String> = None;

    for (index, receipt) in receipts.iter().enumerate() {
        if let Err(err) = receipt.verify_self() {
            faults.push(ChainFault::SelfVerificationFailed {
                index,
                receipt_hash: receipt.receipt_hash.clone(),
                reason: err.to_string(),
            });
        }

        if receipt.prev_receipt_hash != expected_prev {
            faults.push(ChainFault::BrokenLink {
                index,
                expected: expected_prev.clone(),
                actual: receipt.prev_receipt_hash.clone(),
            });
        }

        let key = (receipt.session_id.clone(), receipt.sequence_number);
        if !seen.insert(key) {
            faults.push(ChainFault::DuplicateSequence {
                index,
                session_id: receipt.session_id.clone(),
                sequence_number: receipt.sequence_number,
            });
        }

        expected_prev = Some(receipt.receipt_hash.clone());
    }

    faults
}
