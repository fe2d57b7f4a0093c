// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting utilities for the governance CLI.

use gov_ledger::ChainFault;
use gov_release::ReleaseManifest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Compact JSON (single line).
    Json,
    /// Pretty-printed JSON.
    JsonPretty,
    /// Human-readable multi-line text.
    Text,
    /// Single-line summary.
    Compact,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Text => "text",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "text" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Formats kernel artifacts for CLI output.
#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Create a new formatter with the given output format.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a [`ReleaseManifest`] according to the configured output format.
    #[must_use]
    pub fn format_manifest(&self, manifest: &ReleaseManifest) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(manifest).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(manifest).unwrap_or_default(),
            OutputFormat::Text => format_manifest_text(manifest),
            OutputFormat::Compact => format_manifest_compact(manifest),
        }
    }

    /// Format a slice of [`ChainFault`]s according to the configured output
    /// format.
    #[must_use]
    pub fn format_chain_faults(&self, faults: &[ChainFault]) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(faults).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(faults).unwrap_or_default(),
            OutputFormat::Text => format_chain_faults_text(faults),
            OutputFormat::Compact => format!("{} fault(s)", faults.len()),
        }
    }
}

fn format_manifest_text(m: &ReleaseManifest) -> String {
    format!(
        "version:  {}\nfiles:    {}\nroot_hash: {}\nsigner:   {}\ncreated:  {}",
        m.release_version,
        m.files.len(),
        m.root_hash,
        m.signer,
        m.created_at,
    )
}

fn format_manifest_compact(m: &ReleaseManifest) -> String {
    format!(
        "[{}] {} files root_hash={}",
        m.release_version,
        m.files.len(),
        m.root_hash,
    )
}

fn format_chain_faults_text(faults: &[ChainFault]) -> String {
    if faults.is_empty() {
        return "chain intact: no faults found".to_string();
    }
    faults
        .iter()
        .map(fault_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn fault_line(fault: &ChainFault) -> String {
    match fault {
        ChainFault::SelfVerificationFailed {
            index,
            receipt_hash,
            reason,
        } => format!("[{index}] self-verification failed for {receipt_hash}: {reason}"),
        ChainFault::BrokenLink {
            index,
            expected,
            actual,
        } => format!(
            "[{index}] broken link: expected prev_receipt_hash {}, got {}",
            expected.as_deref().unwrap_or("null"),
            actual.as_deref().unwrap_or("null"),
        ),
        ChainFault::DuplicateSequence {
            index,
            session_id,
            sequence_number,
        } => format!("[{index}] duplicate sequence {sequence_number} in session {session_id}"),
    }
}
