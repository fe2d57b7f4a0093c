// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Shared enums and value types used across the governance-enforcement kernel.
//!
//! These are the cross-cutting primitives named in the core data model:
//! [`Sensitivity`], [`RiskLevel`], [`FailMode`], [`Action`], and
//! [`FileEntry`]. Every other crate in the kernel depends on this one; it
//! must never depend back on them.

use serde::{Deserialize, Serialize};

/// Totally ordered classification of how sensitive a piece of data is.
///
/// Ordering matters: session taint and output sensitivity comparisons rely
/// on `Sensitivity`'s derived [`Ord`] implementation, and variant
/// declaration order below is the ordering (`Public` is lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// No confidentiality concerns.
    Public,
    /// Internal-only, not meant for external parties.
    Internal,
    /// Confidential business or user data.
    Confidential,
    /// Highest sensitivity: credentials, secrets, regulated data.
    Secret,
}

impl Sensitivity {
    /// Returns the lowest sensitivity level.
    #[must_use]
    pub const fn lowest() -> Self {
        Self::Public
    }

    /// Returns `max(self, other)`, used when merging taint across calls.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::Internal
    }
}

/// Ordered risk classification for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Safe, read-only, reversible.
    Low,
    /// Limited blast radius, usually reversible.
    Medium,
    /// Can cause real damage or irreversible side effects.
    High,
    /// Can cause severe or wide-reaching damage.
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Medium
    }
}

/// What happens when a tool's policy cannot be evaluated (e.g. registry
/// lookup failure, malformed definition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Allow the action through despite the evaluation failure.
    Open,
    /// Allow the action through, but the host must surface a warning.
    OpenWithWarning,
    /// Deny the action; the safe default for anything security-relevant.
    Closed,
}

impl Default for FailMode {
    fn default() -> Self {
        Self::Closed
    }
}

/// Terminal decision the executor (or any gate within it) reaches for a
/// single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The call is permitted to run.
    Allow,
    /// The call is denied outright.
    Block,
    /// The call cannot proceed without a valid approval token.
    RequireApproval,
}

/// How a tool's output sensitivity is computed once the call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "sensitivity")]
pub enum OutputSensitivityMode {
    /// Use the sensitivity label of whichever path rule matched.
    Inherit,
    /// Use the session's current taint at the moment of the call.
    Context,
    /// Always this fixed sensitivity, regardless of path rule or taint.
    Explicit(Sensitivity),
}

impl Default for OutputSensitivityMode {
    fn default() -> Self {
        Self::Explicit(Sensitivity::Internal)
    }
}

/// One file recorded in a [release manifest](https://en.wikipedia.org/wiki/Manifest_file),
/// keyed by its forward-slash-normalized relative path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative, forward-slash-normalized path from the governance root.
    pub path: String,
    /// `0x`-prefixed lowercase hex SHA-256 of the file's raw bytes.
    pub sha256: String,
    /// File size in bytes.
    pub size: u64,
}

impl FileEntry {
    /// Construct a new entry, normalizing backslashes to forward slashes.
    #[must_use]
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, size: u64) -> Self {
        Self {
            path: normalize_path(&path.into()),
            sha256: sha256.into(),
            size,
        }
    }
}

/// Normalize a path to use forward slashes, matching how `FileEntry::path`
/// is required to be stored regardless of host platform.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}
