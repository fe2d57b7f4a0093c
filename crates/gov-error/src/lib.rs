// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the governance kernel.
//!
//! Every error that crosses a component boundary carries a [`ErrorCode`] (a
//! machine-readable, stable string tag), a human-readable message, an
//! optional cause chain, and arbitrary key-value context. Use the builder
//! returned by [`GovError::new`] to construct errors fluently.
//!
//! Internal helpers (the canonicalizer, hash verifiers) are allowed to fail
//! fast with their own local error types; this crate is where those errors
//! get translated once they cross a component boundary, per the kernel's
//! "accumulate at the validator, translate at the boundary" rule.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Manifest, registry, token, or receipt document is malformed.
    Schema,
    /// A root hash, file hash, or receipt hash does not match its content.
    Hash,
    /// A recovered signer does not match the declared signer.
    Signature,
    /// An approval token failed one or more validation checks.
    Token,
    /// A structural policy gate denied the action.
    Policy,
    /// Non-error: a challenge describing the approval a host must collect.
    Approval,
    /// WAL write failure, keychain access failure, anchor unreachable.
    Resource,
    /// The canonicalizer encountered an unrepresentable value.
    Encoding,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Hash => "hash",
            Self::Signature => "signature",
            Self::Token => "token",
            Self::Policy => "policy",
            Self::Approval => "approval",
            Self::Resource => "resource",
            Self::Encoding => "encoding",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string guaranteed not
/// to change across patch releases. The contractual substrings tests assert
/// on (`"expired"`, `"replay"`, `"root hash"`, ...) live in the
/// [`GovError::message`] built around the code, not in the code itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Schema --
    /// A release manifest failed structural validation.
    SchemaInvalidManifest,
    /// A tool registry document failed structural validation.
    SchemaInvalidRegistry,
    /// An approval token document failed structural validation.
    SchemaInvalidToken,
    /// A receipt document failed structural validation.
    SchemaInvalidReceipt,

    // -- Hash --
    /// The release manifest's declared `root_hash` does not match content.
    HashRootMismatch,
    /// A governance file's recomputed SHA-256 does not match the manifest.
    HashFileMismatch,
    /// A receipt's stored `receipt_hash` does not match its content.
    HashReceiptMismatch,

    // -- Signature --
    /// The recovered signer does not match the declared signer.
    SignatureInvalid,

    // -- Token (each with a distinct reason substring in its message) --
    /// Token version tag is unsupported.
    TokenInvalidVersion,
    /// Token's `release_root_hash` does not match the currently bound release.
    TokenInvalidRootHash,
    /// Token's `session_id` does not match the executing session.
    TokenInvalidSession,
    /// Token's `sequence_number` does not match the session's counter.
    TokenInvalidSequence,
    /// Token's `tool_name` does not match the tool being invoked.
    TokenInvalidToolName,
    /// Token's `action_hash` does not match the recomputed action hash.
    TokenInvalidActionHash,
    /// Token's `expires_at` is in the past.
    TokenExpired,
    /// Token's nonce has already been consumed.
    TokenReplay,
    /// Token signature failed to verify.
    TokenInvalidSignature,

    // -- Policy --
    /// Requested path is not covered by any path rule.
    PolicyPathNotAllowed,
    /// Requested domain is not in the egress allowlist.
    PolicyDomainNotAllowed,
    /// A parameter value exceeded its configured size limit.
    PolicySizeExceeded,
    /// Tool name is unknown; the defensive default applied.
    PolicyToolUnknown,

    // -- Approval (non-error challenge) --
    /// The call requires a signed approval token before it can proceed.
    ApprovalRequired,
    /// Approval issuance was throttled by the rate limiter.
    ApprovalRateLimited,

    // -- Resource --
    /// Write-ahead log persistence failed.
    ResourceWalFailure,
    /// Key vault backend access failed.
    ResourceKeychainFailure,
    /// The external anchor service was unreachable.
    ResourceAnchorUnreachable,

    // -- Encoding --
    /// A value could not be canonicalized (non-finite number, cycle, blob).
    EncodingUnrepresentable,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaInvalidManifest
            | Self::SchemaInvalidRegistry
            | Self::SchemaInvalidToken
            | Self::SchemaInvalidReceipt => ErrorCategory::Schema,

            Self::HashRootMismatch | Self::HashFileMismatch | Self::HashReceiptMismatch => {
                ErrorCategory::Hash
            }

            Self::SignatureInvalid => ErrorCategory::Signature,

            Self::TokenInvalidVersion
            | Self::TokenInvalidRootHash
            | Self::TokenInvalidSession
            | Self::TokenInvalidSequence
            | Self::TokenInvalidToolName
            | Self::TokenInvalidActionHash
            | Self::TokenExpired
            | Self::TokenReplay
            | Self::TokenInvalidSignature => ErrorCategory::Token,

            Self::PolicyPathNotAllowed
            | Self::PolicyDomainNotAllowed
            | Self::PolicySizeExceeded
            | Self::PolicyToolUnknown => ErrorCategory::Policy,

            Self::ApprovalRequired | Self::ApprovalRateLimited => ErrorCategory::Approval,

            Self::ResourceWalFailure
            | Self::ResourceKeychainFailure
            | Self::ResourceAnchorUnreachable => ErrorCategory::Resource,

            Self::EncodingUnrepresentable => ErrorCategory::Encoding,
        }
    }

    /// Stable `&'static str` representation (e.g. `"TOKEN_REPLAY"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaInvalidManifest => "SCHEMA_INVALID_MANIFEST",
            Self::SchemaInvalidRegistry => "SCHEMA_INVALID_REGISTRY",
            Self::SchemaInvalidToken => "SCHEMA_INVALID_TOKEN",
            Self::SchemaInvalidReceipt => "SCHEMA_INVALID_RECEIPT",
            Self::HashRootMismatch => "HASH_ROOT_MISMATCH",
            Self::HashFileMismatch => "HASH_FILE_MISMATCH",
            Self::HashReceiptMismatch => "HASH_RECEIPT_MISMATCH",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::TokenInvalidVersion => "TOKEN_INVALID_VERSION",
            Self::TokenInvalidRootHash => "TOKEN_INVALID_ROOT_HASH",
            Self::TokenInvalidSession => "TOKEN_INVALID_SESSION",
            Self::TokenInvalidSequence => "TOKEN_INVALID_SEQUENCE",
            Self::TokenInvalidToolName => "TOKEN_INVALID_TOOL_NAME",
            Self::TokenInvalidActionHash => "TOKEN_INVALID_ACTION_HASH",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenReplay => "TOKEN_REPLAY",
            Self::TokenInvalidSignature => "TOKEN_INVALID_SIGNATURE",
            Self::PolicyPathNotAllowed => "POLICY_PATH_NOT_ALLOWED",
            Self::PolicyDomainNotAllowed => "POLICY_DOMAIN_NOT_ALLOWED",
            Self::PolicySizeExceeded => "POLICY_SIZE_EXCEEDED",
            Self::PolicyToolUnknown => "POLICY_TOOL_UNKNOWN",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::ApprovalRateLimited => "APPROVAL_RATE_LIMITED",
            Self::ResourceWalFailure => "RESOURCE_WAL_FAILURE",
            Self::ResourceKeychainFailure => "RESOURCE_KEYCHAIN_FAILURE",
            Self::ResourceAnchorUnreachable => "RESOURCE_ANCHOR_UNREACHABLE",
            Self::EncodingUnrepresentable => "ENCODING_UNREPRESENTABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GovError
// ---------------------------------------------------------------------------

/// Unified kernel error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// ```
/// use gov_error::{GovError, ErrorCode};
///
/// let err = GovError::new(ErrorCode::TokenExpired, "approval token expired at 1700000000000")
///     .with_context("tool_name", "send_email");
/// assert!(err.to_string().contains("expired"));
/// ```
pub struct GovError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description. Tests may assert on stable substrings
    /// such as `"expired"`, `"replay"`, `"root hash"`, `"parameters"`.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl GovError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for GovError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("GovError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for GovError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for GovError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Serializable snapshot of a [`GovError`] (without the opaque source),
/// suitable for transport across the executor's result boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GovErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&GovError> for GovErrorDto {
    fn from(err: &GovError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<GovErrorDto> for GovError {
    fn from(dto: GovErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_construction() {
        let err = GovError::new(ErrorCode::TokenReplay, "nonce already spent");
        assert_eq!(err.code, ErrorCode::TokenReplay);
        assert_eq!(err.category(), ErrorCategory::Token);
        assert!(err.source.is_none());
    }

    #[test]
    fn display_contains_contractual_substring() {
        let err = GovError::new(ErrorCode::TokenExpired, "token expired 3s ago");
        assert!(err.to_string().contains("expired"));
        let err = GovError::new(ErrorCode::TokenReplay, "nonce replay detected");
        assert!(err.to_string().contains("replay"));
        let err = GovError::new(ErrorCode::HashRootMismatch, "root hash mismatch");
        assert!(err.to_string().contains("root hash"));
    }

    #[test]
    fn display_with_context_is_deterministic() {
        let a = GovError::new(ErrorCode::PolicySizeExceeded, "field too large")
            .with_context("field", "body")
            .with_context("max_bytes", 1024);
        let b = GovError::new(ErrorCode::PolicySizeExceeded, "field too large")
            .with_context("max_bytes", 1024)
            .with_context("field", "body");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn dto_round_trips() {
        let err = GovError::new(ErrorCode::PolicyToolUnknown, "unknown tool 'frobnicate'")
            .with_context("tool_name", "frobnicate");
        let dto = GovErrorDto::from(&err);
        let json = serde_json::to_string(&dto).unwrap();
        let back: GovErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
    }

    #[test]
    fn every_code_has_a_category() {
        let codes = [
            ErrorCode::SchemaInvalidManifest,
            ErrorCode::HashFileMismatch,
            ErrorCode::SignatureInvalid,
            ErrorCode::TokenInvalidSequence,
            ErrorCode::PolicyPathNotAllowed,
            ErrorCode::ApprovalRequired,
            ErrorCode::ResourceAnchorUnreachable,
            ErrorCode::EncodingUnrepresentable,
        ];
        for c in codes {
            let _ = c.category();
        }
    }

    #[test]
    fn code_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::TokenInvalidRootHash).unwrap(),
            "\"TOKEN_INVALID_ROOT_HASH\""
        );
    }
}
