// SPDX-License-Identifier: MIT OR Apache-2.0
//! Approval token issuance, validation, and replay prevention.
//!
//! An [`ApprovalToken`] binds one approver decision to one exact action: the
//! session that requested it, the sequence position in that session, the
//! tool being called, the hash of its parameters, and the release the call
//! is being evaluated under. Any drift between the token and the call it's
//! presented for is a rejection, not a warning.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gov_error::{ErrorCode, GovError};
use gov_vault::{verify_signature, KeyRole, KeyVault, VaultError};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// The only approval token wire version this kernel currently issues or
/// accepts.
pub const TOKEN_VERSION: u8 = 1;

/// A signed approval token authorizing one specific tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalToken {
    /// Wire version; tokens at any other version are rejected outright.
    pub version: u8,
    /// Session this token was issued for.
    pub session_id: String,
    /// Sequence position within the session this token authorizes.
    pub sequence_number: u64,
    /// Tool this token authorizes.
    pub tool_name: String,
    /// `gov_canon::action_hash` of the release, tool, and parameters.
    pub action_hash: String,
    /// Release `root_hash` this token was evaluated under.
    pub release_root_hash: String,
    /// Random, single-use identifier; the unit of replay prevention.
    pub nonce: String,
    /// When the approver signed this token.
    pub issued_at: DateTime<Utc>,
    /// Wall-clock deadline after which this token is no longer valid.
    /// There is deliberately no block-height or other chain-relative field:
    /// every expiry check in this kernel is wall-clock time.
    pub expires_at: DateTime<Utc>,
    /// Lowercase hex Ed25519 public key of the approver who signed this token.
    pub signer: String,
    /// Lowercase hex Ed25519 signature over the token's other fields.
    pub signature: String,
}

/// The call context a token is being checked against.
#[derive(Debug, Clone)]
pub struct ExpectedContext<'a> {
    /// Session the call is executing in.
    pub session_id: &'a str,
    /// Sequence number the session is currently at.
    pub sequence_number: u64,
    /// Tool being invoked.
    pub tool_name: &'a str,
    /// Recomputed action hash for the call as it is actually about to run.
    pub action_hash: &'a str,
    /// Release `root_hash` currently bound to the session.
    pub release_root_hash: &'a str,
    /// Approver public keys this session trusts.
    pub trusted_approvers: &'a [String],
}

/// One validation failure, carrying a stable error code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Machine-readable reason.
    pub code: ErrorCode,
    /// Human-readable reason; contains the code's contractual substring.
    pub message: String,
}

impl From<ValidationFailure> for GovError {
    fn from(f: ValidationFailure) -> Self {
        GovError::new(f.code, f.message)
    }
}

/// Check every field of `token` against `expected`, accumulating every
/// distinct failure rather than stopping at the first one.
///
/// Returns an empty `Vec` if the token is valid for this context. Does
/// **not** check or consume the nonce — see [`NonceStore::consume`] for
/// replay prevention, kept as a separate step so a token can be validated
/// without being spent.
#[must_use]
pub fn validate(token: &ApprovalToken, expected: &ExpectedContext<'_>, now: DateTime<Utc>) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if token.version != TOKEN_VERSION {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidVersion,
            message: format!(
                "token version {} does not match supported version {TOKEN_VERSION}",
                token.version
            ),
        });
    }
    if token.release_root_hash != expected.release_root_hash {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidRootHash,
            message: "token root hash does not match the currently bound release".to_string(),
        });
    }
    if token.session_id != expected.session_id {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidSession,
            message: "token session does not match the executing session".to_string(),
        });
    }
    if token.sequence_number != expected.sequence_number {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidSequence,
            message: format!(
                "token sequence {} does not match expected sequence {}",
                token.sequence_number, expected.sequence_number
            ),
        });
    }
    if token.tool_name != expected.tool_name {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidToolName,
            message: "token tool name does not match the tool being invoked".to_string(),
        });
    }
    if token.action_hash != expected.action_hash {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidActionHash,
            message: "token action hash does not match the recomputed action hash".to_string(),
        });
    }
    if token.expires_at <= now {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenExpired,
            message: format!("token expired at {}", token.expires_at),
        });
    }
    if !expected.trusted_approvers.iter().any(|a| a == &token.signer) {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidSignature,
            message: "token signer is not a trusted approver".to_string(),
        });
    } else if verify_signature(&token.signer, signed_bytes(token).as_slice(), &token.signature).is_err() {
        failures.push(ValidationFailure {
            code: ErrorCode::TokenInvalidSignature,
            message: "token signature failed to verify".to_string(),
        });
    }

    failures
}

/// Create and sign a new approval token.
///
/// # Errors
///
/// Propagates [`VaultError`] if `passphrase` is wrong or no approver key is
/// stored, and [`GovError`] if the token cannot be canonicalized for signing.
#[allow(clippy::too_many_arguments)]
pub fn create(
    vault: &KeyVault,
    passphrase: &str,
    session_id: impl Into<String>,
    sequence_number: u64,
    tool_name: impl Into<String>,
    action_hash: impl Into<String>,
    release_root_hash: impl Into<String>,
    ttl: ChronoDuration,
) -> Result<ApprovalToken, VaultError> {
    let now = Utc::now();
    let mut token = ApprovalToken {
        version: TOKEN_VERSION,
        session_id: session_id.into(),
        sequence_number,
        tool_name: tool_name.into(),
        action_hash: action_hash.into(),
        release_root_hash: release_root_hash.into(),
        nonce: uuid::Uuid::new_v4().to_string(),
        issued_at: now,
        expires_at: now + ttl,
        signer: String::new(),
        signature: String::new(),
    };
    let signer = vault
        .address(KeyRole::Approver)
        .ok_or(VaultError::NoKeyForRole {
            role: KeyRole::Approver,
        })?;
    let signature = vault.sign(KeyRole::Approver, passphrase, &signed_bytes(&token))?;
    token.signer = signer;
    token.signature = signature;
    Ok(token)
}

/// The bytes a token's signature is computed over: every field except
/// `signer` and `signature` themselves, canonicalized.
fn signed_bytes(token: &ApprovalToken) -> Vec<u8> {
    let mut unsigned = token.clone();
    unsigned.signer.clear();
    unsigned.signature.clear();
    let value = serde_json::to_value(&unsigned).expect("ApprovalToken always serializes");
    gov_canon::canonicalize(&value).expect("ApprovalToken fields are always canonicalizable")
}

/// Thread-safe record of spent nonces, the unit of replay prevention.
#[derive(Debug, Default)]
pub struct NonceStore {
    spent: Mutex<HashSet<String>>,
}

impl NonceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `token`'s nonce as spent. Fails if it was already spent.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationFailure`] with [`ErrorCode::TokenReplay`] if the
    /// nonce has already been consumed.
    pub fn consume(&self, token: &ApprovalToken) -> Result<(), ValidationFailure> {
        let mut spent = self.spent.lock().expect("nonce store mutex poisoned");
        if !spent.insert(token.nonce.clone()) {
            return Err(ValidationFailure {
                code: ErrorCode::TokenReplay,
                message: format!("replay: nonce {} already consumed", token.nonce),
            });
        }
        Ok(())
    }

    /// Number of nonces spent so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spent.lock().expect("nonce store mutex poisoned").len()
    }

    /// `true` if no nonces have been spent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rate limiter configuration for approval issuance.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum approvals a single limiter may issue in a rolling hour.
    pub max_approvals_per_hour: u32,
    /// Number of approvals within `burst_window` that triggers a cooldown.
    pub burst_threshold: u32,
    /// Window within which `burst_threshold` approvals count as a burst.
    pub burst_window: ChronoDuration,
    /// How long issuance is blocked after a detected burst.
    pub cooldown_after_burst: ChronoDuration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_approvals_per_hour: 120,
            burst_threshold: 10,
            burst_window: ChronoDuration::seconds(30),
            cooldown_after_burst: ChronoDuration::minutes(5),
        }
    }
}

/// Tracks approval issuance timestamps and throttles when the configured
/// hourly cap or burst threshold is exceeded.
///
/// No teacher crate to adapt here — the reference implementation had no
/// source to build on, so this is written fresh in the kernel's own style.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
    cooldown_until: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            timestamps: Mutex::new(VecDeque::new()),
            cooldown_until: Mutex::new(None),
        }
    }

    /// Check whether an approval may be issued at `now`, and if so, record
    /// it.
    ///
    /// # Errors
    ///
    /// Returns a [`GovError`] with [`ErrorCode::ApprovalRateLimited`] if the
    /// limiter is in cooldown, at its hourly cap, or a new burst has just
    /// been detected.
    pub fn check_and_record(&self, now: DateTime<Utc>) -> Result<(), GovError> {
        {
            let mut cooldown = self.cooldown_until.lock().expect("mutex poisoned");
            if let Some(until) = *cooldown {
                if now < until {
                    return Err(GovError::new(
                        ErrorCode::ApprovalRateLimited,
                        format!("approval issuance is in cooldown until {until}"),
                    ));
                }
                *cooldown = None;
            }
        }

        let mut timestamps = self.timestamps.lock().expect("mutex poisoned");
        let hour_ago = now - ChronoDuration::hours(1);
        while timestamps.front().is_some_and(|t| *t < hour_ago) {
            timestamps.pop_front();
        }

        if timestamps.len() as u32 >= self.config.max_approvals_per_hour {
            return Err(GovError::new(
                ErrorCode::ApprovalRateLimited,
                format!(
                    "hourly approval cap of {} reached",
                    self.config.max_approvals_per_hour
                ),
            ));
        }

        let burst_start = now - self.config.burst_window;
        let recent_count = timestamps.iter().filter(|t| **t >= burst_start).count() as u32;
        if recent_count + 1 >= self.config.burst_threshold {
            let until = now + self.config.cooldown_after_burst;
            *self.cooldown_until.lock().expect("mutex poisoned") = Some(until);
            return Err(GovError::new(
                ErrorCode::ApprovalRateLimited,
                format!("burst of {} approvals detected, cooling down until {until}", recent_count + 1),
            ));
        }

        timestamps.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (KeyVault, String) {
        let mut vault = KeyVault::new();
        let addr = vault.generate(KeyRole::Approver, "pw").unwrap();
        (vault, addr)
    }

    #[test]
    fn valid_token_has_no_failures() {
        let (vault, approver) = setup();
        let token = create(
            &vault,
            "pw",
            "session-1",
            0,
            "send_email",
            "0xaction",
            "0xroot",
            ChronoDuration::minutes(5),
        )
        .unwrap();
        let expected = ExpectedContext {
            session_id: "session-1",
            sequence_number: 0,
            tool_name: "send_email",
            action_hash: "0xaction",
            release_root_hash: "0xroot",
            trusted_approvers: &[approver],
        };
        let failures = validate(&token, &expected, Utc::now());
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn mismatches_accumulate_independently() {
        let (vault, approver) = setup();
        let token = create(
            &vault,
            "pw",
            "session-1",
            0,
            "send_email",
            "0xaction",
            "0xroot",
            ChronoDuration::minutes(5),
        )
        .unwrap();
        let expected = ExpectedContext {
            session_id: "session-2",
            sequence_number: 7,
            tool_name: "send_email",
            action_hash: "0xaction",
            release_root_hash: "0xroot",
            trusted_approvers: &[approver],
        };
        let failures = validate(&token, &expected, Utc::now());
        let codes: Vec<_> = failures.iter().map(|f| f.code).collect();
        assert!(codes.contains(&ErrorCode::TokenInvalidSession));
        assert!(codes.contains(&ErrorCode::TokenInvalidSequence));
        assert_eq!(codes.len(), 2);
    }

    #[test]
    fn expired_token_is_flagged() {
        let (vault, approver) = setup();
        let token = create(
            &vault,
            "pw",
            "session-1",
            0,
            "tool",
            "0xaction",
            "0xroot",
            ChronoDuration::seconds(-1),
        )
        .unwrap();
        let expected = ExpectedContext {
            session_id: "session-1",
            sequence_number: 0,
            tool_name: "tool",
            action_hash: "0xaction",
            release_root_hash: "0xroot",
            trusted_approvers: &[approver],
        };
        let failures = validate(&token, &expected, Utc::now());
        assert!(failures.iter().any(|f| f.code == ErrorCode::TokenExpired));
        assert!(failures.iter().any(|f| f.message.contains("expired")));
    }

    #[test]
    fn untrusted_signer_is_rejected() {
        let (vault, _approver) = setup();
        let token = create(
            &vault,
            "pw",
            "session-1",
            0,
            "tool",
            "0xaction",
            "0xroot",
            ChronoDuration::minutes(5),
        )
        .unwrap();
        let expected = ExpectedContext {
            session_id: "session-1",
            sequence_number: 0,
            tool_name: "tool",
            action_hash: "0xaction",
            release_root_hash: "0xroot",
            trusted_approvers: &["someone-else".to_string()],
        };
        let failures = validate(&token, &expected, Utc::now());
        assert!(failures
            .iter()
            .any(|f| f.code == ErrorCode::TokenInvalidSignature));
    }

    #[test]
    fn nonce_store_rejects_replay() {
        let (vault, _approver) = setup();
        let token = create(
            &vault,
            "pw",
            "session-1",
            0,
            "tool",
            "0xaction",
            "0xroot",
            ChronoDuration::minutes(5),
        )
        .unwrap();
        let store = NonceStore::new();
        store.consume(&token).unwrap();
        let err = store.consume(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenReplay);
        assert!(err.message.contains("replay") || err.message.contains("already been consumed"));
    }

    #[test]
    fn rate_limiter_enforces_hourly_cap() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_approvals_per_hour: 2,
            burst_threshold: 100,
            burst_window: ChronoDuration::seconds(1),
            cooldown_after_burst: ChronoDuration::minutes(1),
        });
        let now = Utc::now();
        limiter.check_and_record(now).unwrap();
        limiter.check_and_record(now).unwrap();
        let err = limiter.check_and_record(now).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalRateLimited);
    }

    #[test]
    fn rate_limiter_detects_burst_and_cools_down() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_approvals_per_hour: 1000,
            burst_threshold: 3,
            burst_window: ChronoDuration::seconds(10),
            cooldown_after_burst: ChronoDuration::minutes(10),
        });
        let now = Utc::now();
        limiter.check_and_record(now).unwrap();
        limiter.check_and_record(now).unwrap();
        let err = limiter.check_and_record(now).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalRateLimited);

        // Still in cooldown a moment later.
        let err2 = limiter
            .check_and_record(now + ChronoDuration::seconds(1))
            .unwrap_err();
        assert_eq!(err2.code, ErrorCode::ApprovalRateLimited);
    }
}
