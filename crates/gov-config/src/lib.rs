// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the governance kernel.
//!
//! [`GovernanceConfig`] is the top-level document: where governance state
//! lives on disk, the approval rate limiter's thresholds, where release
//! artifacts are stored, and the chain settings used to anchor Merkle
//! roots externally. Unknown keys anywhere in the document are rejected;
//! a typo in a config file should fail loudly, not be silently ignored.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML, including the case
    /// where it contains a key this schema does not recognize.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `approval.max_approvals_per_hour` is unusually high for a single
    /// session's rate limit.
    LargeApprovalCap {
        /// The configured cap.
        max_approvals_per_hour: u32,
    },
    /// No backup storage backend is configured; a primary-only loss is
    /// unrecoverable.
    NoBackupStorage,
    /// A chain setting is missing while another chain setting is present,
    /// which usually indicates an incomplete configuration.
    IncompleteChainConfig {
        /// Which field is missing.
        field: &'static str,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LargeApprovalCap {
                max_approvals_per_hour,
            } => write!(
                f,
                "approval.max_approvals_per_hour is unusually high ({max_approvals_per_hour})"
            ),
            Self::NoBackupStorage => write!(f, "no storage.backup configured"),
            Self::IncompleteChainConfig { field } => {
                write!(f, "chain config is missing '{field}'")
            }
        }
    }
}

/// Above this, a large hourly approval cap is advisory-flagged — it likely
/// defeats the point of rate limiting.
const LARGE_APPROVAL_CAP_THRESHOLD: u32 = 1_000;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration for the governance-enforcement kernel.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GovernanceConfig {
    /// Directory holding the release tree, registry document, and WAL.
    pub governance_dir: PathBuf,
    /// Approval issuance and rate-limiting settings.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Where release artifacts and receipts are stored.
    #[serde(default)]
    pub storage: StorageConfig,
    /// External anchor-chain settings, if Merkle roots are anchored.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Semver of the release this configuration governs.
    pub release_version: String,
}

/// Approval issuance and rate-limiting settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// Maximum approvals a session's rate limiter may issue in a rolling hour.
    #[serde(default = "default_max_approvals_per_hour")]
    pub max_approvals_per_hour: u32,
    /// Cooldown, in minutes, imposed after a detected burst.
    #[serde(default = "default_cooldown_after_burst")]
    pub cooldown_after_burst: u32,
    /// Number of approvals within the burst window that count as a burst.
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: u32,
    /// If `true`, an approver must echo back a human-readable summary of
    /// the action before their approval is accepted.
    #[serde(default)]
    pub require_summary_confirmation: bool,
}

const fn default_max_approvals_per_hour() -> u32 {
    120
}
const fn default_cooldown_after_burst() -> u32 {
    5
}
const fn default_burst_threshold() -> u32 {
    10
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            max_approvals_per_hour: default_max_approvals_per_hour(),
            cooldown_after_burst: default_cooldown_after_burst(),
            burst_threshold: default_burst_threshold(),
            require_summary_confirmation: false,
        }
    }
}

/// A storage backend for release artifacts and receipts.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// The local filesystem under `governance_dir`.
    Local,
    /// A GitHub repository, used as a durable off-host mirror.
    Github,
    /// An S3-compatible object store.
    S3,
}

/// Where release artifacts and receipts are stored.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// The backend writes go to first.
    #[serde(default)]
    pub primary: StorageBackend,
    /// Additional backends every write is mirrored to.
    #[serde(default)]
    pub backup: Vec<StorageBackend>,
    /// Backend-specific connection fields (bucket name, repo slug, access
    /// key id, ...), kept opaque here since they vary per backend and are
    /// validated by whatever host code actually opens the connection.
    #[serde(default)]
    pub connection: std::collections::BTreeMap<String, String>,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Local
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary: StorageBackend::default(),
            backup: Vec::new(),
            connection: std::collections::BTreeMap::new(),
        }
    }
}

/// External anchor-chain settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the anchor chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Address of the anchoring contract on that chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Human-readable network name (e.g. `"mainnet"`, `"sepolia"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`GovernanceConfig`] from a TOML file on disk.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` does not exist, or
/// [`ConfigError::ParseError`] if it is not valid TOML for this schema
/// (including unrecognized keys).
pub fn load_config(path: &Path) -> Result<GovernanceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content)
}

/// Parse a TOML string into a [`GovernanceConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if the document is malformed or
/// contains a key outside this schema.
pub fn parse_toml(content: &str) -> Result<GovernanceConfig, ConfigError> {
    toml::from_str::<GovernanceConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (invalid semver, zero-valued thresholds) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] listing every problem found;
/// validation never stops at the first one.
pub fn validate_config(config: &GovernanceConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if semver::Version::parse(&config.release_version).is_err() {
        errors.push(format!(
            "release_version '{}' is not valid semver",
            config.release_version
        ));
    }

    if config.approval.max_approvals_per_hour == 0 {
        errors.push("approval.max_approvals_per_hour must be at least 1".to_string());
    } else if config.approval.max_approvals_per_hour > LARGE_APPROVAL_CAP_THRESHOLD {
        warnings.push(ConfigWarning::LargeApprovalCap {
            max_approvals_per_hour: config.approval.max_approvals_per_hour,
        });
    }

    if config.approval.burst_threshold == 0 {
        errors.push("approval.burst_threshold must be at least 1".to_string());
    }

    if config.governance_dir.as_os_str().is_empty() {
        errors.push("governance_dir must not be empty".to_string());
    }

    if config.storage.backup.is_empty() {
        warnings.push(ConfigWarning::NoBackupStorage);
    }

    let chain_fields = [
        ("rpc_url", config.chain.rpc_url.is_some()),
        ("contract_address", config.chain.contract_address.is_some()),
        ("network", config.chain.network.is_some()),
    ];
    let any_chain_field = chain_fields.iter().any(|(_, present)| *present);
    if any_chain_field {
        for (field, present) in chain_fields {
            if !present {
                warnings.push(ConfigWarning::IncompleteChainConfig { field });
            }
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Storage backup lists and connection maps are combined; on connection-key
/// collisions the overlay entry wins.
#[must_use]
pub fn merge_configs(base: GovernanceConfig, overlay: GovernanceConfig) -> GovernanceConfig {
    let mut backup = base.storage.backup;
    for b in overlay.storage.backup {
        if !backup.contains(&b) {
            backup.push(b);
        }
    }
    let mut connection = base.storage.connection;
    connection.extend(overlay.storage.connection);

    GovernanceConfig {
        governance_dir: overlay.governance_dir,
        approval: overlay.approval,
        storage: StorageConfig {
            primary: overlay.storage.primary,
            backup,
            connection,
        },
        chain: ChainConfig {
            rpc_url: overlay.chain.rpc_url.or(base.chain.rpc_url),
            contract_address: overlay.chain.contract_address.or(base.chain.contract_address),
            network: overlay.chain.network.or(base.chain.network),
        },
        release_version: overlay.release_version,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            governance_dir = "/var/lib/governance"
            release_version = "1.0.0"
        "#
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        assert_eq!(cfg.approval.max_approvals_per_hour, 120);
        assert_eq!(cfg.storage.primary, StorageBackend::Local);
        assert!(cfg.chain.rpc_url.is_none());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let toml = format!("{}\nnonexistent_field = true", minimal_toml());
        let err = parse_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn unknown_nested_key_is_rejected() {
        let toml = r#"
            governance_dir = "/var/lib/governance"
            release_version = "1.0.0"

            [approval]
            max_approvals_per_hour = 50
            typo_field = 1
        "#;
        let err = parse_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_semver_release_version_fails_validation() {
        let mut cfg = parse_toml(minimal_toml()).unwrap();
        cfg.release_version = "not-a-version".to_string();
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("semver")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn zero_max_approvals_per_hour_fails_validation() {
        let mut cfg = parse_toml(minimal_toml()).unwrap();
        cfg.approval.max_approvals_per_hour = 0;
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn large_approval_cap_produces_warning_not_error() {
        let mut cfg = parse_toml(minimal_toml()).unwrap();
        cfg.approval.max_approvals_per_hour = 5_000;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::LargeApprovalCap { .. })));
    }

    #[test]
    fn missing_backup_storage_produces_warning() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.contains(&ConfigWarning::NoBackupStorage));
    }

    #[test]
    fn partial_chain_config_produces_warnings_for_missing_fields() {
        let toml = r#"
            governance_dir = "/var/lib/governance"
            release_version = "1.0.0"

            [chain]
            rpc_url = "https://example.com/rpc"
        "#;
        let cfg = parse_toml(toml).unwrap();
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::IncompleteChainConfig { field: "contract_address" })));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::IncompleteChainConfig { field: "network" })));
    }

    #[test]
    fn complete_chain_config_produces_no_chain_warnings() {
        let toml = r#"
            governance_dir = "/var/lib/governance"
            release_version = "1.0.0"

            [chain]
            rpc_url = "https://example.com/rpc"
            contract_address = "0xabc"
            network = "mainnet"
        "#;
        let cfg = parse_toml(toml).unwrap();
        let warnings = validate_config(&cfg).unwrap();
        assert!(!warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::IncompleteChainConfig { .. })));
    }

    #[test]
    fn storage_backend_roundtrips_through_toml() {
        let toml = r#"
            governance_dir = "/var/lib/governance"
            release_version = "1.0.0"

            [storage]
            primary = "s3"
            backup = ["local", "github"]

            [storage.connection]
            bucket = "governance-artifacts"
        "#;
        let cfg = parse_toml(toml).unwrap();
        assert_eq!(cfg.storage.primary, StorageBackend::S3);
        assert_eq!(
            cfg.storage.backup,
            vec![StorageBackend::Local, StorageBackend::Github]
        );
        assert_eq!(
            cfg.storage.connection.get("bucket").map(String::as_str),
            Some("governance-artifacts")
        );
    }

    #[test]
    fn merge_overlay_overrides_primary_storage() {
        let base = parse_toml(minimal_toml()).unwrap();
        let mut overlay = parse_toml(minimal_toml()).unwrap();
        overlay.storage.primary = StorageBackend::S3;
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.storage.primary, StorageBackend::S3);
    }

    #[test]
    fn merge_combines_backup_lists_without_duplicates() {
        let mut base = parse_toml(minimal_toml()).unwrap();
        base.storage.backup = vec![StorageBackend::Local];
        let mut overlay = parse_toml(minimal_toml()).unwrap();
        overlay.storage.backup = vec![StorageBackend::Local, StorageBackend::Github];
        let merged = merge_configs(base, overlay);
        assert_eq!(
            merged.storage.backup,
            vec![StorageBackend::Local, StorageBackend::Github]
        );
    }

    #[test]
    fn merge_chain_config_falls_back_to_base() {
        let mut base = parse_toml(minimal_toml()).unwrap();
        base.chain.network = Some("mainnet".to_string());
        let overlay = parse_toml(minimal_toml()).unwrap();
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.chain.network.as_deref(), Some("mainnet"));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Path::new("/nonexistent/governance.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_config_from_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.toml");
        std::fs::write(&path, minimal_toml()).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.release_version, "1.0.0");
    }

    #[test]
    fn config_warning_display_mentions_the_field() {
        let w = ConfigWarning::IncompleteChainConfig { field: "network" };
        assert!(w.to_string().contains("network"));
    }
}
