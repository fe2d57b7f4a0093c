// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared command implementations for the governance CLI.
//!
//! These functions are library-level so they can be tested without
//! spawning the binary.

use anyhow::{Context, Result};
use gov_ledger::{ChainFault, Receipt, ReceiptLedger};
use gov_registry::{ToolDefinition, ToolRegistry};
use gov_release::ReleaseManifest;
use gov_vault::{KeyRole, KeyVault};
use schemars::schema_for;
use std::path::Path;

/// Load a [`KeyVault`] from `path`, or return a fresh empty one if the file
/// doesn't exist yet.
pub fn load_vault(path: &Path) -> Result<KeyVault> {
    if !path.exists() {
        return Ok(KeyVault::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read vault file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse vault file '{}'", path.display()))
}

/// Persist `vault` to `path` as pretty JSON.
pub fn save_vault(vault: &KeyVault, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create vault directory '{}'", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(vault)?)
        .with_context(|| format!("write vault file '{}'", path.display()))
}

/// Generate a new key for `role` in the vault at `vault_path`, creating the
/// vault file if it doesn't yet exist.
///
/// Returns the new key's public address as lowercase hex.
pub fn keygen(vault_path: &Path, role: KeyRole, passphrase: &str) -> Result<String> {
    let mut vault = load_vault(vault_path)?;
    let address = vault
        .generate(role, passphrase)
        .with_context(|| format!("generate key for role {role}"))?;
    save_vault(&vault, vault_path)?;
    tracing::info!(%role, %address, vault = %vault_path.display(), "generated key");
    Ok(address)
}

/// Build, sign, and write a release manifest for the governance tree rooted
/// at `governance_dir`.
pub fn release_build(
    governance_dir: &Path,
    release_version: &str,
    vault_path: &Path,
    passphrase: &str,
    out: &Path,
) -> Result<ReleaseManifest> {
    let vault = load_vault(vault_path)?;
    let mut manifest = gov_release::build_release(governance_dir, release_version)
        .context("build release manifest")?;
    gov_release::sign_release(&mut manifest, &vault, passphrase).context("sign release manifest")?;

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create manifest directory '{}'", parent.display()))?;
    }
    std::fs::write(out, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("write manifest to '{}'", out.display()))?;

    tracing::info!(
        version = %manifest.release_version,
        root_hash = %manifest.root_hash,
        files = manifest.files.len(),
        "built release manifest"
    );
    Ok(manifest)
}

/// Load a release manifest from `manifest_path` and verify it against the
/// governance tree rooted at `governance_dir`.
pub fn release_verify(manifest_path: &Path, governance_dir: &Path) -> Result<ReleaseManifest> {
    let content = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("read manifest '{}'", manifest_path.display()))?;
    let manifest: ReleaseManifest = serde_json::from_str(&content)
        .with_context(|| format!("parse manifest '{}'", manifest_path.display()))?;
    match gov_release::verify_release(&manifest, governance_dir) {
        Ok(()) => {
            tracing::info!(version = %manifest.release_version, "release verified");
            Ok(manifest)
        }
        Err(e) => {
            tracing::warn!(version = %manifest.release_version, error = %e, "release verification failed");
            Err(e).context("verify release")
        }
    }
}

/// Load a JSON array of [`ToolDefinition`]s from `path`, register each in a
/// fresh [`ToolRegistry`], and return a human-readable summary line per
/// tool's resolved policy. Also reports definitions that share a name,
/// since the later one silently wins at lookup time.
pub fn registry_check(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read registry file '{}'", path.display()))?;
    let definitions: Vec<ToolDefinition> = serde_json::from_str(&content)
        .with_context(|| format!("parse tool definitions from '{}'", path.display()))?;

    let mut seen = std::collections::HashSet::new();
    let mut lines = Vec::new();
    let mut registry = ToolRegistry::new();

    for def in &definitions {
        if !seen.insert(def.name.clone()) {
            lines.push(format!(
                "warning: duplicate tool definition '{}', only the last registered wins",
                def.name
            ));
        }
        registry.register(def.clone());
    }

    for name in &seen {
        let resolved = registry.lookup(name);
        lines.push(format!(
            "{name}: risk={:?} approval_required={} egress_allowed={} default_sensitivity={:?} max_param_bytes={}",
            resolved.risk_level,
            resolved.approval_required,
            resolved.egress_allowed,
            resolved.default_sensitivity,
            resolved.max_param_bytes,
        ));
    }
    lines.sort();
    Ok(lines)
}

/// Open the ledger WAL at `path`, verify the committed chain, and return
/// every fault found (empty means the chain is intact).
pub fn ledger_verify_chain(path: &Path) -> Result<Vec<ChainFault>> {
    let ledger = ReceiptLedger::open(Some(path.to_path_buf()))
        .with_context(|| format!("open ledger WAL '{}'", path.display()))?;
    let receipts: Vec<Receipt> = ledger.committed().into_iter().cloned().collect();
    let faults = gov_ledger::verify_chain(&receipts);
    if !faults.is_empty() {
        tracing::warn!(count = faults.len(), "ledger chain faults detected");
    }
    Ok(faults)
}

/// Load and validate a governance configuration file.
///
/// Returns a list of human-readable diagnostic messages (errors and
/// warnings); an empty list never happens since a clean load always reports
/// at least one "ok" line.
pub fn config_check(path: &Path) -> Result<Vec<String>> {
    let mut diagnostics = Vec::new();

    let config = match gov_config::load_config(path) {
        Ok(c) => c,
        Err(e) => {
            diagnostics.push(format!("error: {e}"));
            return Ok(diagnostics);
        }
    };

    match gov_config::validate_config(&config) {
        Ok(warnings) => {
            diagnostics.push("config: ok".to_string());
            for w in warnings {
                diagnostics.push(format!("warning: {w}"));
            }
        }
        Err(e) => diagnostics.push(format!("error: {e}")),
    }

    Ok(diagnostics)
}

/// Schema kinds the `schema` subcommand can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`gov_config::GovernanceConfig`].
    Config,
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::Config => serde_json::to_value(schema_for!(gov_config::GovernanceConfig))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_core::RiskLevel;
    use gov_ledger::ReceiptBuilder;

    fn write_definitions(dir: &tempfile::TempDir, defs: &[ToolDefinition]) -> std::path::PathBuf {
        let path = dir.path().join("tools.json");
        std::fs::write(&path, serde_json::to_string_pretty(defs).unwrap()).unwrap();
        path
    }

    #[test]
    fn keygen_creates_a_vault_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("vault.json");
        let address = keygen(&vault_path, KeyRole::Release, "pw").unwrap();
        assert!(!address.is_empty());
        assert!(vault_path.exists());

        let vault = load_vault(&vault_path).unwrap();
        assert_eq!(vault.address(KeyRole::Release), Some(address));
    }

    #[test]
    fn keygen_twice_for_same_role_fails() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("vault.json");
        keygen(&vault_path, KeyRole::Release, "pw").unwrap();
        assert!(keygen(&vault_path, KeyRole::Release, "pw").is_err());
    }

    #[test]
    fn release_build_then_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let governance_dir = dir.path().join("governance");
        std::fs::create_dir_all(governance_dir.join("tools")).unwrap();
        std::fs::write(governance_dir.join("tools/read_file.md"), "# read_file").unwrap();

        let vault_path = dir.path().join("vault.json");
        keygen(&vault_path, KeyRole::Release, "pw").unwrap();

        let manifest_path = dir.path().join("release.json");
        let manifest = release_build(
            &governance_dir,
            "1.0.0",
            &vault_path,
            "pw",
            &manifest_path,
        )
        .unwrap();
        assert_eq!(manifest.release_version, "1.0.0");
        assert!(manifest_path.exists());

        let verified = release_verify(&manifest_path, &governance_dir).unwrap();
        assert_eq!(verified.root_hash, manifest.root_hash);
    }

    #[test]
    fn release_verify_rejects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let governance_dir = dir.path().join("governance");
        std::fs::create_dir_all(governance_dir.join("tools")).unwrap();
        std::fs::write(governance_dir.join("tools/read_file.md"), "# read_file").unwrap();

        let vault_path = dir.path().join("vault.json");
        keygen(&vault_path, KeyRole::Release, "pw").unwrap();

        let manifest_path = dir.path().join("release.json");
        release_build(&governance_dir, "1.0.0", &vault_path, "pw", &manifest_path).unwrap();

        std::fs::write(governance_dir.join("tools/read_file.md"), "# tampered").unwrap();

        assert!(release_verify(&manifest_path, &governance_dir).is_err());
    }

    #[test]
    fn registry_check_reports_resolved_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_definitions(
            &dir,
            &[ToolDefinition {
                name: "read_file".to_string(),
                risk_level: RiskLevel::Low,
                ..Default::default()
            }],
        );
        let lines = registry_check(&path).unwrap();
        assert!(lines.iter().any(|l| l.starts_with("read_file:")));
    }

    #[test]
    fn registry_check_flags_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_definitions(
            &dir,
            &[
                ToolDefinition {
                    name: "read_file".to_string(),
                    risk_level: RiskLevel::Low,
                    ..Default::default()
                },
                ToolDefinition {
                    name: "read_file".to_string(),
                    risk_level: RiskLevel::Critical,
                    ..Default::default()
                },
            ],
        );
        let lines = registry_check(&path).unwrap();
        assert!(lines.iter().any(|l| l.contains("duplicate")));
    }

    #[test]
    fn ledger_verify_chain_reports_no_faults_for_intact_chain() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("ledger.jsonl");
        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Receipt, "pw").unwrap();

        let mut ledger = ReceiptLedger::open(Some(wal_path.clone())).unwrap();
        let r1 = ReceiptBuilder::new("s1", 0, "read_file", "0xa", "0xr")
            .sign(&vault, "pw", None)
            .unwrap();
        ledger.append_pending(r1.clone()).unwrap();
        ledger.commit(&r1.receipt_hash).unwrap();
        drop(ledger);

        let faults = ledger_verify_chain(&wal_path).unwrap();
        assert!(faults.is_empty());
    }

    #[test]
    fn ledger_verify_chain_detects_broken_link() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("ledger.jsonl");
        let mut vault = KeyVault::new();
        vault.generate(KeyRole::Receipt, "pw").unwrap();

        let mut ledger = ReceiptLedger::open(Some(wal_path.clone())).unwrap();
        let r1 = ReceiptBuilder::new("s1", 0, "read_file", "0xa", "0xr")
            .sign(&vault, "pw", None)
            .unwrap();
        ledger.append_pending(r1.clone()).unwrap();
        ledger.commit(&r1.receipt_hash).unwrap();

        let r2 = ReceiptBuilder::new("s1", 1, "read_file", "0xb", "0xr")
            .sign(&vault, "pw", Some("0xwrongprev".to_string()))
            .unwrap();
        ledger.append_pending(r2.clone()).unwrap();
        ledger.commit(&r2.receipt_hash).unwrap();
        drop(ledger);

        let faults = ledger_verify_chain(&wal_path).unwrap();
        assert!(!faults.is_empty());
    }

    #[test]
    fn config_check_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [toml =").unwrap();
        let diags = config_check(&path).unwrap();
        assert!(diags.iter().any(|d| d.starts_with("error:")));
    }

    #[test]
    fn config_check_accepts_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.toml");
        std::fs::write(
            &path,
            "governance_dir = \"/var/lib/governance\"\nrelease_version = \"1.0.0\"\n",
        )
        .unwrap();
        let diags = config_check(&path).unwrap();
        assert!(diags.iter().any(|d| d.contains("ok")));
    }

    #[test]
    fn schema_config_is_valid_json() {
        let s = schema_json(SchemaKind::Config).unwrap();
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert!(v.get("properties").is_some() || v.get("$defs").is_some());
    }
}
