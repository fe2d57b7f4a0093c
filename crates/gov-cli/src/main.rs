// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gov_cli::commands::{self, SchemaKind};
use gov_cli::format::{Formatter, OutputFormat};
use gov_vault::KeyRole;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors and failed verifications alike.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "govctl", version, about = "Governance-enforcement kernel CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Output format for artifact dumps: text, json, json-pretty, or compact.
    #[arg(long, global = true, default_value = "text")]
    format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new signing key for one of the kernel's isolated roles.
    Keygen {
        /// Role the new key is for.
        #[arg(value_enum)]
        role: RoleArg,

        /// Path to the vault file (created if it doesn't exist).
        #[arg(long, default_value = "vault.json")]
        vault: PathBuf,

        /// Environment variable holding the vault passphrase.
        #[arg(long, default_value = "GOV_VAULT_PASSPHRASE")]
        passphrase_env: String,
    },

    /// Build, sign, and write a release manifest for a governance tree.
    ReleaseBuild {
        /// Root of the governance tree to snapshot.
        #[arg(long)]
        governance_dir: PathBuf,

        /// Release version tag, e.g. `1.4.0`.
        #[arg(long)]
        release_version: String,

        /// Path to the vault holding the release signing key.
        #[arg(long, default_value = "vault.json")]
        vault: PathBuf,

        /// Environment variable holding the vault passphrase.
        #[arg(long, default_value = "GOV_VAULT_PASSPHRASE")]
        passphrase_env: String,

        /// Where to write the signed manifest.
        #[arg(long, default_value = "release.json")]
        out: PathBuf,
    },

    /// Verify a release manifest against the governance tree on disk.
    ReleaseVerify {
        /// Path to the signed manifest.
        #[arg(long)]
        manifest: PathBuf,

        /// Root of the governance tree to check the manifest against.
        #[arg(long)]
        governance_dir: PathBuf,
    },

    /// Validate a tool registry document and print each tool's resolved
    /// policy.
    RegistryCheck {
        /// Path to a JSON array of tool definitions.
        #[arg()]
        file: PathBuf,
    },

    /// Verify every hash link and signature in a receipt ledger's committed
    /// chain.
    LedgerVerifyChain {
        /// Path to the ledger's WAL file.
        #[arg()]
        file: PathBuf,
    },

    /// Load and validate a governance configuration file.
    ConfigCheck {
        /// Path to the TOML configuration file.
        #[arg()]
        file: PathBuf,
    },

    /// Print a JSON schema to stdout.
    Schema {
        /// Which schema to print.
        #[arg(value_enum)]
        kind: SchemaArg,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum RoleArg {
    Release,
    Approver,
    Receipt,
}

impl From<RoleArg> for KeyRole {
    fn from(v: RoleArg) -> Self {
        match v {
            RoleArg::Release => KeyRole::Release,
            RoleArg::Approver => KeyRole::Approver,
            RoleArg::Receipt => KeyRole::Receipt,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum SchemaArg {
    Config,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("gov=debug")
    } else {
        EnvFilter::new("gov=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let format: OutputFormat = match cli.format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    };

    let result = match cli.command {
        Commands::Keygen {
            role,
            vault,
            passphrase_env,
        } => cmd_keygen(role, &vault, &passphrase_env),
        Commands::ReleaseBuild {
            governance_dir,
            release_version,
            vault,
            passphrase_env,
            out,
        } => cmd_release_build(
            &governance_dir,
            &release_version,
            &vault,
            &passphrase_env,
            &out,
            &format,
        ),
        Commands::ReleaseVerify {
            manifest,
            governance_dir,
        } => cmd_release_verify(&manifest, &governance_dir, &format),
        Commands::RegistryCheck { file } => cmd_registry_check(&file),
        Commands::LedgerVerifyChain { file } => cmd_ledger_verify_chain(&file, &format),
        Commands::ConfigCheck { file } => cmd_config_check(&file),
        Commands::Schema { kind } => cmd_schema(kind),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn read_passphrase(env_var: &str) -> Result<String> {
    std::env::var(env_var).with_context(|| format!("environment variable '{env_var}' is not set"))
}

fn cmd_keygen(role: RoleArg, vault: &std::path::Path, passphrase_env: &str) -> Result<()> {
    let passphrase = read_passphrase(passphrase_env)?;
    let address = commands::keygen(vault, role.into(), &passphrase)?;
    println!("address: {address}");
    Ok(())
}

fn cmd_release_build(
    governance_dir: &std::path::Path,
    release_version: &str,
    vault: &std::path::Path,
    passphrase_env: &str,
    out: &std::path::Path,
    format: &OutputFormat,
) -> Result<()> {
    let passphrase = read_passphrase(passphrase_env)?;
    let manifest = commands::release_build(governance_dir, release_version, vault, &passphrase, out)?;
    let formatter = Formatter::new(format.clone());
    println!("{}", formatter.format_manifest(&manifest));
    eprintln!("manifest written to {}", out.display());
    Ok(())
}

fn cmd_release_verify(
    manifest: &std::path::Path,
    governance_dir: &std::path::Path,
    format: &OutputFormat,
) -> Result<()> {
    match commands::release_verify(manifest, governance_dir) {
        Ok(m) => {
            let formatter = Formatter::new(format.clone());
            println!("{}", formatter.format_manifest(&m));
            println!("VALID");
            Ok(())
        }
        Err(e) => {
            eprintln!("INVALID: {e:#}");
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

fn cmd_registry_check(file: &std::path::Path) -> Result<()> {
    let lines = commands::registry_check(file)?;
    for line in &lines {
        println!("{line}");
    }
    if lines.iter().any(|l| l.starts_with("warning:")) {
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
    Ok(())
}

fn cmd_ledger_verify_chain(file: &std::path::Path, format: &OutputFormat) -> Result<()> {
    let faults = commands::ledger_verify_chain(file)?;
    let formatter = Formatter::new(format.clone());
    println!("{}", formatter.format_chain_faults(&faults));
    if !faults.is_empty() {
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
    Ok(())
}

fn cmd_config_check(file: &std::path::Path) -> Result<()> {
    let diags = commands::config_check(file)?;
    let has_error = diags.iter().any(|d| d.starts_with("error:"));
    for d in &diags {
        println!("{d}");
    }
    if has_error {
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
    Ok(())
}

fn cmd_schema(kind: SchemaArg) -> Result<()> {
    let sk = match kind {
        SchemaArg::Config => SchemaKind::Config,
    };
    let json = commands::schema_json(sk)?;
    println!("{json}");
    Ok(())
}
