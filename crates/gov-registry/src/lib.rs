// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool registry with defensive-default policy lookup.
//!
//! A [`ToolDefinition`] only needs to declare the fields where a tool
//! deviates from its [`RiskLevel`]'s defaults; [`ToolRegistry::lookup`]
//! merges the two into a [`ResolvedTool`]. Looking up a name with no
//! registered definition is not an error: it returns the defensive
//! default, the same posture a `Critical`/`Closed` tool would get, so a
//! stale or misspelled tool name fails closed rather than silently
//! inheriting whatever the caller happened to request.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gov_core::{FailMode, OutputSensitivityMode, RiskLevel, Sensitivity};
use gov_glob::PathRuleSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-risk-level policy defaults, applied beneath any tool-specific
/// overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDefaults {
    /// What happens if this tool's policy cannot be evaluated.
    pub fail_mode: FailMode,
    /// Whether calls need a signed approval token before they run.
    pub approval_required: bool,
    /// Whether the tool may make outbound network calls.
    pub egress_allowed: bool,
    /// Sensitivity assigned to the tool's output when nothing else applies.
    pub default_sensitivity: Sensitivity,
    /// Maximum size, in bytes, of any single parameter value.
    pub max_param_bytes: u64,
}

impl RiskDefaults {
    /// The kernel's built-in default policy for a given [`RiskLevel`].
    ///
    /// Risk rises, permission falls: `Low` tools run open by default with a
    /// generous byte budget, `Critical` tools require approval, deny
    /// egress, and fail closed.
    #[must_use]
    pub fn standard(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Low => Self {
                fail_mode: FailMode::Open,
                approval_required: false,
                egress_allowed: true,
                default_sensitivity: Sensitivity::Public,
                max_param_bytes: 1_048_576,
            },
            RiskLevel::Medium => Self {
                fail_mode: FailMode::OpenWithWarning,
                approval_required: false,
                egress_allowed: true,
                default_sensitivity: Sensitivity::Internal,
                max_param_bytes: 262_144,
            },
            RiskLevel::High => Self {
                fail_mode: FailMode::Closed,
                approval_required: true,
                egress_allowed: false,
                default_sensitivity: Sensitivity::Confidential,
                max_param_bytes: 65_536,
            },
            RiskLevel::Critical => Self {
                fail_mode: FailMode::Closed,
                approval_required: true,
                egress_allowed: false,
                default_sensitivity: Sensitivity::Secret,
                max_param_bytes: 0,
            },
        }
    }
}

/// Fields a tool explicitly overrides relative to its risk level's
/// [`RiskDefaults`]. `None` means "inherit the risk-level default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOverrides {
    /// Override for [`RiskDefaults::fail_mode`].
    pub fail_mode: Option<FailMode>,
    /// Override for [`RiskDefaults::approval_required`].
    pub approval_required: Option<bool>,
    /// Override for [`RiskDefaults::egress_allowed`].
    pub egress_allowed: Option<bool>,
    /// Override for [`RiskDefaults::default_sensitivity`].
    pub default_sensitivity: Option<Sensitivity>,
    /// Override for [`RiskDefaults::max_param_bytes`].
    pub max_param_bytes: Option<u64>,
}

/// A tool's registered definition: identity, risk level, and whatever
/// overrides and path/domain policy it layers on top of the risk defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name, as it appears in a tool call.
    pub name: String,
    /// Risk classification driving the default policy.
    pub risk_level: RiskLevel,
    /// Explicit overrides layered on top of `RiskDefaults::standard`.
    #[serde(default)]
    pub overrides: ToolOverrides,
    /// Ordered `(glob pattern, sensitivity)` rules for path-taking
    /// parameters; first match wins.
    #[serde(default)]
    pub path_rules: Vec<(String, Sensitivity)>,
    /// Domains this tool may contact, if it makes network calls.
    #[serde(default)]
    pub domain_allowlist: Vec<String>,
    /// How this tool's output sensitivity is derived once it completes.
    #[serde(default)]
    pub output_sensitivity_mode: OutputSensitivityMode,
    /// If `true`, any call to this tool forces the session taint (and this
    /// call's own output sensitivity) to `Secret`, regardless of
    /// `output_sensitivity_mode`.
    #[serde(default)]
    pub taints_session: bool,
    /// Per-parameter-field byte ceilings, checked in addition to
    /// `max_param_bytes`. `(field name, max bytes)`.
    #[serde(default)]
    pub size_limits: Vec<(String, u64)>,
}

/// The fully merged policy for a tool call: risk defaults with overrides
/// applied, and compiled path rules ready for matching.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    /// Tool name this resolution is for.
    pub name: String,
    /// Risk classification in effect.
    pub risk_level: RiskLevel,
    /// Effective fail mode.
    pub fail_mode: FailMode,
    /// Effective approval requirement.
    pub approval_required: bool,
    /// Effective egress permission.
    pub egress_allowed: bool,
    /// Effective default output sensitivity.
    pub default_sensitivity: Sensitivity,
    /// Effective max parameter size in bytes.
    pub max_param_bytes: u64,
    /// Compiled ordered path rules.
    pub path_rules: PathRuleSet<Sensitivity>,
    /// Domains this tool may contact.
    pub domain_allowlist: Vec<String>,
    /// How this tool's output sensitivity is derived.
    pub output_sensitivity_mode: OutputSensitivityMode,
    /// Whether any call to this tool forces `Secret` sensitivity.
    pub taints_session: bool,
    /// Per-parameter-field byte ceilings.
    pub size_limits: Vec<(String, u64)>,
}

/// Registered tools plus per-risk-level defaults.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    risk_defaults: HashMap<RiskLevel, RiskDefaults>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry seeded with the standard per-risk-level
    /// defaults.
    #[must_use]
    pub fn new() -> Self {
        let risk_defaults = [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ]
        .into_iter()
        .map(|r| (r, RiskDefaults::standard(r)))
        .collect();
        Self {
            tools: HashMap::new(),
            risk_defaults,
        }
    }

    /// Override the built-in defaults for a risk level.
    pub fn set_risk_defaults(&mut self, risk: RiskLevel, defaults: RiskDefaults) {
        self.risk_defaults.insert(risk, defaults);
    }

    /// Register (or replace) a tool's definition.
    pub fn register(&mut self, definition: ToolDefinition) {
        self.tools.insert(definition.name.clone(), definition);
    }

    /// Resolve the effective policy for `tool_name`.
    ///
    /// Never fails: an unregistered name resolves to the defensive default
    /// (`Critical`/`Closed`, approval required, egress denied, `Internal`
    /// sensitivity, zero-byte parameter budget, no path rules).
    #[must_use]
    pub fn lookup(&self, tool_name: &str) -> ResolvedTool {
        match self.tools.get(tool_name) {
            Some(def) => self.resolve(def),
            None => {
                tracing::warn!(tool_name, "tool not found in registry, applying defensive default");
                defensive_default(tool_name)
            }
        }
    }

    fn resolve(&self, def: &ToolDefinition) -> ResolvedTool {
        let base = self
            .risk_defaults
            .get(&def.risk_level)
            .copied()
            .unwrap_or_else(|| RiskDefaults::standard(RiskLevel::Critical));

        let path_rules = PathRuleSet::compile(def.path_rules.clone()).unwrap_or_else(|err| {
            tracing::error!(tool = %def.name, %err, "tool path rules failed to compile, ignoring");
            PathRuleSet::compile(Vec::new()).expect("empty rule set always compiles")
        });

        ResolvedTool {
            name: def.name.clone(),
            risk_level: def.risk_level,
            fail_mode: def.overrides.fail_mode.unwrap_or(base.fail_mode),
            approval_required: def
                .overrides
                .approval_required
                .unwrap_or(base.approval_required),
            egress_allowed: def.overrides.egress_allowed.unwrap_or(base.egress_allowed),
            default_sensitivity: def
                .overrides
                .default_sensitivity
                .unwrap_or(base.default_sensitivity),
            max_param_bytes: def.overrides.max_param_bytes.unwrap_or(base.max_param_bytes),
            path_rules,
            domain_allowlist: def.domain_allowlist.clone(),
            output_sensitivity_mode: def.output_sensitivity_mode,
            taints_session: def.taints_session,
            size_limits: def.size_limits.clone(),
        }
    }

    /// Number of registered tools (not counting the defensive default).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn defensive_default(tool_name: &str) -> ResolvedTool {
    ResolvedTool {
        name: tool_name.to_string(),
        risk_level: RiskLevel::Critical,
        fail_mode: FailMode::Closed,
        approval_required: true,
        egress_allowed: false,
        default_sensitivity: Sensitivity::Internal,
        max_param_bytes: 0,
        path_rules: PathRuleSet::compile(Vec::new()).expect("empty rule set always compiles"),
        domain_allowlist: Vec::new(),
        output_sensitivity_mode: OutputSensitivityMode::Explicit(Sensitivity::Internal),
        taints_session: false,
        size_limits: Vec::new(),
    }
}
