//! Orchestrator configuration: a layered, serde + `toml` config following
//! this codebase's established convention — typed nested structs with
//! `#[serde(default)]`, a `Default` impl carrying the values this crate's
//! design names, and secret-bearing fields resolved through
//! [`crate::credentials`] rather than stored as plaintext.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::cost::{ConnectorPricing, CostLimit};
use super::error::{OrchError, Result};
use super::sanity::{RuleCategory, SanityChecker, SanityRule};
use crate::credentials::CredentialRef;

/// A single named connector role's binding (`local`, `fast`, or `strong` —
/// see §4.2): which provider/model to call, how to authenticate, and (for
/// the specialist tiers) the per-1k pricing used to estimate a call's cost
/// before it is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub provider: String,
    pub model: String,
    pub api_key: CredentialRef,
    pub pricing: Option<ConnectorPricing>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            api_key: CredentialRef::None,
            pricing: None,
        }
    }
}

impl ConnectorConfig {
    /// A role with no provider named is treated as unconfigured: the
    /// Orchestrator will leave that slot's connector as `None` rather than
    /// attempt to build a binding from an empty provider string.
    pub fn is_configured(&self) -> bool {
        !self.provider.is_empty()
    }
}

/// The three named connector roles bound at Orchestrator construction.
/// Deliberately explicit rather than inferred from a model-name substring
/// (e.g. `"grok"`/`"claude"`) — see the design ledger for why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorsConfig {
    pub local: ConnectorConfig,
    pub fast: ConnectorConfig,
    pub strong: ConnectorConfig,
}

/// A single tool registry entry: whether `name` is enabled, mirroring the
/// tool-mode-gating convention already used elsewhere in this codebase for
/// capability toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enabled: HashMap<String, bool>,
}

impl ToolsConfig {
    pub fn is_enabled(&self, tool_name: &str) -> bool {
        self.enabled.get(tool_name).copied().unwrap_or(true)
    }
}

/// One sanity rule as TOML represents it — the same shape as
/// [`super::sanity::SanityRule`] minus the compiled `Regex`, which is built
/// from `extractor_pattern` when the table is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanityRuleSpec {
    pub name: String,
    pub trigger_keywords: Vec<String>,
    pub extractor_pattern: String,
    pub min: f64,
    pub max: f64,
    pub hard: bool,
    pub message_template: String,
}

/// The sanity rule table. Ships with the battery-pack starter set (§4.4) as
/// its `Default`, but an empty table is valid: the Sanity Checker then
/// simply never escalates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    pub rules: Vec<SanityRuleSpec>,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl SanityConfig {
    /// An explicitly empty table, distinct from `Default` — callers who want
    /// the core's no-domain-rules mode reach for this rather than clearing
    /// the default table by hand.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The battery-pack starter table carried forward from §4.4, expressed
    /// as data so callers can start from it and extend or override rows.
    pub fn default_rules() -> Self {
        Self {
            rules: vec![
                SanityRuleSpec {
                    name: "cell_nominal_voltage".to_string(),
                    trigger_keywords: vec!["voltage".to_string(), "nominal voltage".to_string(), " v ".to_string()],
                    extractor_pattern: r"(\d+(?:\.\d+)?)\s*v\b".to_string(),
                    min: 2.5,
                    max: 4.3,
                    hard: false,
                    message_template:
                        "Claimed cell nominal voltage {value}V is outside the plausible 2.5-4.3V range for common lithium cell chemistries"
                            .to_string(),
                },
                SanityRuleSpec {
                    name: "cell_nominal_capacity_ah".to_string(),
                    trigger_keywords: vec![
                        "21700".to_string(),
                        "18650".to_string(),
                        "capacity".to_string(),
                        "ah".to_string(),
                        "cell".to_string(),
                    ],
                    extractor_pattern: r"(\d+(?:\.\d+)?)\s*ah\b".to_string(),
                    min: 0.5,
                    max: 6.0,
                    hard: true,
                    message_template:
                        "Claimed cell capacity {value}Ah is implausible for a single cylindrical cell (expected roughly 0.5-6.0Ah)"
                            .to_string(),
                },
                SanityRuleSpec {
                    name: "pack_total_energy_kwh".to_string(),
                    trigger_keywords: vec!["pack".to_string(), "kwh".to_string(), "total energy".to_string()],
                    extractor_pattern: r"(\d+(?:\.\d+)?)\s*kwh\b".to_string(),
                    min: 0.01,
                    max: 200.0,
                    hard: false,
                    message_template:
                        "Claimed pack energy {value}kWh is outside the plausible range for a hobbyist/EV battery pack"
                            .to_string(),
                },
            ],
        }
    }

    /// Compile this table into a runtime [`SanityChecker`]. An empty table
    /// yields a checker that functions but never escalates, per §4.4's
    /// explicit invariant.
    pub fn build(&self) -> Result<SanityChecker> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for spec in &self.rules {
            let extractor = Regex::new(&spec.extractor_pattern).map_err(|e| {
                OrchError::Config(format!(
                    "sanity rule '{}' has an invalid extractor pattern: {e}",
                    spec.name
                ))
            })?;
            rules.push(SanityRule {
                name: spec.name.clone(),
                trigger_keywords: spec.trigger_keywords.clone(),
                extractor,
                min: spec.min,
                max: spec.max,
                category: if spec.hard { RuleCategory::Hard } else { RuleCategory::Soft },
                message_template: spec.message_template.clone(),
            });
        }
        Ok(SanityChecker::new(rules))
    }
}

/// Top-level Orchestrator configuration, loaded from and saved to TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub cost: CostLimit,
    pub connectors: ConnectorsConfig,
    pub tools: ToolsConfig,
    pub sanity: SanityConfig,
}

impl OrchestratorConfig {
    /// Load from a TOML file at `path`.
    ///
    /// # Errors
    /// Returns [`OrchError::Config`] if the file cannot be read or does not
    /// parse as valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OrchError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| OrchError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Serialize and write this config to `path` as TOML.
    ///
    /// # Errors
    /// Returns [`OrchError::Config`] if serialization or the write fails.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| OrchError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)
            .map_err(|e| OrchError::Config(format!("failed to write {}: {e}", path.display())))
    }
}
