//! Core data model: [`Plan`], [`PlanStep`], and their enums.
//!
//! Mirrors the entity layout that the Analyzer documents to the local model
//! and that the Specialist Verifier and Executor consume as a wire format:
//! every enum serializes as a lowercase string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a query originated. Purely informational; never alters routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cli,
    Api,
}

impl Default for Source {
    fn default() -> Self {
        Self::Api
    }
}

/// Declared complexity of a query, as classified by the Analyzer.
///
/// This is an output of analysis, not an input that gates it — the
/// Analyzer must never refuse or downgrade a query based on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl std::str::FromStr for ComplexityLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "moderate" => Ok(Self::Moderate),
            "complex" => Ok(Self::Complex),
            _ => Err(()),
        }
    }
}

/// Query priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Safety level. `Normal` routes verification to the fast specialist tier;
/// anything else routes to the strong tier (see [`crate::orch::specialist`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    #[default]
    Normal,
    High,
    Critical,
}

impl std::str::FromStr for SafetyLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(()),
        }
    }
}

impl SafetyLevel {
    /// Whether this safety level alone forces strong-tier specialist routing.
    pub fn forces_strong_tier(self) -> bool {
        self != Self::Normal
    }
}

/// Desired latency/cost tradeoff for a Plan's external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LatencyTier {
    Fast,
    #[default]
    Balanced,
    Thorough,
}

/// Per-plan spend and latency budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum USD this plan may spend on external (specialist) calls.
    pub max_external_usd: f64,
    /// Desired latency/cost tradeoff.
    pub latency_tier: LatencyTier,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_external_usd: 0.03,
            latency_tier: LatencyTier::Balanced,
        }
    }
}

/// The kind of work a [`PlanStep`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    ToolCall,
    SanityCheck,
    ModelCall,
    Finalization,
}

impl std::str::FromStr for StepType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool_call" => Ok(Self::ToolCall),
            "sanity_check" => Ok(Self::SanityCheck),
            "model_call" => Ok(Self::ModelCall),
            "finalization" => Ok(Self::Finalization),
            _ => Err(()),
        }
    }
}

/// A single node in a [`Plan`]'s dependency DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Plan-unique identifier.
    pub id: String,
    /// What kind of work this step performs.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Tool name. Required when `step_type == ToolCall`.
    #[serde(default)]
    pub tool: Option<String>,
    /// Model tag. Required when `step_type == ModelCall`.
    #[serde(default)]
    pub model: Option<String>,
    /// Free-form human-readable description.
    #[serde(default)]
    pub description: String,
    /// Typed input mapping, consumed by the tool or specialist this step invokes.
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    /// Sibling step ids that must complete before this step starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether a missing tool/model for this step is a hard failure.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Whether a missing tool is tolerated by skipping rather than failing.
    #[serde(default)]
    pub can_skip_if_unavailable: bool,
}

fn default_true() -> bool {
    true
}

impl PlanStep {
    /// A minimal tool-call step, for building plans and fallback steps by hand.
    pub fn tool_call(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: StepType::ToolCall,
            tool: Some(tool.into()),
            model: None,
            description: String::new(),
            input: HashMap::new(),
            depends_on: Vec::new(),
            required: true,
            can_skip_if_unavailable: false,
        }
    }
}

/// A typed execution plan produced by the Plan Analyzer from a user query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub version: String,
    pub user_query: String,
    #[serde(default)]
    pub source: Source,
    pub intent: String,
    #[serde(default)]
    pub complexity: ComplexityLevel,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub safety_level: SafetyLevel,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Create the fallback single-finalization-step plan used when the
    /// Analyzer's output cannot be parsed or coerced into a valid Plan.
    pub fn fallback(query_text: &str, source: Source) -> Self {
        let mut input = HashMap::new();
        input.insert(
            "query".to_string(),
            serde_json::Value::String(query_text.to_string()),
        );
        Self {
            plan_id: Uuid::new_v4().to_string(),
            version: "1.0".to_string(),
            user_query: query_text.to_string(),
            source,
            intent: "answer_query".to_string(),
            complexity: ComplexityLevel::Simple,
            priority: Priority::Normal,
            safety_level: SafetyLevel::Normal,
            budget: Budget::default(),
            capabilities: Vec::new(),
            steps: vec![PlanStep {
                id: "finalize".to_string(),
                step_type: StepType::Finalization,
                tool: None,
                model: Some("local".to_string()),
                description: "Answer query directly".to_string(),
                input,
                depends_on: Vec::new(),
                required: true,
                can_skip_if_unavailable: false,
            }],
        }
    }

    /// Whether any step in this plan is a `code_exec` tool call.
    pub fn has_code_exec_step(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.step_type == StepType::ToolCall && s.tool.as_deref() == Some("code_exec"))
    }
}
