//! Presenter input/output types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::tool::ToolResult;
use super::types::Plan;
use super::verification::VerificationResult;

/// A single prior-turn message, threaded through to the Presenter even
/// though it never originates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Everything the Presenter needs to synthesize a grounded final answer.
///
/// `conversation_history` defaults to empty and must not change Presenter
/// behavior when empty — it exists so "introduces no numbers not present in
/// the inputs" can be judged against the full input set when prior turns
/// are supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationInput {
    pub query_text: String,
    pub plan: Plan,
    pub tool_results: HashMap<String, ToolResult>,
    pub specialist_results: HashMap<String, VerificationResult>,
    #[serde(default)]
    pub style_profile: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

/// The final, user-facing output of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationOutput {
    pub final_answer: String,
    pub short_summary: String,
    pub citations_used: Vec<i64>,
    #[serde(default)]
    pub debug: serde_json::Value,
}

impl FinalizationOutput {
    /// The user-visible apology used when an unrecoverable internal error
    /// occurs. `debug` carries the tagged error detail; `final_answer` is
    /// never empty.
    pub fn apology(debug_detail: impl Into<String>) -> Self {
        Self {
            final_answer: "I encountered an issue processing your request.".to_string(),
            short_summary: "An error occurred while processing the request.".to_string(),
            citations_used: Vec::new(),
            debug: serde_json::json!({ "error": debug_detail.into() }),
        }
    }
}
