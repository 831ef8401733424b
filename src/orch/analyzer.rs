//! Plan Analyzer: turns a user query into a [`Plan`] via a single local-tier
//! connector call, with three-tier JSON recovery and a safe fallback plan
//! when the model's output cannot be coerced into one.

use serde::Deserialize;
use tracing::warn;

use super::connector::{GenerateParams, LlmConnector, Message};
use super::json_extract::extract_json;
use super::types::{Budget, ComplexityLevel, Plan, PlanStep, Priority, SafetyLevel, Source, StepType};

const ANALYZER_TEMPERATURE: f64 = 0.3;
const ANALYZER_MAX_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = r#"You are a query planner. Given a user query, produce a JSON Plan with this shape:
{
  "intent": "short description of what the user wants",
  "complexity": "simple" | "moderate" | "complex",
  "priority": "low" | "normal" | "high",
  "safety_level": "normal" | "high" | "critical",
  "capabilities": ["web_search", "code_exec", "rag", "sentiment"],
  "steps": [
    {
      "id": "string, unique within this plan",
      "type": "tool_call" | "sanity_check" | "model_call" | "finalization",
      "tool": "string, required for tool_call",
      "model": "string, required for model_call",
      "description": "string",
      "input": {},
      "depends_on": ["other step ids"],
      "required": true,
      "can_skip_if_unavailable": false
    }
  ]
}
Respond with JSON only. Every plan must end with exactly one "finalization" step."#;

/// Raw shape of the Analyzer's JSON response, before enum coercion. Using a
/// loosely-typed intermediate struct (strings instead of the final enums)
/// lets us coerce unknown values to safe defaults instead of failing the
/// whole parse on one bad field.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    complexity: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    safety_level: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "type", default)]
    step_type: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default = "default_true")]
    required: bool,
    #[serde(default)]
    can_skip_if_unavailable: bool,
}

fn default_true() -> bool {
    true
}

/// Coerce a raw, loosely-parsed plan into a well-typed [`Plan`]. Unknown
/// enum values fall back to safe defaults rather than failing the plan.
fn coerce_plan(raw: RawPlan, query_text: &str, source: Source) -> Plan {
    if raw.steps.is_empty() {
        return Plan::fallback(query_text, source);
    }

    let steps = raw
        .steps
        .into_iter()
        .map(|s| PlanStep {
            id: s.id,
            step_type: s.step_type.parse::<StepType>().unwrap_or_default(),
            tool: s.tool,
            model: s.model,
            description: s.description,
            input: s.input,
            depends_on: s.depends_on,
            required: s.required,
            can_skip_if_unavailable: s.can_skip_if_unavailable,
        })
        .collect();

    Plan {
        plan_id: uuid::Uuid::new_v4().to_string(),
        version: "1.0".to_string(),
        user_query: query_text.to_string(),
        source,
        intent: if raw.intent.is_empty() {
            "answer_query".to_string()
        } else {
            raw.intent
        },
        complexity: raw.complexity.parse::<ComplexityLevel>().unwrap_or_default(),
        priority: raw.priority.parse::<Priority>().unwrap_or_default(),
        safety_level: raw.safety_level.parse::<SafetyLevel>().unwrap_or_default(),
        budget: Budget::default(),
        capabilities: raw.capabilities,
        steps,
    }
}

/// Produces a [`Plan`] from a query by consulting the local connector.
pub struct PlanAnalyzer<'a> {
    local: &'a dyn LlmConnector,
}

impl<'a> PlanAnalyzer<'a> {
    pub fn new(local: &'a dyn LlmConnector) -> Self {
        Self { local }
    }

    pub async fn analyze(&self, query_text: &str, source: Source) -> Plan {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(query_text),
        ];
        let params = GenerateParams::new(ANALYZER_TEMPERATURE, ANALYZER_MAX_TOKENS).json_mode();

        let response = match self.local.generate(&messages, &params).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "analyzer connector call failed, using fallback plan");
                return Plan::fallback(query_text, source);
            }
        };

        let Some(value) = extract_json(&response.content) else {
            warn!("analyzer response had no extractable JSON, using fallback plan");
            return Plan::fallback(query_text, source);
        };

        match serde_json::from_value::<RawPlan>(value) {
            Ok(raw) => coerce_plan(raw, query_text, source),
            Err(err) => {
                warn!(error = %err, "analyzer JSON did not match plan schema, using fallback plan");
                Plan::fallback(query_text, source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orch::connector::{ConnectorError, FinishReason, GenerateResponse, TokenCount};
    use async_trait::async_trait;

    struct ScriptedConnector {
        content: String,
    }

    #[async_trait]
    impl LlmConnector for ScriptedConnector {
        fn model_id(&self) -> &str {
            "local-test"
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _params: &GenerateParams,
        ) -> Result<GenerateResponse, ConnectorError> {
            Ok(GenerateResponse {
                content: self.content.clone(),
                token_count: TokenCount { input: 5, output: 5 },
                cost: 0.0,
                model_used: "local-test".to_string(),
                finish_reason: FinishReason::Stop,
                metadata: serde_json::Value::Null,
            })
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _params: &GenerateParams,
        ) -> Result<super::super::connector::ChunkStream, ConnectorError> {
            unreachable!("analyzer never streams")
        }

        async fn health(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn well_formed_plan_parses_cleanly() {
        let connector = ScriptedConnector {
            content: r#"{
                "intent": "calculate pack energy",
                "complexity": "moderate",
                "priority": "normal",
                "safety_level": "normal",
                "capabilities": ["code_exec"],
                "steps": [
                    {"id": "calc", "type": "tool_call", "tool": "code_exec", "description": "compute", "depends_on": []},
                    {"id": "finalize", "type": "finalization", "depends_on": ["calc"]}
                ]
            }"#
            .to_string(),
        };
        let analyzer = PlanAnalyzer::new(&connector);
        let plan = analyzer.analyze("13S4P pack energy", Source::Api).await;
        assert_eq!(plan.intent, "calculate pack energy");
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.has_code_exec_step());
    }

    #[tokio::test]
    async fn unknown_enum_values_coerce_to_safe_defaults() {
        let connector = ScriptedConnector {
            content: r#"{
                "intent": "x",
                "complexity": "super-duper-complex",
                "safety_level": "yolo",
                "steps": [{"id": "finalize", "type": "finalization"}]
            }"#
            .to_string(),
        };
        let analyzer = PlanAnalyzer::new(&connector);
        let plan = analyzer.analyze("hi", Source::Api).await;
        assert_eq!(plan.complexity, ComplexityLevel::Moderate);
        assert_eq!(plan.safety_level, SafetyLevel::Normal);
    }

    #[tokio::test]
    async fn unparseable_response_yields_fallback_plan() {
        let connector = ScriptedConnector {
            content: "I'm not sure how to plan that.".to_string(),
        };
        let analyzer = PlanAnalyzer::new(&connector);
        let plan = analyzer.analyze("what is the meaning of life", Source::Api).await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::Finalization);
    }

    #[tokio::test]
    async fn fenced_json_block_is_recovered() {
        let connector = ScriptedConnector {
            content: "Here's the plan:\n```json\n{\"intent\": \"greet\", \"steps\": [{\"id\": \"finalize\", \"type\": \"finalization\"}]}\n```".to_string(),
        };
        let analyzer = PlanAnalyzer::new(&connector);
        let plan = analyzer.analyze("hello", Source::Api).await;
        assert_eq!(plan.intent, "greet");
    }
}
