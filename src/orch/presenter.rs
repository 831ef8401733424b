//! Presenter: synthesizes the final prose answer and citation list from a
//! query's plan, tool results, and specialist results via a single local
//! connector call.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use super::connector::{ChunkStream, ConnectorError, GenerateParams, LlmConnector, Message};
use super::finalization::{FinalizationInput, FinalizationOutput};
use super::json_extract::extract_json;
use super::tool::ToolResult;
use super::verification::VerificationResult;

const PRESENTER_TEMPERATURE: f64 = 0.5;
const PRESENTER_MAX_TOKENS: u32 = 1536;

const SYSTEM_PROMPT: &str = r#"You are a presenter. You are given a query, a plan, tool results, \
specialist verification results, a citation map, and any prior conversation turns. Produce a final \
answer grounded strictly in this data: invent no numbers or facts not present in the inputs. \
Respond with JSON only: {"final_answer": "...", "short_summary": "...", "citations_used": [1, 2]}."#;

const STREAM_SYSTEM_PROMPT: &str = r#"You are a presenter. You are given a query, a plan, tool \
results, specialist verification results, a citation map, and any prior conversation turns. Write \
the final answer as plain prose grounded strictly in this data: invent no numbers or facts not \
present in the inputs. Do not wrap the answer in JSON."#;

/// One entry in the citation map built from tool/specialist results.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Citation {
    pub id: i64,
    pub title: String,
    pub url: String,
}

/// Walk `tool_results`' `citations` arrays first, then each specialist
/// result's verified-source array, assigning ids from a single
/// monotonically increasing counter starting at 1.
pub fn build_citation_map(
    tool_results: &HashMap<String, ToolResult>,
    specialist_results: &HashMap<String, VerificationResult>,
) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut next_id = 1i64;

    let mut tool_ids: Vec<&String> = tool_results.keys().collect();
    tool_ids.sort();
    for id in tool_ids {
        let result = &tool_results[id];
        let Some(entries) = result.data.get("citations").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in entries {
            let title = entry.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let url = entry.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string();
            citations.push(Citation { id: next_id, title, url });
            next_id += 1;
        }
    }

    let mut specialist_ids: Vec<&String> = specialist_results.keys().collect();
    specialist_ids.sort();
    for id in specialist_ids {
        let Some(specs) = &specialist_results[id].verified_specs else {
            continue;
        };
        for source in &specs.sources {
            citations.push(Citation {
                id: next_id,
                title: source.label.clone(),
                url: source.url.clone(),
            });
            next_id += 1;
        }
    }

    citations
}

#[derive(Debug, Deserialize)]
struct RawFinalization {
    #[serde(default)]
    final_answer: String,
    #[serde(default)]
    short_summary: String,
    #[serde(default)]
    citations_used: Vec<i64>,
}

/// Concatenate successful tool `stdout` fields and failed specialist error
/// messages into a best-effort answer, used only when structured parsing of
/// the presenter's response fails entirely.
fn fallback_answer(
    tool_results: &HashMap<String, ToolResult>,
    specialist_results: &HashMap<String, VerificationResult>,
) -> String {
    let mut parts = Vec::new();

    let mut tool_ids: Vec<&String> = tool_results.keys().collect();
    tool_ids.sort();
    for id in tool_ids {
        let result = &tool_results[id];
        if result.is_success() {
            if let Some(stdout) = result.data.get("stdout").and_then(|v| v.as_str()) {
                parts.push(stdout.to_string());
            }
        }
    }

    let mut specialist_ids: Vec<&String> = specialist_results.keys().collect();
    specialist_ids.sort();
    for id in specialist_ids {
        if let Some(error) = &specialist_results[id].error {
            parts.push(error.message.clone());
        }
    }

    if parts.is_empty() {
        "I encountered an issue processing your request.".to_string()
    } else {
        parts.join(" ")
    }
}

/// Produces a [`FinalizationOutput`] from accumulated plan execution state.
pub struct Presenter<'a> {
    local: &'a dyn LlmConnector,
}

impl<'a> Presenter<'a> {
    pub fn new(local: &'a dyn LlmConnector) -> Self {
        Self { local }
    }

    pub async fn present(&self, input: &FinalizationInput) -> FinalizationOutput {
        let citation_map = build_citation_map(&input.tool_results, &input.specialist_results);

        let payload = serde_json::json!({
            "query": input.query_text,
            "plan": input.plan,
            "tool_results": input.tool_results,
            "specialist_results": input.specialist_results,
            "style_profile": input.style_profile,
            "conversation_history": input.conversation_history,
            "citation_map": citation_map,
        });
        let payload_str = serde_json::to_string(&payload).unwrap_or_default();

        let messages = [Message::system(SYSTEM_PROMPT), Message::user(payload_str)];
        let params = GenerateParams::new(PRESENTER_TEMPERATURE, PRESENTER_MAX_TOKENS).json_mode();

        let response = match self.local.generate(&messages, &params).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "presenter connector call failed, using fallback answer");
                return FinalizationOutput {
                    final_answer: fallback_answer(&input.tool_results, &input.specialist_results),
                    short_summary: String::new(),
                    citations_used: Vec::new(),
                    debug: serde_json::json!({"fallback": true, "reason": "connector_error"}),
                };
            }
        };

        let Some(value) = extract_json(&response.content) else {
            warn!("presenter response had no extractable JSON, using fallback answer");
            return FinalizationOutput {
                final_answer: fallback_answer(&input.tool_results, &input.specialist_results),
                short_summary: String::new(),
                citations_used: Vec::new(),
                debug: serde_json::json!({"fallback": true, "reason": "no_json"}),
            };
        };

        match serde_json::from_value::<RawFinalization>(value) {
            Ok(raw) if !raw.final_answer.is_empty() => FinalizationOutput {
                final_answer: raw.final_answer,
                short_summary: raw.short_summary,
                citations_used: raw.citations_used,
                debug: serde_json::Value::Null,
            },
            _ => {
                warn!("presenter JSON missing final_answer, using fallback answer");
                FinalizationOutput {
                    final_answer: fallback_answer(&input.tool_results, &input.specialist_results),
                    short_summary: String::new(),
                    citations_used: Vec::new(),
                    debug: serde_json::json!({"fallback": true, "reason": "empty_final_answer"}),
                }
            }
        }
    }

    /// As [`Self::present`], but streams the final prose token-by-token
    /// instead of completing as a single parsed JSON value.
    ///
    /// The streaming path asks for plain prose rather than JSON: a client
    /// consuming chunks as they arrive has no use for a `final_answer` field
    /// it cannot parse until the last chunk lands, so this intentionally
    /// forgoes `citations_used`/`short_summary` in exchange for prose that
    /// reads correctly chunk by chunk. Callers that need citations alongside
    /// streamed prose should call [`build_citation_map`] themselves from the
    /// same `input`.
    pub async fn present_stream(&self, input: &FinalizationInput) -> Result<ChunkStream, ConnectorError> {
        let citation_map = build_citation_map(&input.tool_results, &input.specialist_results);

        let payload = serde_json::json!({
            "query": input.query_text,
            "plan": input.plan,
            "tool_results": input.tool_results,
            "specialist_results": input.specialist_results,
            "style_profile": input.style_profile,
            "conversation_history": input.conversation_history,
            "citation_map": citation_map,
        });
        let payload_str = serde_json::to_string(&payload).unwrap_or_default();

        let messages = [Message::system(STREAM_SYSTEM_PROMPT), Message::user(payload_str)];
        let params = GenerateParams::new(PRESENTER_TEMPERATURE, PRESENTER_MAX_TOKENS);

        self.local.stream(&messages, &params).await
    }
}
