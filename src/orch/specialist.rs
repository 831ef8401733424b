//! Specialist Verifier: an external-model cross-check over tool results,
//! routed to a `fast` or `strong` connector slot by the caller.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{warn, Instrument};

use super::connector::{GenerateParams, GenerateResponse, LlmConnector, Message};
use super::cost::{calculate_cost, ConnectorPricing, CostRecord, CostTracker};
use super::json_extract::extract_json;
use super::observability::{FIELD_TIER, SPAN_SPECIALIST_VERIFY};
use super::sanity::SanityResult;
use super::tool::ToolResult;
use super::types::{Plan, SafetyLevel};
use super::verification::{
    Confidence, ConfidenceLevel, Issue, PackCalculation, RangeEstimate, Source, TrustLevel,
    VerificationError, VerificationResult, VerifiedSpecs,
};

const SPECIALIST_TEMPERATURE: f64 = 0.2;
const SPECIALIST_MAX_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = r#"You are a verification specialist. Given a query, its execution plan, \
accumulated tool results, and a sanity-check result, verify the specifications and calculations \
involved and respond with JSON only, matching this shape:
{
  "verified_specs": {"cell_type": "...", "nominal_voltage_v": 0.0, "nominal_capacity_ah": 0.0,
                      "allowed_capacity_range_ah": {"min": 0.0, "max": 0.0},
                      "sources": [{"label": "...", "url": "...", "type": "...", "trust_level": "low|medium|high"}]},
  "pack_calculation": {"series_cells": 0, "parallel_cells": 0, "pack_nominal_voltage_v": 0.0,
                        "pack_total_ah": 0.0, "pack_total_wh": 0.0, "pack_total_kwh": 0.0},
  "range_estimate": {"usable_wh": 0.0, "runtime_hours": 0.0, "ideal_range_miles": 0.0, "realistic_range_miles": 0.0},
  "issues": [{"field": "...", "problem": "...", "severity": "info|warning|error"}],
  "confidence": {"overall": "low|medium|high", "specs": "low|medium|high", "math": "low|medium|high", "range": "low|medium|high"}
}
Omit verified_specs/pack_calculation/range_estimate if not applicable to this query."#;

/// Payload sent to the specialist connector: everything it needs to verify
/// the in-flight query, serialized as-is into the request body.
#[derive(Debug, serde::Serialize)]
struct SpecialistTask<'a> {
    task: &'static str,
    query: &'a str,
    plan: &'a Plan,
    tool_results: &'a HashMap<String, ToolResult>,
    sanity_result: &'a SanityResult,
}

#[derive(Debug, Deserialize, Default)]
struct RawVerifiedSpecs {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    nominal_voltage_v: f64,
    #[serde(default)]
    nominal_capacity_ah: f64,
    #[serde(default)]
    allowed_capacity_range_ah: HashMap<String, f64>,
    #[serde(default)]
    sources: Vec<RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    label: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "type", default)]
    source_type: String,
    #[serde(default)]
    trust_level: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfidence {
    #[serde(default)]
    overall: String,
    #[serde(default)]
    specs: String,
    #[serde(default)]
    math: String,
    #[serde(default)]
    range: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawVerification {
    #[serde(default)]
    verified_specs: Option<RawVerifiedSpecs>,
    #[serde(default)]
    pack_calculation: Option<PackCalculation>,
    #[serde(default)]
    range_estimate: Option<RangeEstimate>,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    confidence: RawConfidence,
}

/// Coerce a freshly-parsed raw response into a typed [`VerificationResult`].
///
/// `trust_level` is coerced per-source independently. `confidence`'s four
/// sub-fields are coerced as a single unit: any one unrecognized value
/// defaults all four to medium together, matching the asymmetric behavior
/// this verifier is modeled on.
fn coerce_verification(raw: RawVerification) -> VerificationResult {
    let verified_specs = raw.verified_specs.map(|vs| VerifiedSpecs {
        cell_type: vs.cell_type,
        nominal_voltage_v: vs.nominal_voltage_v,
        nominal_capacity_ah: vs.nominal_capacity_ah,
        allowed_capacity_range_ah: vs.allowed_capacity_range_ah,
        sources: vs
            .sources
            .into_iter()
            .map(|s| Source {
                label: s.label,
                url: s.url,
                source_type: s.source_type,
                trust_level: s.trust_level.parse::<TrustLevel>().unwrap_or_default(),
            })
            .collect(),
    });

    let parsed = [
        raw.confidence.overall.parse::<ConfidenceLevel>(),
        raw.confidence.specs.parse::<ConfidenceLevel>(),
        raw.confidence.math.parse::<ConfidenceLevel>(),
        raw.confidence.range.parse::<ConfidenceLevel>(),
    ];
    let confidence = if let [Ok(overall), Ok(specs), Ok(math), Ok(range)] = parsed {
        Confidence {
            overall,
            specs,
            math,
            range,
        }
    } else {
        Confidence::default()
    };

    VerificationResult {
        verified_specs,
        pack_calculation: raw.pack_calculation,
        range_estimate: raw.range_estimate,
        issues: raw.issues,
        confidence,
        error: None,
    }
}

/// The cost-tracking context a caller supplies to
/// [`SpecialistVerifier::verify_with_budget`]: which tracker to consult,
/// which session/query to charge, and (implicitly, via the verifier's own
/// pricing fields) what a call in either tier is expected to cost.
pub struct SpecialistBudget<'a> {
    pub tracker: &'a CostTracker,
    pub session_id: &'a str,
    pub query_id: &'a str,
}

/// Consults a `fast` or `strong` connector to cross-check tool output.
pub struct SpecialistVerifier<'a> {
    fast: Option<&'a dyn LlmConnector>,
    strong: Option<&'a dyn LlmConnector>,
    fast_pricing: Option<ConnectorPricing>,
    strong_pricing: Option<ConnectorPricing>,
}

impl<'a> SpecialistVerifier<'a> {
    pub fn new(fast: Option<&'a dyn LlmConnector>, strong: Option<&'a dyn LlmConnector>) -> Self {
        Self {
            fast,
            strong,
            fast_pricing: None,
            strong_pricing: None,
        }
    }

    /// Attach per-1k pricing for the `fast` tier, enabling cost estimation in
    /// [`Self::verify_with_budget`].
    pub fn with_fast_pricing(mut self, pricing: ConnectorPricing) -> Self {
        self.fast_pricing = Some(pricing);
        self
    }

    /// Attach per-1k pricing for the `strong` tier.
    pub fn with_strong_pricing(mut self, pricing: ConnectorPricing) -> Self {
        self.strong_pricing = Some(pricing);
        self
    }

    pub async fn verify(
        &self,
        query: &str,
        plan: &Plan,
        tool_results: &HashMap<String, ToolResult>,
        sanity_result: &SanityResult,
        use_strong: bool,
    ) -> VerificationResult {
        let connector = if use_strong { self.strong } else { self.fast };
        let Some(connector) = connector else {
            return VerificationResult::with_error(VerificationError::no_connector());
        };
        self.call(connector, query, plan, tool_results, sanity_result, use_strong).await.0
    }

    /// As [`Self::verify`], but first consults `budget.tracker` and denies the
    /// call with `error.type = cost_blocked` when the session's projected
    /// spend would exceed the tracker's hard cap. On a call that returns a
    /// priced response, the actual (connector-reported) cost is recorded
    /// against `budget.session_id` regardless of whether the response parsed
    /// into a usable payload.
    pub async fn verify_with_budget(
        &self,
        query: &str,
        plan: &Plan,
        tool_results: &HashMap<String, ToolResult>,
        sanity_result: &SanityResult,
        use_strong: bool,
        budget: &SpecialistBudget<'_>,
    ) -> VerificationResult {
        let connector = if use_strong { self.strong } else { self.fast };
        let Some(connector) = connector else {
            return VerificationResult::with_error(VerificationError::no_connector());
        };

        let pricing = if use_strong { self.strong_pricing } else { self.fast_pricing };
        let estimated_cost_usd = pricing
            .map(|p| {
                calculate_cost(
                    u64::from(SPECIALIST_MAX_TOKENS),
                    u64::from(SPECIALIST_MAX_TOKENS),
                    p.price_in_per_1k,
                    p.price_out_per_1k,
                )
            })
            .unwrap_or(0.0);
        let is_critical = plan.safety_level == SafetyLevel::Critical;

        let verdict = budget.tracker.can_proceed(budget.session_id, estimated_cost_usd, is_critical);
        if !verdict.allowed {
            warn!(
                session = budget.session_id,
                reason = ?verdict.reason,
                "specialist call denied: cost tracker hard cap reached"
            );
            return VerificationResult::with_error(VerificationError::cost_blocked());
        }

        let (result, response) =
            self.call(connector, query, plan, tool_results, sanity_result, use_strong).await;
        if let Some(response) = response {
            budget.tracker.track(CostRecord {
                query_id: budget.query_id.to_string(),
                session_id: budget.session_id.to_string(),
                model_id: response.model_used,
                input_tokens: response.token_count.input,
                output_tokens: response.token_count.output,
                cost_usd: response.cost,
                timestamp: Utc::now(),
            });
        }
        result
    }

    /// Shared connector call + three-tier parse, used by both [`Self::verify`]
    /// and [`Self::verify_with_budget`].
    ///
    /// Returns `(result, None)` for every failure mode (`no_connector` never
    /// reaches here; connector error, parse failure, or schema mismatch) —
    /// per the cost-accounting decision, none of those produce a billable
    /// `CostRecord`, only a call that coerces cleanly into a
    /// [`VerificationResult`] does.
    async fn call(
        &self,
        connector: &dyn LlmConnector,
        query: &str,
        plan: &Plan,
        tool_results: &HashMap<String, ToolResult>,
        sanity_result: &SanityResult,
        use_strong: bool,
    ) -> (VerificationResult, Option<GenerateResponse>) {
        let tier = if use_strong { "strong" } else { "fast" };
        let span = tracing::info_span!(
            "orch.specialist_verify",
            span = SPAN_SPECIALIST_VERIFY,
            tier = tracing::field::Empty,
        );
        span.record(FIELD_TIER, tier);
        self.call_inner(connector, query, plan, tool_results, sanity_result)
            .instrument(span)
            .await
    }

    async fn call_inner(
        &self,
        connector: &dyn LlmConnector,
        query: &str,
        plan: &Plan,
        tool_results: &HashMap<String, ToolResult>,
        sanity_result: &SanityResult,
    ) -> (VerificationResult, Option<GenerateResponse>) {
        let task = SpecialistTask {
            task: "verify_plan_results",
            query,
            plan,
            tool_results,
            sanity_result,
        };
        let payload = match serde_json::to_string(&task) {
            Ok(p) => p,
            Err(err) => {
                return (
                    VerificationResult::with_error(VerificationError::exception(err.to_string())),
                    None,
                )
            }
        };

        let messages = [Message::system(SYSTEM_PROMPT), Message::user(payload)];
        let params = GenerateParams::new(SPECIALIST_TEMPERATURE, SPECIALIST_MAX_TOKENS).json_mode();

        let response = match connector.generate(&messages, &params).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "specialist connector call failed");
                return (
                    VerificationResult::with_error(VerificationError::exception(err.to_string())),
                    None,
                );
            }
        };

        let Some(value) = extract_json(&response.content) else {
            warn!("specialist response had no extractable JSON");
            return (VerificationResult::with_error(VerificationError::parse_error()), None);
        };

        match serde_json::from_value::<RawVerification>(value) {
            Ok(raw) => (coerce_verification(raw), Some(response)),
            Err(err) => {
                warn!(error = %err, "specialist JSON did not match verification schema");
                (VerificationResult::with_error(VerificationError::parse_error()), None)
            }
        }
    }
}
