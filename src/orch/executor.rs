//! Plan Executor: validates a [`Plan`], orders its steps topologically, and
//! runs each one, producing the `{tool_results, specialist_results}` pair
//! the Presenter consumes.

use std::collections::{HashMap, HashSet, VecDeque};

use regex::Regex;
use tracing::{warn, Instrument};

use super::connector::LlmConnector;
use super::observability::{FIELD_STEP_ID, FIELD_STEP_TYPE, SPAN_EXECUTE_STEP};
use super::sanity::{SanityChecker, SanityResult};
use super::specialist::{SpecialistBudget, SpecialistVerifier};
use super::tool::{ToolRegistry, ToolResult};
use super::types::{Plan, PlanStep, StepType};
use super::verification::VerificationResult;

/// Unit-bearing substrings that suggest a query needs arithmetic, carried
/// forward from the domain's own query-classification vocabulary.
const CALCULATION_INDICATORS: &[&str] = &[
    "wh", "kwh", "ah", "mah", "voltage", "capacity", "energy", "miles", "km", "mph", "kph",
    "distance", "range", "calculate", "compute", "how many", "how much", "percentage", "%",
    "multiply", "divide", "total",
];

fn battery_pack_shorthand_regex() -> Regex {
    match Regex::new(r"(\d+)\s*[sS]\s*(\d+)\s*[pP]") {
        Ok(re) => re,
        Err(e) => unreachable!("static battery-pack shorthand regex must compile: {e}"),
    }
}

fn capacity_ah_regex() -> Regex {
    match Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*m?ah\b") {
        Ok(re) => re,
        Err(e) => unreachable!("static capacity regex must compile: {e}"),
    }
}

fn voltage_regex() -> Regex {
    match Regex::new(r"(\d+(?:\.\d+)?)\s*[vV]\b") {
        Ok(re) => re,
        Err(e) => unreachable!("static voltage regex must compile: {e}"),
    }
}

/// Whether `query` contains a strong indicator that calculation is required.
fn needs_code_exec_nudge(query: &str) -> bool {
    let lower = query.to_lowercase();
    if CALCULATION_INDICATORS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }
    battery_pack_shorthand_regex().is_match(query)
}

/// Parse a cell capacity out of `query`, converting mAh to Ah.
fn parse_capacity_ah(query: &str) -> Option<f64> {
    let caps = capacity_ah_regex().captures(query)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    if query.to_lowercase().contains("mah") {
        Some(value / 1000.0)
    } else {
        Some(value)
    }
}

/// Parse a cell nominal voltage out of `query`.
fn parse_voltage_v(query: &str) -> Option<f64> {
    let caps = voltage_regex().captures(query)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Build a §7-schema-valid `code_exec` input from the query text: a
/// `"task"` name plus whatever pack-shorthand/capacity/voltage parameters
/// the query itself yields, reusing the same parsing [`needs_code_exec_nudge`]
/// relies on to decide the nudge fires at all. `query` is also carried in
/// `variables` so the tool can re-derive anything this pass misses.
fn build_injected_code_exec_input(query: &str) -> HashMap<String, serde_json::Value> {
    let mut variables = serde_json::Map::new();

    let has_pack_shorthand = if let Some(caps) = battery_pack_shorthand_regex().captures(query) {
        match (
            caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()),
            caps.get(2).and_then(|m| m.as_str().parse::<i64>().ok()),
        ) {
            (Some(series), Some(parallel)) => {
                variables.insert("cells_in_series".to_string(), serde_json::json!(series));
                variables.insert("cells_in_parallel".to_string(), serde_json::json!(parallel));
                true
            }
            _ => false,
        }
    } else {
        false
    };

    if let Some(capacity_ah) = parse_capacity_ah(query) {
        variables.insert("cell_nominal_capacity_ah".to_string(), serde_json::json!(capacity_ah));
    }
    if let Some(voltage_v) = parse_voltage_v(query) {
        variables.insert("cell_nominal_voltage_v".to_string(), serde_json::json!(voltage_v));
    }
    variables.insert("query".to_string(), serde_json::json!(query));

    let task = if has_pack_shorthand {
        "battery_pack_energy"
    } else {
        "generic_math"
    };

    let mut input = HashMap::new();
    input.insert("language".to_string(), serde_json::json!("python"));
    input.insert("mode".to_string(), serde_json::json!("task"));
    input.insert("task".to_string(), serde_json::json!(task));
    input.insert("variables".to_string(), serde_json::Value::Object(variables));
    input
}

/// Insert a `code_exec` step before the terminal finalization step when the
/// query strongly suggests calculation is needed and the plan has none.
///
/// This is validation-time injection (not fabrication): the step's presence
/// is warranted by the query text itself, and its absence would otherwise
/// silently skip arithmetic the Analyzer should have planned for.
fn inject_code_exec_if_needed(plan: &mut Plan) {
    if plan.has_code_exec_step() || !needs_code_exec_nudge(&plan.user_query) {
        return;
    }

    let finalize_pos = plan
        .steps
        .iter()
        .position(|s| s.step_type == StepType::Finalization);

    let injected = PlanStep {
        id: "injected_code_exec".to_string(),
        step_type: StepType::ToolCall,
        tool: Some("code_exec".to_string()),
        model: None,
        description: "Calculation nudge injected from query text".to_string(),
        input: build_injected_code_exec_input(&plan.user_query),
        depends_on: Vec::new(),
        required: true,
        can_skip_if_unavailable: false,
    };

    match finalize_pos {
        Some(pos) => plan.steps.insert(pos, injected),
        None => plan.steps.push(injected),
    }
}

/// Why Plan validation rejected a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    DanglingDependency { step_id: String, missing_dep: String },
    DuplicateStepId(String),
    CircularDependency,
    MissingCodeExecInput { step_id: String, field: String, reason: String },
}

impl ValidationFailure {
    fn message(&self) -> String {
        match self {
            Self::DanglingDependency { step_id, missing_dep } => format!(
                "step '{step_id}' depends on unknown step '{missing_dep}'"
            ),
            Self::DuplicateStepId(id) => format!("duplicate step id '{id}'"),
            Self::CircularDependency => "plan contains a circular dependency".to_string(),
            Self::MissingCodeExecInput { step_id, reason, .. } => {
                format!("step '{step_id}': {reason}")
            }
        }
    }
}

/// Enforce the normative `code_exec` input schema: `language`, `mode`, and
/// exactly one of `{task, variables}` (mode="task") or `{code}`
/// (mode="raw_code"). Mirrors `_validate_plan`'s per-field checks.
fn validate_code_exec_input(
    step_id: &str,
    input: &HashMap<String, serde_json::Value>,
) -> Result<(), ValidationFailure> {
    let fail = |field: &str, reason: String| {
        Err(ValidationFailure::MissingCodeExecInput {
            step_id: step_id.to_string(),
            field: field.to_string(),
            reason,
        })
    };

    if !input.contains_key("language") {
        return fail("language", "code_exec missing 'language' field".to_string());
    }

    let Some(mode) = input.get("mode").and_then(|v| v.as_str()) else {
        return fail("mode", "code_exec missing 'mode' field".to_string());
    };

    match mode {
        "task" => {
            if !input.contains_key("task") {
                return fail(
                    "task",
                    "code_exec mode='task' requires 'task' field".to_string(),
                );
            }
        }
        "raw_code" => {
            if !input.contains_key("code") {
                return fail(
                    "code",
                    "code_exec mode='raw_code' requires 'code' field".to_string(),
                );
            }
        }
        other => {
            return fail(
                "mode",
                format!("code_exec mode must be 'task' or 'raw_code', got '{other}'"),
            );
        }
    }

    Ok(())
}

fn validate(plan: &Plan) -> Result<Vec<usize>, ValidationFailure> {
    let mut seen_ids = HashSet::new();
    for step in &plan.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ValidationFailure::DuplicateStepId(step.id.clone()));
        }
    }

    for step in &plan.steps {
        for dep in &step.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                return Err(ValidationFailure::DanglingDependency {
                    step_id: step.id.clone(),
                    missing_dep: dep.clone(),
                });
            }
        }
        if step.step_type == StepType::ToolCall && step.tool.as_deref() == Some("code_exec") {
            validate_code_exec_input(&step.id, &step.input)?;
        }
    }

    topological_order(plan).ok_or(ValidationFailure::CircularDependency)
}

/// Kahn's algorithm with a FIFO queue for stable, insertion-order tie
/// breaking. Returns `None` if the graph has a cycle.
fn topological_order(plan: &Plan) -> Option<Vec<usize>> {
    let n = plan.steps.len();
    let index_of: HashMap<&str, usize> = plan
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, step) in plan.steps.iter().enumerate() {
        in_degree[i] = step.depends_on.len();
        for dep in &step.depends_on {
            if let Some(&dep_idx) = index_of.get(dep.as_str()) {
                dependents[dep_idx].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(n);

    while let Some(i) = queue.pop_front() {
        ordered.push(i);
        for &dep_idx in &dependents[i] {
            in_degree[dep_idx] -= 1;
            if in_degree[dep_idx] == 0 {
                queue.push_back(dep_idx);
            }
        }
    }

    if ordered.len() == n {
        Some(ordered)
    } else {
        None
    }
}

fn validation_error_result(failure: ValidationFailure) -> ToolResult {
    let field = match &failure {
        ValidationFailure::MissingCodeExecInput { field, .. } => Some(field.clone()),
        _ => None,
    };
    let message = failure.message();
    let mut result = ToolResult::failed("validation_error", "plan_executor", message);
    if let Some(field) = field {
        result.data.insert("field".to_string(), serde_json::json!(field));
    }
    result
}

/// Resolve `FROM_<step_id>` references in a step's input against prior
/// results. Unresolved references pass through literally, logged as a
/// warning rather than failing the step.
fn resolve_references(
    input: &HashMap<String, serde_json::Value>,
    tool_results: &HashMap<String, ToolResult>,
) -> HashMap<String, serde_json::Value> {
    input
        .iter()
        .map(|(k, v)| {
            let resolved = match v.as_str() {
                Some(s) if s.starts_with("FROM_") => {
                    let ref_id = &s["FROM_".len()..];
                    match tool_results.get(ref_id) {
                        Some(result) if !result.data.is_empty() => {
                            serde_json::to_value(&result.data).unwrap_or_else(|_| v.clone())
                        }
                        Some(result) => serde_json::to_value(result).unwrap_or_else(|_| v.clone()),
                        None => {
                            warn!(reference = %s, "unresolved FROM_ reference, passing through literally");
                            v.clone()
                        }
                    }
                }
                _ => v.clone(),
            };
            (k.clone(), resolved)
        })
        .collect()
}

fn gather_sanity_context(step: &PlanStep, tool_results: &HashMap<String, ToolResult>) -> String {
    let context_ids = step
        .input
        .get("context_step_ids")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut pieces = Vec::new();
    for id in &context_ids {
        if let Some(result) = tool_results.get(id) {
            if let Some(stdout) = result.data.get("stdout").and_then(|v| v.as_str()) {
                pieces.push(stdout.to_string());
            }
            if let Some(results) = result.data.get("results").and_then(|v| v.as_str()) {
                pieces.push(results.to_string());
            }
        }
    }
    pieces.join("\n")
}

/// Output of running a validated plan to completion.
pub struct ExecutionOutput {
    pub tool_results: HashMap<String, ToolResult>,
    pub specialist_results: HashMap<String, VerificationResult>,
}

/// Runs a [`Plan`]'s steps in dependency order.
pub struct PlanExecutor<'a> {
    tools: &'a ToolRegistry,
    sanity_checker: &'a SanityChecker,
    specialist: &'a SpecialistVerifier<'a>,
    cost: Option<SpecialistBudget<'a>>,
}

impl<'a> PlanExecutor<'a> {
    /// `cost`, when present, gates every specialist invocation through
    /// [`SpecialistVerifier::verify_with_budget`] regardless of which branch
    /// triggers it (sanity escalation or a plain model-call step) — the
    /// budget check is a single gate the executor consults uniformly, not an
    /// exemption carved out per call site.
    pub fn new(
        tools: &'a ToolRegistry,
        sanity_checker: &'a SanityChecker,
        specialist: &'a SpecialistVerifier<'a>,
        cost: Option<SpecialistBudget<'a>>,
    ) -> Self {
        Self {
            tools,
            sanity_checker,
            specialist,
            cost,
        }
    }

    async fn verify_gated(
        &self,
        query: &str,
        plan: &Plan,
        tool_results: &HashMap<String, ToolResult>,
        sanity_result: &SanityResult,
        use_strong: bool,
    ) -> VerificationResult {
        match &self.cost {
            Some(budget) => {
                self.specialist
                    .verify_with_budget(query, plan, tool_results, sanity_result, use_strong, budget)
                    .await
            }
            None => {
                self.specialist
                    .verify(query, plan, tool_results, sanity_result, use_strong)
                    .await
            }
        }
    }

    /// Validate and run `plan`. The `code_exec` injection nudge is applied
    /// to `plan` in place before validation runs.
    pub async fn execute(&self, plan: &mut Plan) -> ExecutionOutput {
        inject_code_exec_if_needed(plan);

        let order = match validate(plan) {
            Ok(order) => order,
            Err(failure) => {
                let mut tool_results = HashMap::new();
                tool_results.insert("validation_error".to_string(), validation_error_result(failure));
                return ExecutionOutput {
                    tool_results,
                    specialist_results: HashMap::new(),
                };
            }
        };

        let mut tool_results: HashMap<String, ToolResult> = HashMap::new();
        let mut specialist_results: HashMap<String, VerificationResult> = HashMap::new();

        for idx in order {
            let step = &plan.steps[idx];
            let step_span = tracing::info_span!(
                "orch.execute_step",
                span = SPAN_EXECUTE_STEP,
                step_id = tracing::field::Empty,
                step_type = tracing::field::Empty,
            );
            step_span.record(FIELD_STEP_ID, step.id.as_str());
            step_span.record(FIELD_STEP_TYPE, format!("{:?}", step.step_type).as_str());
            async {
                match step.step_type {
                    StepType::Finalization => {}
                    StepType::ToolCall => {
                        let result = self.run_tool_step(step, &tool_results).await;
                        tool_results.insert(step.id.clone(), result);
                    }
                    StepType::SanityCheck => {
                        let text = gather_sanity_context(step, &tool_results);
                        let sanity = self.sanity_checker.check_response(&text, &plan.user_query);
                        let suspicious = sanity.suspicious;
                        let should_escalate = sanity.should_escalate();
                        tool_results.insert(step.id.clone(), sanity_to_tool_result(&step.id, &sanity));

                        if suspicious {
                            let use_strong = plan.safety_level.forces_strong_tier() || should_escalate;
                            let verification = self
                                .verify_gated(&plan.user_query, plan, &tool_results, &sanity, use_strong)
                                .await;
                            specialist_results.insert("verification".to_string(), verification);
                        }
                    }
                    StepType::ModelCall => {
                        let use_strong = plan.safety_level.forces_strong_tier();
                        let verification = self
                            .verify_gated(
                                &plan.user_query,
                                plan,
                                &tool_results,
                                &SanityResult::clean(),
                                use_strong,
                            )
                            .await;
                        specialist_results.insert(step.id.clone(), verification);
                    }
                }
            }
            .instrument(step_span)
            .await;
        }

        ExecutionOutput {
            tool_results,
            specialist_results,
        }
    }

    async fn run_tool_step(
        &self,
        step: &PlanStep,
        tool_results: &HashMap<String, ToolResult>,
    ) -> ToolResult {
        let Some(tool_name) = step.tool.as_deref() else {
            return ToolResult::failed(&step.id, "unknown", "tool_call step is missing a tool name");
        };

        let Some(tool) = self.tools.get(tool_name) else {
            return if step.required && !step.can_skip_if_unavailable {
                ToolResult::failed(&step.id, tool_name, format!("tool '{tool_name}' is not registered"))
            } else {
                ToolResult::skipped(&step.id, tool_name, format!("tool '{tool_name}' is not registered"))
            };
        };

        let resolved_input = resolve_references(&step.input, tool_results);
        tool.execute_with_fallback(&step.id, &resolved_input).await
    }
}

fn sanity_to_tool_result(step_id: &str, sanity: &SanityResult) -> ToolResult {
    let mut data = HashMap::new();
    data.insert("suspicious".to_string(), serde_json::json!(sanity.suspicious));
    data.insert("severity".to_string(), serde_json::json!(sanity.severity));
    data.insert("issues".to_string(), serde_json::json!(sanity.issues));
    ToolResult::success(step_id, "sanity_checker", data, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orch::connector::{ConnectorError, FinishReason, GenerateResponse, Message};
    use crate::orch::tool::Tool;
    use crate::orch::types::Source as PlanSource;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoCodeExec;

    #[async_trait]
    impl Tool for EchoCodeExec {
        fn name(&self) -> &str {
            "code_exec"
        }

        async fn execute(
            &self,
            params: &HashMap<String, serde_json::Value>,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            let mut out = HashMap::new();
            out.insert("stdout".to_string(), serde_json::json!("42"));
            out.insert("echo".to_string(), params.get("query").cloned().unwrap_or_default());
            Ok(out)
        }
    }

    struct NullConnector;

    #[async_trait]
    impl LlmConnector for NullConnector {
        fn model_id(&self) -> &str {
            "null"
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _params: &crate::orch::connector::GenerateParams,
        ) -> Result<GenerateResponse, ConnectorError> {
            Ok(GenerateResponse {
                content: "{}".to_string(),
                token_count: crate::orch::connector::TokenCount { input: 1, output: 1 },
                cost: 0.0,
                model_used: "null".to_string(),
                finish_reason: FinishReason::Stop,
                metadata: serde_json::Value::Null,
            })
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _params: &crate::orch::connector::GenerateParams,
        ) -> Result<crate::orch::connector::ChunkStream, ConnectorError> {
            unreachable!("not exercised in these tests")
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn make_executor<'a>(
        tools: &'a ToolRegistry,
        sanity: &'a SanityChecker,
        specialist: &'a SpecialistVerifier<'a>,
    ) -> PlanExecutor<'a> {
        PlanExecutor::new(tools, sanity, specialist, None)
    }

    #[test]
    fn needs_code_exec_nudge_detects_unit_bearing_tokens() {
        assert!(needs_code_exec_nudge("how many kwh does this use"));
        assert!(needs_code_exec_nudge("13S4P pack energy"));
        assert!(!needs_code_exec_nudge("what is your name"));
    }

    #[tokio::test]
    async fn circular_dependency_yields_validation_error_and_no_execution() {
        let mut plan = Plan::fallback("x", PlanSource::Api);
        plan.steps = vec![
            PlanStep {
                id: "a".to_string(),
                step_type: StepType::ToolCall,
                tool: Some("code_exec".to_string()),
                model: None,
                description: String::new(),
                input: HashMap::from([
                    ("language".to_string(), serde_json::json!("python")),
                    ("mode".to_string(), serde_json::json!("task")),
                    ("task".to_string(), serde_json::json!("generic_math")),
                ]),
                depends_on: vec!["b".to_string()],
                required: true,
                can_skip_if_unavailable: false,
            },
            PlanStep {
                id: "b".to_string(),
                step_type: StepType::ToolCall,
                tool: Some("code_exec".to_string()),
                model: None,
                description: String::new(),
                input: HashMap::from([
                    ("language".to_string(), serde_json::json!("python")),
                    ("mode".to_string(), serde_json::json!("task")),
                    ("task".to_string(), serde_json::json!("generic_math")),
                ]),
                depends_on: vec!["a".to_string()],
                required: true,
                can_skip_if_unavailable: false,
            },
        ];

        let tools = ToolRegistry::new();
        let sanity = SanityChecker::empty();
        let specialist = SpecialistVerifier::new(None, None);
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        assert_eq!(output.tool_results.len(), 1);
        assert!(output.tool_results.contains_key("validation_error"));
        assert!(!output.tool_results["validation_error"].is_success());
    }

    #[tokio::test]
    async fn dangling_reference_passes_through_literally_and_continues() {
        let mut plan = Plan::fallback("13S4P pack", PlanSource::Api);
        plan.steps = vec![
            PlanStep {
                id: "s2".to_string(),
                step_type: StepType::ToolCall,
                tool: Some("code_exec".to_string()),
                model: None,
                description: String::new(),
                input: HashMap::from([
                    ("language".to_string(), serde_json::json!("python")),
                    ("mode".to_string(), serde_json::json!("task")),
                    ("task".to_string(), serde_json::json!("generic_math")),
                    ("x".to_string(), serde_json::json!("FROM_s999")),
                ]),
                depends_on: Vec::new(),
                required: true,
                can_skip_if_unavailable: false,
            },
            PlanStep {
                id: "finalize".to_string(),
                step_type: StepType::Finalization,
                tool: None,
                model: None,
                description: String::new(),
                input: HashMap::new(),
                depends_on: vec!["s2".to_string()],
                required: true,
                can_skip_if_unavailable: false,
            },
        ];

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoCodeExec));
        let sanity = SanityChecker::empty();
        let specialist = SpecialistVerifier::new(None, None);
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        let result = &output.tool_results["s2"];
        assert!(result.is_success());
        assert_eq!(result.data.get("echo"), Some(&serde_json::json!("FROM_s999")));
    }

    #[tokio::test]
    async fn missing_required_tool_fails_step() {
        let mut plan = Plan::fallback("x", PlanSource::Api);
        plan.steps = vec![PlanStep::tool_call("s1", "nonexistent_tool")];

        let tools = ToolRegistry::new();
        let sanity = SanityChecker::empty();
        let specialist = SpecialistVerifier::new(None, None);
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        assert!(!output.tool_results["s1"].is_success());
    }

    #[tokio::test]
    async fn skippable_missing_tool_is_skipped_not_failed() {
        let mut plan = Plan::fallback("x", PlanSource::Api);
        let mut step = PlanStep::tool_call("s1", "nonexistent_tool");
        step.can_skip_if_unavailable = true;
        plan.steps = vec![step];

        let tools = ToolRegistry::new();
        let sanity = SanityChecker::empty();
        let specialist = SpecialistVerifier::new(None, None);
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        assert_eq!(
            output.tool_results["s1"].outcome,
            crate::orch::tool::ToolOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn code_exec_nudge_is_injected_before_finalization() {
        let mut plan = Plan::fallback("how many kwh in a 13S4P pack", PlanSource::Api);
        assert!(!plan.has_code_exec_step());

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoCodeExec));
        let sanity = SanityChecker::empty();
        let specialist = SpecialistVerifier::new(None, None);
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        assert!(plan.has_code_exec_step());
        assert!(output.tool_results.contains_key("injected_code_exec"));

        let injected = plan
            .steps
            .iter()
            .find(|s| s.id == "injected_code_exec")
            .expect("injected step present");
        assert_eq!(injected.input.get("language"), Some(&serde_json::json!("python")));
        assert_eq!(injected.input.get("mode"), Some(&serde_json::json!("task")));
        assert_eq!(
            injected.input.get("task"),
            Some(&serde_json::json!("battery_pack_energy"))
        );
        let variables = injected.input.get("variables").and_then(|v| v.as_object()).unwrap();
        assert_eq!(variables.get("cells_in_series"), Some(&serde_json::json!(13)));
        assert_eq!(variables.get("cells_in_parallel"), Some(&serde_json::json!(4)));
    }

    #[tokio::test]
    async fn suspicious_sanity_triggers_specialist_escalation() {
        let mut plan = Plan::fallback("What's the capacity of Samsung 50E 21700?", PlanSource::Api);
        plan.steps = vec![
            PlanStep {
                id: "calc".to_string(),
                step_type: StepType::ToolCall,
                tool: Some("code_exec".to_string()),
                model: None,
                description: String::new(),
                input: HashMap::from([
                    ("language".to_string(), serde_json::json!("python")),
                    ("mode".to_string(), serde_json::json!("task")),
                    ("task".to_string(), serde_json::json!("generic_math")),
                    ("query".to_string(), serde_json::json!("capacity")),
                ]),
                depends_on: Vec::new(),
                required: true,
                can_skip_if_unavailable: false,
            },
            PlanStep {
                id: "sanity".to_string(),
                step_type: StepType::SanityCheck,
                tool: None,
                model: None,
                description: String::new(),
                input: HashMap::from([(
                    "context_step_ids".to_string(),
                    serde_json::json!(["calc"]),
                )]),
                depends_on: vec!["calc".to_string()],
                required: true,
                can_skip_if_unavailable: false,
            },
        ];

        struct ImplausibleCodeExec;
        #[async_trait]
        impl Tool for ImplausibleCodeExec {
            fn name(&self) -> &str {
                "code_exec"
            }
            async fn execute(
                &self,
                _params: &HashMap<String, serde_json::Value>,
            ) -> Result<HashMap<String, serde_json::Value>, String> {
                let mut out = HashMap::new();
                out.insert("stdout".to_string(), serde_json::json!("capacity is 25Ah"));
                Ok(out)
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ImplausibleCodeExec));
        let sanity = SanityChecker::default_rules();
        let strong_connector = NullConnector;
        let specialist = SpecialistVerifier::new(None, Some(&strong_connector));
        let executor = make_executor(&tools, &sanity, &specialist);

        let output = executor.execute(&mut plan).await;
        assert!(output.specialist_results.contains_key("verification"));
    }

    #[tokio::test]
    async fn cost_gate_blocks_specialist_call_at_hard_cap_regardless_of_trigger() {
        use crate::orch::cost::{CostLimit, CostRecord, CostTracker};

        let mut plan = Plan::fallback("What's the capacity of Samsung 50E 21700?", PlanSource::Api);
        plan.steps = vec![
            PlanStep {
                id: "calc".to_string(),
                step_type: StepType::ToolCall,
                tool: Some("code_exec".to_string()),
                model: None,
                description: String::new(),
                input: HashMap::from([
                    ("language".to_string(), serde_json::json!("python")),
                    ("mode".to_string(), serde_json::json!("task")),
                    ("task".to_string(), serde_json::json!("generic_math")),
                    ("query".to_string(), serde_json::json!("capacity")),
                ]),
                depends_on: Vec::new(),
                required: true,
                can_skip_if_unavailable: false,
            },
            PlanStep {
                id: "sanity".to_string(),
                step_type: StepType::SanityCheck,
                tool: None,
                model: None,
                description: String::new(),
                input: HashMap::from([("context_step_ids".to_string(), serde_json::json!(["calc"]))]),
                depends_on: vec!["calc".to_string()],
                required: true,
                can_skip_if_unavailable: false,
            },
        ];

        struct ImplausibleCodeExec;
        #[async_trait]
        impl Tool for ImplausibleCodeExec {
            fn name(&self) -> &str {
                "code_exec"
            }
            async fn execute(
                &self,
                _params: &HashMap<String, serde_json::Value>,
            ) -> Result<HashMap<String, serde_json::Value>, String> {
                let mut out = HashMap::new();
                out.insert("stdout".to_string(), serde_json::json!("capacity is 25Ah"));
                Ok(out)
            }
        }

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ImplausibleCodeExec));
        let sanity = SanityChecker::default_rules();
        let strong_connector = NullConnector;
        let specialist = SpecialistVerifier::new(None, Some(&strong_connector));

        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.5,
            hard_cap_usd: 1.0,
        });
        tracker.track(CostRecord {
            query_id: "q0".to_string(),
            session_id: "s1".to_string(),
            model_id: "strong".to_string(),
            input_tokens: 1000,
            output_tokens: 1000,
            cost_usd: 1.0,
            timestamp: chrono::Utc::now(),
        });
        let budget = SpecialistBudget {
            tracker: &tracker,
            session_id: "s1",
            query_id: "q1",
        };
        let executor = PlanExecutor::new(&tools, &sanity, &specialist, Some(budget));

        let output = executor.execute(&mut plan).await;
        let verification = &output.specialist_results["verification"];
        assert!(verification.is_error());
        assert_eq!(
            verification.error.clone().unwrap_or_else(|| unreachable!()).error_type,
            "cost_blocked"
        );
    }

    #[test]
    fn topological_order_respects_dependencies_with_fifo_ties() {
        let plan = Plan {
            plan_id: "p".to_string(),
            version: "1".to_string(),
            user_query: "x".to_string(),
            source: PlanSource::Api,
            intent: "x".to_string(),
            complexity: Default::default(),
            priority: Default::default(),
            safety_level: Default::default(),
            budget: Default::default(),
            capabilities: Vec::new(),
            steps: vec![
                PlanStep::tool_call("a", "t"),
                PlanStep::tool_call("b", "t"),
                PlanStep {
                    depends_on: vec!["a".to_string(), "b".to_string()],
                    ..PlanStep::tool_call("c", "t")
                },
            ],
        };
        let order = topological_order(&plan).unwrap_or_else(|| unreachable!());
        assert_eq!(order, vec![0, 1, 2]);
    }
}
