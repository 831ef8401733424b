//! Orchestrator Facade: ties the Plan Analyzer, Plan Executor, and Presenter
//! together for a single query, owning the Cost Tracker and the named
//! connector/tool registries for the process's lifetime.
//!
//! Each of the three stages this facade drives is already infallible in the
//! sense that matters here — none of them propagate a Rust `Err` out of a
//! query, they resolve every failure mode into plain data (a fallback Plan,
//! a failed `ToolResult`, an apologetic `FinalizationOutput`). The facade
//! adds no additional fallibility of its own; `process_query` always
//! completes with a non-empty `final_answer`.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::analyzer::PlanAnalyzer;
use super::connector::{ChunkStream, LlmConnector};
use super::cost::{ConnectorPricing, CostLimit, CostSummary, CostTracker};
use super::executor::{ExecutionOutput, PlanExecutor};
use super::finalization::{FinalizationInput, FinalizationOutput};
use super::observability::{
    FIELD_QUERY_ID, FIELD_SESSION_ID, FIELD_SOURCE, SPAN_ANALYZE, SPAN_PRESENT, SPAN_PROCESS_QUERY,
};
use super::presenter::Presenter;
use super::sanity::SanityChecker;
use super::specialist::{SpecialistBudget, SpecialistVerifier};
use super::tool::ToolRegistry;
use super::types::{Plan, Source};

/// A caller-supplied conversation session: at minimum an id, and optionally
/// a per-session spend ceiling.
///
/// `cost_limit` is carried for forward compatibility with a per-session cap
/// but is not independently enforced today — the shared [`CostTracker`] the
/// Orchestrator is constructed with already enforces a single process-wide
/// [`CostLimit`] per session id, which is the mechanism this type's
/// `cost_limit` field would otherwise duplicate.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub cost_limit: Option<f64>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cost_limit: None,
        }
    }
}

/// Liveness snapshot returned by [`Orchestrator::health`].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct HealthStatus {
    pub local: bool,
    pub tools: bool,
    pub externals: bool,
}

/// The named connector roles an Orchestrator is built from: `local` drives
/// the Analyzer and Presenter, `fast`/`strong` feed the Specialist Verifier.
/// Bound explicitly at construction rather than inferred from a model-name
/// substring (see the design ledger for why).
pub struct ConnectorBindings {
    pub local: Arc<dyn LlmConnector>,
    pub fast: Option<Arc<dyn LlmConnector>>,
    pub strong: Option<Arc<dyn LlmConnector>>,
    pub fast_pricing: Option<ConnectorPricing>,
    pub strong_pricing: Option<ConnectorPricing>,
}

impl ConnectorBindings {
    pub fn new(local: Arc<dyn LlmConnector>) -> Self {
        Self {
            local,
            fast: None,
            strong: None,
            fast_pricing: None,
            strong_pricing: None,
        }
    }

    pub fn with_fast(mut self, connector: Arc<dyn LlmConnector>, pricing: Option<ConnectorPricing>) -> Self {
        self.fast = Some(connector);
        self.fast_pricing = pricing;
        self
    }

    pub fn with_strong(mut self, connector: Arc<dyn LlmConnector>, pricing: Option<ConnectorPricing>) -> Self {
        self.strong = Some(connector);
        self.strong_pricing = pricing;
        self
    }
}

/// Owns the process-lifetime state for running queries against this
/// particular set of connectors, tools, and sanity rules. A process may host
/// more than one Orchestrator — test fixtures and multi-tenant hosting both
/// construct independent instances rather than reaching for a singleton.
pub struct Orchestrator {
    connectors: ConnectorBindings,
    tools: ToolRegistry,
    sanity: SanityChecker,
    cost: CostTracker,
}

impl Orchestrator {
    pub fn new(
        connectors: ConnectorBindings,
        tools: ToolRegistry,
        sanity: SanityChecker,
        cost_limit: CostLimit,
    ) -> Self {
        Self {
            connectors,
            tools,
            sanity,
            cost: CostTracker::new(cost_limit),
        }
    }

    fn build_specialist(&self) -> SpecialistVerifier<'_> {
        let verifier = SpecialistVerifier::new(
            self.connectors.fast.as_deref(),
            self.connectors.strong.as_deref(),
        );
        let verifier = match self.connectors.fast_pricing {
            Some(pricing) => verifier.with_fast_pricing(pricing),
            None => verifier,
        };
        match self.connectors.strong_pricing {
            Some(pricing) => verifier.with_strong_pricing(pricing),
            None => verifier,
        }
    }

    /// Analyze then execute a query, returning the Plan actually run (after
    /// any `code_exec` injection) alongside the accumulated results. Shared
    /// by both `process_query` and `process_query_stream` — streaming only
    /// changes how the Presenter stage runs, not anything before it.
    async fn analyze_and_execute(
        &self,
        query_text: &str,
        session: &Session,
        source: Source,
        query_id: &str,
    ) -> (Plan, ExecutionOutput) {
        let analyzer = PlanAnalyzer::new(self.connectors.local.as_ref());
        let mut plan = analyzer
            .analyze(query_text, source)
            .instrument(tracing::info_span!("analyzer_call", span = SPAN_ANALYZE))
            .await;

        let specialist = self.build_specialist();
        let budget = SpecialistBudget {
            tracker: &self.cost,
            session_id: &session.session_id,
            query_id,
        };
        let executor = PlanExecutor::new(&self.tools, &self.sanity, &specialist, Some(budget));
        let execution = executor
            .execute(&mut plan)
            .instrument(tracing::info_span!("executor_run"))
            .await;

        (plan, execution)
    }

    /// Run a query to completion: Analyzer → Executor → Presenter.
    pub async fn process_query(
        &self,
        query_text: &str,
        session: &Session,
        source: Source,
    ) -> FinalizationOutput {
        let query_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "orch_process_query",
            span = SPAN_PROCESS_QUERY,
            query_id = tracing::field::Empty,
            session_id = tracing::field::Empty,
            source = tracing::field::Empty,
        );
        span.record(FIELD_QUERY_ID, query_id.as_str());
        span.record(FIELD_SESSION_ID, session.session_id.as_str());
        span.record(FIELD_SOURCE, format!("{source:?}").as_str());
        async {
            let (plan, execution) = self
                .analyze_and_execute(query_text, session, source, &query_id)
                .await;

            let input = FinalizationInput {
                query_text: query_text.to_string(),
                plan,
                tool_results: execution.tool_results,
                specialist_results: execution.specialist_results,
                style_profile: None,
                conversation_history: Vec::new(),
            };

            let presenter = Presenter::new(self.connectors.local.as_ref());
            presenter
                .present(&input)
                .instrument(tracing::info_span!("presenter_call", span = SPAN_PRESENT))
                .await
        }
        .instrument(span)
        .await
    }

    /// As [`Self::process_query`], but the final prose streams token-by-token
    /// instead of completing as a single value. Tool and specialist work
    /// still runs eagerly to completion first — only the Presenter's own
    /// generation streams, so a query with no tool/specialist steps pays no
    /// extra latency over `process_query`, and one with heavy tool use does
    /// not start emitting chunks mid-execution.
    ///
    /// Returns `Err` with a user-facing apology, rather than a stream, if the
    /// Presenter's streaming call cannot even start (e.g. a transport error
    /// on the first connector round-trip).
    pub async fn process_query_stream(
        &self,
        query_text: &str,
        session: &Session,
        source: Source,
    ) -> Result<ChunkStream, FinalizationOutput> {
        let query_id = Uuid::new_v4().to_string();
        let stream_span = tracing::info_span!(
            "orch_process_query_stream",
            span = SPAN_PROCESS_QUERY,
            query_id = tracing::field::Empty,
            session_id = tracing::field::Empty,
            source = tracing::field::Empty,
        );
        stream_span.record(FIELD_QUERY_ID, query_id.as_str());
        stream_span.record(FIELD_SESSION_ID, session.session_id.as_str());
        stream_span.record(FIELD_SOURCE, format!("{source:?}").as_str());
        let (plan, execution) = self
            .analyze_and_execute(query_text, session, source, &query_id)
            .instrument(stream_span)
            .await;

        let input = FinalizationInput {
            query_text: query_text.to_string(),
            plan,
            tool_results: execution.tool_results,
            specialist_results: execution.specialist_results,
            style_profile: None,
            conversation_history: Vec::new(),
        };

        let presenter = Presenter::new(self.connectors.local.as_ref());
        match presenter.present_stream(&input).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                tracing::warn!(error = %err, "presenter stream failed to start, falling back to apology");
                Err(FinalizationOutput::apology(err.to_string()))
            }
        }
    }

    /// Liveness of the local connector, whether any tool is registered, and
    /// whether at least one external (`fast`/`strong`) connector is healthy.
    pub async fn health(&self) -> HealthStatus {
        let local = self.connectors.local.health().await;

        let mut externals = false;
        if let Some(fast) = &self.connectors.fast {
            externals = fast.health().await || externals;
        }
        if let Some(strong) = &self.connectors.strong {
            externals = strong.health().await || externals;
        }

        HealthStatus {
            local,
            tools: !self.tools.is_empty(),
            externals,
        }
    }

    /// Cumulative spend for `session_id` against this Orchestrator's shared
    /// cost limit.
    pub fn cost_summary(&self, session_id: &str) -> CostSummary {
        self.cost.summary(session_id)
    }

    #[cfg(test)]
    fn cost_tracker(&self) -> &CostTracker {
        &self.cost
    }
}
