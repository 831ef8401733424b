//! Plan–Execute–Present orchestration kernel: a tiered LLM system that
//! drafts a structured [`Plan`](types::Plan) for a query, runs its steps
//! (tool calls, sanity checks, specialist-model cross-checks), and presents
//! a single final answer — escalating to a stronger (and costlier) model
//! only when a cheaper tier's output looks suspicious.
//!
//! [`orchestrator::Orchestrator`] is the facade most callers want; the other
//! modules are its components, each independently testable and each
//! exposed for callers who need to drive a stage on its own (e.g. a CLI
//! that only wants to run the Plan Analyzer against a fixture).

pub mod analyzer;
pub mod config;
pub mod connector;
pub mod cost;
pub mod error;
pub mod executor;
pub mod finalization;
pub mod json_extract;
pub mod observability;
pub mod orchestrator;
pub mod presenter;
pub mod sanity;
pub mod specialist;
pub mod tool;
pub mod types;
pub mod verification;

pub use config::OrchestratorConfig;
pub use connector::{
    ChunkStream, ConnectorError, FinishReason, GenerateParams, GenerateResponse, LlmConnector,
    Message, Role, TokenCount,
};
pub use cost::{ConnectorPricing, CostLimit, CostRecord, CostSummary, CostTracker};
pub use error::{OrchError, Result};
pub use finalization::{FinalizationInput, FinalizationOutput, HistoryTurn};
pub use orchestrator::{ConnectorBindings, HealthStatus, Orchestrator, Session};
pub use sanity::{SanityChecker, SanityResult, Severity};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use types::{Plan, PlanStep, Source};
pub use verification::VerificationResult;
