//! Span and field-name constants for the orch module's `tracing` usage.
//!
//! Centralizing these as constants (rather than inline string literals at
//! each call site) keeps span/field names consistent across the Orchestrator,
//! Executor, Specialist Verifier, and Presenter, mirroring the
//! `observability::spans` convention this codebase uses for its other
//! LLM-facing subsystem.

/// Top-level span wrapping a single `process_query` call.
pub const SPAN_PROCESS_QUERY: &str = "orch.process_query";
/// Span wrapping a single Plan Analyzer call.
pub const SPAN_ANALYZE: &str = "orch.analyze";
/// Span wrapping a single Plan Executor step.
pub const SPAN_EXECUTE_STEP: &str = "orch.execute_step";
/// Span wrapping a single Specialist Verifier call.
pub const SPAN_SPECIALIST_VERIFY: &str = "orch.specialist_verify";
/// Span wrapping a single Presenter call.
pub const SPAN_PRESENT: &str = "orch.present";

/// Field: the query's generated id.
pub const FIELD_QUERY_ID: &str = "query_id";
/// Field: the caller-supplied session id.
pub const FIELD_SESSION_ID: &str = "session_id";
/// Field: the query's origin (`cli` or `api`).
pub const FIELD_SOURCE: &str = "source";
/// Field: a Plan step's id.
pub const FIELD_STEP_ID: &str = "step_id";
/// Field: a Plan step's type.
pub const FIELD_STEP_TYPE: &str = "step_type";
/// Field: which specialist tier (`fast`/`strong`) a call was routed to.
pub const FIELD_TIER: &str = "tier";
