//! Packmind: a tiered Plan–Execute–Present LLM orchestration kernel.
//!
//! This crate drafts a structured plan for an incoming query, executes the
//! plan's steps against registered tools, escalates to a stronger model when
//! a cheaper one's output looks implausible, and presents a single final
//! answer — all under an explicit, process-wide spend cap.
//!
//! # Architecture
//!
//! A query flows through three stages, tied together by the
//! [`orch::orchestrator::Orchestrator`] facade:
//! - **Plan Analyzer**: drafts a [`orch::types::Plan`] from the query text
//! - **Plan Executor**: validates, orders, and runs the plan's steps —
//!   tool calls, sanity checks, and specialist-model verification — against
//!   a shared [`orch::cost::CostTracker`]
//! - **Presenter**: synthesizes the accumulated results into a single
//!   final answer, with citations, either all at once or streamed
//!
//! Credentials for the connector roles this crate builds are never stored as
//! plaintext in configuration; see [`credentials`] for the platform-specific
//! backends used to resolve them.

pub mod credentials;
pub mod orch;

pub use orch::{
    ChunkStream, ConnectorBindings, ConnectorError, FinalizationInput, FinalizationOutput,
    GenerateParams, GenerateResponse, HealthStatus, LlmConnector, Message, OrchError,
    OrchestratorConfig, Orchestrator, Plan, PlanStep, Result, SanityChecker, Session, Source,
    Tool, ToolRegistry, ToolResult, VerificationResult,
};
