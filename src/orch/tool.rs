//! The Tool interface: a uniform `execute`/`fallback` contract over external
//! capabilities (code execution, web search, memory, sentiment), plus the
//! registry the Orchestrator owns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Success,
    Failed,
    Skipped,
}

/// Result of executing a single [`PlanStep`](super::types::PlanStep) of type
/// `tool_call`.
///
/// Invariant: `data` is empty only when `outcome != Success` or the tool
/// explicitly returns nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub step_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn success(
        step_id: impl Into<String>,
        tool_name: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success,
            data,
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failed,
            data: HashMap::new(),
            error: Some(error.into()),
            execution_time_ms: 0,
        }
    }

    pub fn skipped(
        step_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Skipped,
            data: HashMap::new(),
            error: Some(error.into()),
            execution_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ToolOutcome::Success
    }
}

/// The uniform contract every tool implementation satisfies.
///
/// `execute_with_fallback` is the convenience wrapper the Executor actually
/// calls: it invokes `execute`, and on an `Err` routes to `fallback` instead
/// of propagating the error.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, e.g. `"code_exec"`, `"web_search"`, `"rag"`, `"sentiment"`.
    fn name(&self) -> &str;

    /// Whether this tool instance is enabled. A disabled tool short-circuits
    /// `execute_with_fallback` to a failed result without calling `execute`.
    fn enabled(&self) -> bool {
        true
    }

    /// Run the tool against resolved step input.
    async fn execute(
        &self,
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<HashMap<String, serde_json::Value>, String>;

    /// Produce a degraded-but-useful result when `execute` fails.
    ///
    /// Default: no fallback behavior, re-surface the original error.
    async fn fallback(
        &self,
        _params: &HashMap<String, serde_json::Value>,
        error: &str,
    ) -> Result<HashMap<String, serde_json::Value>, String> {
        Err(error.to_string())
    }

    /// `execute`, falling back to `fallback` on failure, with elapsed timing
    /// and disabled-tool short-circuiting baked in.
    async fn execute_with_fallback(
        &self,
        step_id: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> ToolResult {
        if !self.enabled() {
            return ToolResult::failed(step_id, self.name(), "Tool disabled");
        }

        let start = Instant::now();
        match self.execute(params).await {
            Ok(data) => {
                ToolResult::success(step_id, self.name(), data, start.elapsed().as_millis() as u64)
            }
            Err(err) => match self.fallback(params, &err).await {
                Ok(data) => {
                    ToolResult::success(step_id, self.name(), data, start.elapsed().as_millis() as u64)
                }
                Err(fallback_err) => ToolResult::failed(step_id, self.name(), fallback_err),
            },
        }
    }
}

/// The Orchestrator's immutable-after-construction tool registry.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            params: &HashMap<String, serde_json::Value>,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            Ok(params.clone())
        }
    }

    struct AlwaysFailsTool;

    #[async_trait]
    impl Tool for AlwaysFailsTool {
        fn name(&self) -> &str {
            "fails"
        }

        async fn execute(
            &self,
            _params: &HashMap<String, serde_json::Value>,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            Err("boom".to_string())
        }
    }

    struct DisabledTool;

    #[async_trait]
    impl Tool for DisabledTool {
        fn name(&self) -> &str {
            "disabled"
        }

        fn enabled(&self) -> bool {
            false
        }

        async fn execute(
            &self,
            _params: &HashMap<String, serde_json::Value>,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            unreachable!("execute must not be called on a disabled tool")
        }
    }

    struct FallsBackTool;

    #[async_trait]
    impl Tool for FallsBackTool {
        fn name(&self) -> &str {
            "fallback_tool"
        }

        async fn execute(
            &self,
            _params: &HashMap<String, serde_json::Value>,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            Err("primary failed".to_string())
        }

        async fn fallback(
            &self,
            _params: &HashMap<String, serde_json::Value>,
            _error: &str,
        ) -> Result<HashMap<String, serde_json::Value>, String> {
            let mut data = HashMap::new();
            data.insert(
                "degraded".to_string(),
                serde_json::Value::Bool(true),
            );
            Ok(data)
        }
    }

    #[tokio::test]
    async fn execute_with_fallback_success() {
        let tool = EchoTool;
        let mut params = HashMap::new();
        params.insert("x".to_string(), serde_json::json!(1));
        let result = tool.execute_with_fallback("s1", &params).await;
        assert!(result.is_success());
        assert_eq!(result.data.get("x"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn execute_with_fallback_disabled_short_circuits() {
        let tool = DisabledTool;
        let result = tool.execute_with_fallback("s1", &HashMap::new()).await;
        assert_eq!(result.outcome, ToolOutcome::Failed);
        assert_eq!(result.error.as_deref(), Some("Tool disabled"));
    }

    #[tokio::test]
    async fn execute_with_fallback_no_fallback_impl_propagates_error() {
        let tool = AlwaysFailsTool;
        let result = tool.execute_with_fallback("s1", &HashMap::new()).await;
        assert_eq!(result.outcome, ToolOutcome::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn execute_with_fallback_uses_fallback_on_error() {
        let tool = FallsBackTool;
        let result = tool.execute_with_fallback("s1", &HashMap::new()).await;
        assert!(result.is_success());
        assert_eq!(result.data.get("degraded"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn registry_register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nonexistent").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn tool_trait_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Tool>>();
    }
}
