//! Error types for the orch module.
//!
//! Domain failures (a malformed plan, an absent tool, a parse failure) are
//! represented as plain data inside [`super::types::ToolResult`],
//! [`super::sanity::SanityResult`] and [`super::verification::VerificationResult`] —
//! see the module doc for the propagation rule. [`OrchError`] is reserved for
//! failures the orchestrator itself must never let a query fail silently on:
//! bad configuration, internal invariant violations, and cancellation.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) included in
//! the Display output and accessible via [`OrchError::code()`].

/// Errors produced by the orch module's own infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum OrchError {
    /// Invalid or missing configuration.
    #[error("[CONFIG_INVALID] {0}")]
    Config(String),

    /// An internal invariant was violated; this indicates a bug.
    #[error("[INTERNAL] {0}")]
    Internal(String),

    /// The query was cancelled before completion.
    #[error("[CANCELLED] {0}")]
    Cancelled(String),
}

impl OrchError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_INVALID",
            Self::Internal(_) => "INTERNAL",
            Self::Cancelled(_) => "CANCELLED",
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m) | Self::Internal(m) | Self::Cancelled(m) => m,
        }
    }
}

/// Convenience alias for orch results.
pub type Result<T> = std::result::Result<T, OrchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_code() {
        let err = OrchError::Config("missing cost_limit".into());
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn internal_error_code() {
        let err = OrchError::Internal("poisoned mutex".into());
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn cancelled_error_code() {
        let err = OrchError::Cancelled("deadline elapsed".into());
        assert_eq!(err.code(), "CANCELLED");
    }

    #[test]
    fn display_includes_code_prefix() {
        let err = OrchError::Config("missing model".into());
        let display = format!("{err}");
        assert!(display.starts_with("[CONFIG_INVALID]"));
        assert!(display.contains("missing model"));
    }

    #[test]
    fn message_returns_inner_text() {
        let err = OrchError::Internal("bad state".into());
        assert_eq!(err.message(), "bad state");
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors: Vec<OrchError> = vec![
            OrchError::Config("x".into()),
            OrchError::Internal("x".into()),
            OrchError::Cancelled("x".into()),
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OrchError>();
    }
}
