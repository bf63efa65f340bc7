//! Kernel error taxonomy.
//!
//! A single serializable error struct with a closed kind set. Errors cross
//! the wire inside tool results and workflow payloads, so the type carries
//! a machine-readable code, optional provider metadata, and a retryability
//! flag surfaced to the policy engine and stream.

use serde::{Deserialize, Serialize};

/// Closed set of runtime-internal error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PolicyDenied,
    UnknownTool,
    CodecFailure,
    SchemaMismatch,
    ToolTimeout,
    ToolRateLimited,
    ToolUnavailable,
    ExecutionError,
    EngineFailure,
    StoreFailure,
    Canceled,
    BudgetExhausted,
    DeadlineExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::UnknownTool => "unknown_tool",
            Self::CodecFailure => "codec_failure",
            Self::SchemaMismatch => "schema_mismatch",
            Self::ToolTimeout => "tool_timeout",
            Self::ToolRateLimited => "tool_rate_limited",
            Self::ToolUnavailable => "tool_unavailable",
            Self::ExecutionError => "execution_error",
            Self::EngineFailure => "engine_failure",
            Self::StoreFailure => "store_failure",
            Self::Canceled => "canceled",
            Self::BudgetExhausted => "budget_exhausted",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Whether errors of this kind are retryable unless overridden.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::ToolTimeout | Self::ToolRateLimited | Self::ToolUnavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared error type used across all Arbor crates.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    /// Machine-readable code. Defaults to the kind name; adapters may
    /// refine it (e.g. `streaming_unsupported`).
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Required payload fields the caller omitted (schema mismatches only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.as_str().to_owned(),
            message: message.into(),
            retryable: kind.default_retryable(),
            provider: None,
            operation: None,
            http_status: None,
            missing_fields: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_provider(
        mut self,
        provider: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        self.provider = Some(provider.into());
        self.operation = Some(operation.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    // ── Constructors, one per kind ────────────────────────────────

    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyDenied, message)
    }

    pub fn unknown_tool(tool_id: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: {tool_id}"))
    }

    pub fn codec_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CodecFailure, message)
    }

    pub fn schema_mismatch(message: impl Into<String>, missing_fields: Vec<String>) -> Self {
        let mut err = Self::new(ErrorKind::SchemaMismatch, message);
        err.missing_fields = missing_fields;
        err
    }

    pub fn tool_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolTimeout, message)
    }

    pub fn tool_rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolRateLimited, message)
    }

    pub fn tool_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolUnavailable, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionError, message)
    }

    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineFailure, message)
    }

    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreFailure, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn budget_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExhausted, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    /// Returned by model clients that do not implement streaming.
    pub fn streaming_unsupported() -> Self {
        Self::new(ErrorKind::ExecutionError, "streaming is not supported")
            .with_code("streaming_unsupported")
    }

    /// Client-safe message for workflow payloads. The raw message goes to
    /// `debug_error` and logs only.
    pub fn safe_message(&self) -> String {
        format!("run failed: {}", self.kind)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::codec_failure(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::store_failure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
