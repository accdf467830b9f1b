//! Crate-wide error taxonomy.
//!
//! Each failure domain gets its own enum with a manual `Display`/`Error` impl, following the
//! style already used by the inherited `ToolError`/`OrchestrationError` types rather than pulling
//! in a derive-macro error crate.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

/// Failures from a transport client (stdio/sse/http) — C1.
#[derive(Debug)]
pub enum TransportError {
    Connect { server: String, cause: String },
    Initialize { server: String, cause: String },
    Call { server: String, tool: String, cause: String },
    PipeBroken { server: String },
    Canceled { server: String },
    Timeout { server: String },
}

impl TransportError {
    /// True for errors whose byte signature matches the broken-pipe family in §4.1:
    /// "broken pipe", "EOF", "connection reset", "[Errno 32]".
    pub fn is_pipe_broken_signature(text: &str) -> bool {
        let lowered = text.to_ascii_lowercase();
        lowered.contains("broken pipe")
            || lowered.contains("eof")
            || lowered.contains("connection reset")
            || text.contains("[Errno 32]")
    }

    pub fn server_name(&self) -> &str {
        match self {
            TransportError::Connect { server, .. }
            | TransportError::Initialize { server, .. }
            | TransportError::Call { server, .. }
            | TransportError::PipeBroken { server }
            | TransportError::Canceled { server }
            | TransportError::Timeout { server } => server,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect { server, cause } => {
                write!(f, "failed to connect to MCP server '{}': {}", server, cause)
            }
            TransportError::Initialize { server, cause } => {
                write!(f, "MCP initialize handshake failed for '{}': {}", server, cause)
            }
            TransportError::Call { server, tool, cause } => {
                write!(f, "tool call '{}' on server '{}' failed: {}", tool, server, cause)
            }
            TransportError::PipeBroken { server } => {
                write!(f, "connection to server '{}' broke (pipe closed)", server)
            }
            TransportError::Canceled { server } => {
                write!(f, "operation against server '{}' was canceled", server)
            }
            TransportError::Timeout { server } => {
                write!(f, "operation against server '{}' timed out", server)
            }
        }
    }
}

impl StdError for TransportError {}

/// Failures from the on-disk tool cache — C4.
#[derive(Debug)]
pub enum CacheError {
    Io { path: PathBuf, cause: String },
    Serialize { cause: String },
    CacheOnlyEmpty,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io { path, cause } => write!(f, "cache I/O error at '{}': {}", path.display(), cause),
            CacheError::Serialize { cause } => write!(f, "cache entry serialization failed: {}", cause),
            CacheError::CacheOnlyEmpty => {
                write!(f, "cache-only mode requested but no servers had a cache hit")
            }
        }
    }
}

impl StdError for CacheError {}

/// Failures surfaced by orchestrator runs — C9-C13.
#[derive(Debug)]
pub enum OrchestratorError {
    AgentNotFound(String),
    NoAgents,
    ExecutionFailed(String),
    HumanFeedbackTimeout { request_id: String },
    Canceled,
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::AgentNotFound(id) => write!(f, "agent not found: {}", id),
            OrchestratorError::NoAgents => write!(f, "orchestrator has no registered agents"),
            OrchestratorError::ExecutionFailed(msg) => write!(f, "orchestrator execution failed: {}", msg),
            OrchestratorError::HumanFeedbackTimeout { request_id } => {
                write!(f, "human feedback request '{}' timed out", request_id)
            }
            OrchestratorError::Canceled => write!(f, "orchestrator run was canceled"),
        }
    }
}

impl StdError for OrchestratorError {}

/// Failures from tool execution (workspace/memory/feedback adapters) — C8.
#[derive(Debug)]
pub enum ToolError {
    NotFound(String),
    InvalidParameters(String),
    ExecutionFailed(String),
    ProtocolError(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "tool not found: {}", name),
            ToolError::InvalidParameters(msg) => write!(f, "invalid tool parameters: {}", msg),
            ToolError::ExecutionFailed(msg) => write!(f, "tool execution failed: {}", msg),
            ToolError::ProtocolError(msg) => write!(f, "tool protocol error: {}", msg),
        }
    }
}

impl StdError for ToolError {}

/// Failures from the human-feedback rendezvous store — C8.
#[derive(Debug)]
pub enum FeedbackError {
    DuplicateRequest(String),
    Unknown(String),
    AlreadyCompleted(String),
    Timeout(String),
}

impl fmt::Display for FeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackError::DuplicateRequest(id) => write!(f, "feedback request already exists: {}", id),
            FeedbackError::Unknown(id) => write!(f, "unknown feedback request: {}", id),
            FeedbackError::AlreadyCompleted(id) => write!(f, "feedback request already completed: {}", id),
            FeedbackError::Timeout(id) => write!(f, "timed out waiting for feedback on: {}", id),
        }
    }
}

impl StdError for FeedbackError {}

/// Boxed, thread-safe error alias used at component boundaries that may surface any domain.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Aggregating error for call sites (e.g. the façade) that can fail in more than one domain.
#[derive(Debug)]
pub enum RuntimeError {
    Transport(TransportError),
    Cache(CacheError),
    Orchestrator(OrchestratorError),
    Tool(ToolError),
    Feedback(FeedbackError),
    Other(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Transport(e) => write!(f, "{}", e),
            RuntimeError::Cache(e) => write!(f, "{}", e),
            RuntimeError::Orchestrator(e) => write!(f, "{}", e),
            RuntimeError::Tool(e) => write!(f, "{}", e),
            RuntimeError::Feedback(e) => write!(f, "{}", e),
            RuntimeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for RuntimeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RuntimeError::Transport(e) => Some(e),
            RuntimeError::Cache(e) => Some(e),
            RuntimeError::Orchestrator(e) => Some(e),
            RuntimeError::Tool(e) => Some(e),
            RuntimeError::Feedback(e) => Some(e),
            RuntimeError::Other(_) => None,
        }
    }
}

impl From<TransportError> for RuntimeError {
    fn from(e: TransportError) -> Self {
        RuntimeError::Transport(e)
    }
}

impl From<CacheError> for RuntimeError {
    fn from(e: CacheError) -> Self {
        RuntimeError::Cache(e)
    }
}

impl From<OrchestratorError> for RuntimeError {
    fn from(e: OrchestratorError) -> Self {
        RuntimeError::Orchestrator(e)
    }
}

impl From<ToolError> for RuntimeError {
    fn from(e: ToolError) -> Self {
        RuntimeError::Tool(e)
    }
}

impl From<FeedbackError> for RuntimeError {
    fn from(e: FeedbackError) -> Self {
        RuntimeError::Feedback(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_broken_signatures_detected() {
        assert!(TransportError::is_pipe_broken_signature("write: broken pipe"));
        assert!(TransportError::is_pipe_broken_signature("unexpected EOF"));
        assert!(TransportError::is_pipe_broken_signature("connection reset by peer"));
        assert!(TransportError::is_pipe_broken_signature("os error: [Errno 32]"));
        assert!(!TransportError::is_pipe_broken_signature("tool not found"));
    }

    #[test]
    fn runtime_error_source_chain_terminates() {
        let err: RuntimeError = CacheError::CacheOnlyEmpty.into();
        assert!(err.source().is_some());
        assert!(err.source().unwrap().source().is_none());
        assert!(!err.to_string().is_empty());
    }
}
