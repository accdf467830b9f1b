//! Event Model & Bus — C6.
//!
//! `RuntimeEvent` is the single tagged union every layer of the system emits through. Unlike the
//! inherited `AgentEvent`/`OrchestrationEvent` split, this runtime needs cache and MCP-discovery
//! variants in the same stream as conversation/orchestrator/agent variants so a single listener
//! can reconstruct the whole hierarchy (§3 AgentEvent, §4.6).

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Which subsystem produced an event. Derived from the event's `EventKind` at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Orchestrator,
    Agent,
    Llm,
    Tool,
    Conversation,
    Cache,
    System,
}

/// Tagged variant of everything the runtime can emit (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ConversationStart { session_id: String },
    ConversationEnd { session_id: String, turns: u32 },
    ConversationError { session_id: String, error: String },

    LlmCallStart { agent_name: String, iteration: u32 },
    LlmCallEnd { agent_name: String, iteration: u32, tokens_used: usize, response_length: usize },
    LlmCallError { agent_name: String, iteration: u32, error: String },
    FallbackAttempt { agent_name: String, provider: String, attempt: u32 },

    ToolCallStart { agent_name: String, tool_name: String, parameters: JsonValue },
    ToolCallEnd { agent_name: String, tool_name: String, success: bool, duration_ms: u64, result: JsonValue },
    ToolCallError { agent_name: String, tool_name: String, error: String },

    McpConnectionStart { server_name: String, protocol: String },
    McpConnectionEnd { server_name: String, protocol: String, tool_count: usize },
    McpDiscoverySelection { server_name: String, selected: bool, reason: String },

    ComprehensiveCache(ComprehensiveCacheEvent),

    OrchestratorStart { orchestrator_type: String, objective: String },
    OrchestratorEnd { orchestrator_type: String, success: bool, duration_ms: u64 },
    OrchestratorError { orchestrator_type: String, error: String },
    OrchestratorAgentStart { agent_name: String },
    OrchestratorAgentEnd { agent_name: String, success: bool, duration_ms: u64 },

    RequestHumanFeedback { request_id: String, message_for_user: String },
    BlockingHumanFeedback { request_id: String },
    HumanVerificationResponse { request_id: String, response: String },

    ContextCancelled { reason: String },
    UnifiedCompletion { status: String, turns: u32, summary: String },
}

impl EventKind {
    pub fn component(&self) -> Component {
        match self {
            EventKind::ConversationStart { .. }
            | EventKind::ConversationEnd { .. }
            | EventKind::ConversationError { .. } => Component::Conversation,

            EventKind::LlmCallStart { .. }
            | EventKind::LlmCallEnd { .. }
            | EventKind::LlmCallError { .. }
            | EventKind::FallbackAttempt { .. } => Component::Llm,

            EventKind::ToolCallStart { .. }
            | EventKind::ToolCallEnd { .. }
            | EventKind::ToolCallError { .. } => Component::Tool,

            EventKind::McpConnectionStart { .. }
            | EventKind::McpConnectionEnd { .. }
            | EventKind::McpDiscoverySelection { .. } => Component::System,

            EventKind::ComprehensiveCache(_) => Component::Cache,

            EventKind::OrchestratorStart { .. }
            | EventKind::OrchestratorEnd { .. }
            | EventKind::OrchestratorError { .. } => Component::Orchestrator,

            EventKind::OrchestratorAgentStart { .. } | EventKind::OrchestratorAgentEnd { .. } => {
                Component::Agent
            }

            EventKind::RequestHumanFeedback { .. }
            | EventKind::BlockingHumanFeedback { .. }
            | EventKind::HumanVerificationResponse { .. } => Component::Orchestrator,

            EventKind::ContextCancelled { .. } | EventKind::UnifiedCompletion { .. } => {
                Component::System
            }
        }
    }

    /// Whether this variant is a "start" half of a correlated pair (§3, §8).
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            EventKind::ConversationStart { .. }
                | EventKind::LlmCallStart { .. }
                | EventKind::ToolCallStart { .. }
                | EventKind::McpConnectionStart { .. }
                | EventKind::OrchestratorStart { .. }
                | EventKind::OrchestratorAgentStart { .. }
        )
    }
}

/// Single summary event emitted per façade call (C5) instead of per-cache-entry events (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveCacheEvent {
    pub per_server_status: HashMap<String, String>,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub cache_writes: u32,
    pub errors: Vec<String>,
    pub total_tools: usize,
    pub total_prompts: usize,
    pub total_resources: usize,
    pub connection_time_ms: u64,
    pub cache_time_ms: u64,
}

/// An event as it flows through the bus, with correlation/hierarchy metadata (§3 AgentEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub parent_id: Option<String>,
    pub correlation_id: Option<String>,
    pub hierarchy_level: u32,
    pub session_id: Option<String>,
    pub component: Component,
    pub metadata: HashMap<String, JsonValue>,
    pub kind: EventKind,
}

impl RuntimeEvent {
    pub fn new(kind: EventKind) -> Self {
        let component = kind.component();
        Self {
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
            parent_id: None,
            correlation_id: None,
            hierarchy_level: 0,
            session_id: None,
            component,
            metadata: HashMap::new(),
            kind,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>, parent_level: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.hierarchy_level = parent_level + 1;
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }
}

/// Generates fresh correlation ids for start/end pairing (§3 invariants).
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Listener interface — implementations MUST be non-blocking on the emission path (§4.6).
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle_event(&self, event: &RuntimeEvent) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Ordered, per-producer event bus. Preserves program order from a single producer but does not
/// cross-order producers (§5).
pub struct EventBus {
    listeners: Vec<std::sync::Arc<dyn EventListener>>,
    emitted_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            emitted_count: AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, listener: std::sync::Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Deliver an event to every registered listener, in registration order. A listener error is
    /// logged but does not stop delivery to the remaining listeners — the emission path itself
    /// must never block or fail.
    pub async fn emit(&self, event: RuntimeEvent) {
        self.emitted_count.fetch_add(1, Ordering::Relaxed);
        for listener in &self.listeners {
            if let Err(err) = listener.handle_event(&event).await {
                log::warn!("event listener failed to handle {:?}: {}", event.kind, err);
            }
        }
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory listener used by tests to assert on emitted events and correlation pairing.
#[derive(Default)]
pub struct RecordingListener {
    events: tokio::sync::Mutex<Vec<RuntimeEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().await.clone()
    }

    /// Checks the invariant from §3/§8: every `*_start` correlation id has at most one matching
    /// end/error event.
    pub async fn correlation_pairs_are_well_formed(&self) -> bool {
        let events = self.events.lock().await;
        let mut start_ids = std::collections::HashSet::new();
        for event in events.iter() {
            if event.kind.is_start() {
                if let Some(id) = &event.correlation_id {
                    if !start_ids.insert(id.clone()) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[async_trait]
impl EventListener for RecordingListener {
    async fn handle_event(&self, event: &RuntimeEvent) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn bus_delivers_to_all_listeners_in_order() {
        let mut bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::new());
        bus.register(recorder.clone());

        bus.emit(RuntimeEvent::new(EventKind::OrchestratorStart {
            orchestrator_type: "workflow".to_string(),
            objective: "do the thing".to_string(),
        }))
        .await;
        bus.emit(RuntimeEvent::new(EventKind::OrchestratorEnd {
            orchestrator_type: "workflow".to_string(),
            success: true,
            duration_ms: 10,
        }))
        .await;

        let events = recorder.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(bus.emitted_count(), 2);
    }

    #[tokio::test]
    async fn correlation_ids_pair_start_and_end() {
        let recorder = RecordingListener::new();
        let correlation_id = new_correlation_id();

        recorder
            .handle_event(
                &RuntimeEvent::new(EventKind::ToolCallStart {
                    agent_name: "planner".into(),
                    tool_name: "read_workspace_file".into(),
                    parameters: serde_json::json!({}),
                })
                .with_correlation_id(correlation_id.clone()),
            )
            .await
            .unwrap();
        recorder
            .handle_event(
                &RuntimeEvent::new(EventKind::ToolCallEnd {
                    agent_name: "planner".into(),
                    tool_name: "read_workspace_file".into(),
                    success: true,
                    duration_ms: 5,
                    result: serde_json::json!({"ok": true}),
                })
                .with_correlation_id(correlation_id),
            )
            .await
            .unwrap();

        assert!(recorder.correlation_pairs_are_well_formed().await);
    }

    #[test]
    fn hierarchy_level_is_parent_level_plus_one() {
        let event = RuntimeEvent::new(EventKind::OrchestratorAgentStart {
            agent_name: "execution".into(),
        })
        .with_parent("root-span", 2);
        assert_eq!(event.hierarchy_level, 3);
        assert_eq!(event.parent_id.as_deref(), Some("root-span"));
    }
}
