//! Base Orchestrator — C9.
//!
//! Grounded on `orchestration.rs::Orchestration`'s agent-lifecycle bookkeeping and
//! `agent.rs::Agent`'s per-call event emission, generalized into a single reusable shell: owns
//! the workspace tool registry, emits `OrchestratorStart`/`OrchestratorEnd`/`OrchestratorError`
//! around a run, and wraps each non-opaque sub-agent call with
//! `OrchestratorAgentStart`/`OrchestratorAgentEnd` (§4.9).

use std::sync::Arc;
use std::time::Instant;

use crate::agent::SubAgent;
use crate::errors::OrchestratorError;
use crate::event::{EventBus, EventKind, RuntimeEvent};
use crate::llm_session::LlmSession;
use crate::orchestrator::conditional::ConditionalLlm;
use crate::orchestrator::OrchestratorAgent;
use crate::tools::ToolRegistry;

/// Marks when an orchestrator run started, returned by [`BaseOrchestrator::emit_start`] and fed
/// back into [`BaseOrchestrator::emit_end`] to compute the reported duration.
pub type RunStarted = Instant;

pub struct BaseOrchestrator {
    bus: Arc<EventBus>,
    tools: Arc<ToolRegistry>,
}

impl BaseOrchestrator {
    pub fn new(bus: Arc<EventBus>, tools: Arc<ToolRegistry>) -> Self {
        Self { bus, tools }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Builds a conditional-LLM decision helper sharing this orchestrator's event bus. Per §4.13,
    /// the helper only ever emits an end event for the decision call, never a start.
    pub fn conditional_llm(&self, session: LlmSession) -> ConditionalLlm {
        ConditionalLlm::new(session, self.bus.clone())
    }

    /// Emits `OrchestratorStart` and returns a marker to pass to [`BaseOrchestrator::emit_end`].
    pub async fn emit_start(&self, orchestrator_type: &str, objective: &str) -> RunStarted {
        log::info!("orchestrator '{}' starting — objective: {}", orchestrator_type, objective);
        self.bus
            .emit(RuntimeEvent::new(EventKind::OrchestratorStart {
                orchestrator_type: orchestrator_type.to_string(),
                objective: objective.to_string(),
            }))
            .await;
        Instant::now()
    }

    pub async fn emit_end(&self, orchestrator_type: &str, started: RunStarted, success: bool) {
        let duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "orchestrator '{}' finished — success: {}, duration: {}ms",
            orchestrator_type,
            success,
            duration_ms
        );
        self.bus
            .emit(RuntimeEvent::new(EventKind::OrchestratorEnd {
                orchestrator_type: orchestrator_type.to_string(),
                success,
                duration_ms,
            }))
            .await;
    }

    pub async fn emit_error(&self, orchestrator_type: &str, error: &str) {
        log::error!("orchestrator '{}' failed: {}", orchestrator_type, error);
        self.bus
            .emit(RuntimeEvent::new(EventKind::OrchestratorError {
                orchestrator_type: orchestrator_type.to_string(),
                error: error.to_string(),
            }))
            .await;
    }

    /// Runs `agent`, wrapping the call with `OrchestratorAgentStart`/`OrchestratorAgentEnd` unless
    /// the agent reports it already emits equivalent events for its own internals (§4.12).
    pub async fn run_agent(
        &self,
        agent: &mut dyn OrchestratorAgent,
        input: &str,
    ) -> Result<String, OrchestratorError> {
        if agent.emits_own_events() {
            return agent.run(input).await;
        }

        let agent_name = agent.name().to_string();
        log::debug!("running sub-agent '{}'", agent_name);
        self.bus
            .emit(RuntimeEvent::new(EventKind::OrchestratorAgentStart {
                agent_name: agent_name.clone(),
            }))
            .await;

        let started = Instant::now();
        let result = agent.run(input).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        if let Err(e) = &result {
            log::warn!("sub-agent '{}' failed after {}ms: {}", agent_name, duration_ms, e);
        }

        self.bus
            .emit(RuntimeEvent::new(EventKind::OrchestratorAgentEnd {
                agent_name,
                success: result.is_ok(),
                duration_ms,
            }))
            .await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::ScriptedProvider;
    use crate::event::RecordingListener;

    fn agent(reply: &str, bus: Arc<EventBus>) -> SubAgent {
        let provider = Arc::new(ScriptedProvider::with_replies([reply]));
        let session = LlmSession::new(provider, "system", 10_000);
        SubAgent::new("worker", "system prompt", session, bus)
    }

    #[tokio::test]
    async fn run_agent_wraps_with_start_and_end_by_default() {
        let mut bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::new());
        bus.register(recorder.clone());
        let bus = Arc::new(bus);

        let base = BaseOrchestrator::new(bus.clone(), Arc::new(ToolRegistry::new()));
        let mut worker = agent("done", bus);

        let result = base.run_agent(&mut worker, "go").await.unwrap();
        assert_eq!(result, "done");

        let events = recorder.events().await;
        let has_agent_start = events
            .iter()
            .any(|e| matches!(e.kind, EventKind::OrchestratorAgentStart { .. }));
        let has_agent_end = events
            .iter()
            .any(|e| matches!(e.kind, EventKind::OrchestratorAgentEnd { .. }));
        assert!(has_agent_start && has_agent_end);
    }

    struct OpaqueAgent;

    #[async_trait::async_trait]
    impl OrchestratorAgent for OpaqueAgent {
        fn name(&self) -> &str {
            "opaque"
        }

        fn emits_own_events(&self) -> bool {
            true
        }

        async fn run(&mut self, _input: &str) -> Result<String, OrchestratorError> {
            Ok("opaque result".to_string())
        }
    }

    #[tokio::test]
    async fn opaque_agent_is_not_wrapped_with_agent_events() {
        let mut bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::new());
        bus.register(recorder.clone());
        let bus = Arc::new(bus);

        let base = BaseOrchestrator::new(bus, Arc::new(ToolRegistry::new()));
        let mut opaque = OpaqueAgent;

        let result = base.run_agent(&mut opaque, "go").await.unwrap();
        assert_eq!(result, "opaque result");

        let events = recorder.events().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn orchestrator_lifecycle_events_bracket_a_run() {
        let mut bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::new());
        bus.register(recorder.clone());
        let bus = Arc::new(bus);

        let base = BaseOrchestrator::new(bus, Arc::new(ToolRegistry::new()));
        let started = base.emit_start("workflow", "ship the feature").await;
        base.emit_end("workflow", started, true).await;

        let events = recorder.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::OrchestratorStart { .. }));
        assert!(matches!(events[1].kind, EventKind::OrchestratorEnd { .. }));
    }
}
