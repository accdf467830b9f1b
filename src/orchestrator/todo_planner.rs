//! Multi-Agent Todo Planner — C12.
//!
//! No direct teacher analogue; built in the teacher's match-on-mode idiom (see
//! `orchestration.rs::OrchestrationMode`'s per-mode `execute_*` dispatch) as a nested orchestrator
//! over six sub-agents — Planning, Execution, Validation, Writer, Critique, Cleanup — bounded by a
//! [`ConditionalLlm`] "have we optimized enough steps" gate (§4.12). Exposes itself to its parent
//! orchestrator as an opaque [`OrchestratorAgent`]: `emits_own_events` reports `true` so the base
//! orchestrator running it doesn't double-emit agent events around the composite — only the six
//! inner sub-agents get wrapped, by this planner's own `base` field.

use async_trait::async_trait;

use crate::agent::{OrchestratorContext, SubAgent};
use crate::errors::OrchestratorError;
use crate::orchestrator::base::BaseOrchestrator;
use crate::orchestrator::conditional::ConditionalLlm;
use crate::orchestrator::OrchestratorAgent;

pub struct TodoPlanner {
    base: BaseOrchestrator,
    planning: SubAgent,
    execution: SubAgent,
    validation: SubAgent,
    writer: SubAgent,
    critique: SubAgent,
    cleanup: SubAgent,
    conditional: ConditionalLlm,
    max_iterations: u32,
    workspace_path: String,
}

impl TodoPlanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: BaseOrchestrator,
        planning: SubAgent,
        execution: SubAgent,
        validation: SubAgent,
        writer: SubAgent,
        critique: SubAgent,
        cleanup: SubAgent,
        conditional: ConditionalLlm,
        max_iterations: u32,
    ) -> Self {
        Self {
            base,
            planning,
            execution,
            validation,
            writer,
            critique,
            cleanup,
            conditional,
            max_iterations,
            workspace_path: String::new(),
        }
    }

    /// Set by the owning workflow (C11) before invocation, same as [`SubAgent::set_context`]
    /// (§4.11).
    pub fn set_workspace_path(&mut self, workspace_path: impl Into<String>) {
        self.workspace_path = workspace_path.into();
    }

    pub async fn execute(&mut self, objective: &str) -> Result<String, OrchestratorError> {
        let started = self.base.emit_start("todo_planner", objective).await;
        let result = self.run_loop(objective).await;
        match &result {
            Ok(_) => self.base.emit_end("todo_planner", started, true).await,
            Err(e) => {
                self.base.emit_error("todo_planner", &e.to_string()).await;
                self.base.emit_end("todo_planner", started, false).await;
            }
        }
        result
    }

    async fn run_loop(&mut self, objective: &str) -> Result<String, OrchestratorError> {
        let mut todo_markdown = String::new();

        for iteration in 1..=self.max_iterations {
            log::info!("todo_planner iteration {}/{}", iteration, self.max_iterations);
            let mut ctx = OrchestratorContext {
                objective: objective.to_string(),
                workspace_path: self.workspace_path.clone(),
                phase: "plan".to_string(),
                iteration,
            };

            self.planning.set_context(ctx.clone());
            let planning = self
                .base
                .run_agent(
                    &mut self.planning,
                    &format!("Current todo list:\n{}\n\nObjective: {{{{objective}}}}", todo_markdown),
                )
                .await?;

            ctx.phase = "execute".to_string();
            self.execution.set_context(ctx.clone());
            let execution = self
                .base
                .run_agent(
                    &mut self.execution,
                    &format!("Select 2-3 unoptimized steps from:\n{}", planning),
                )
                .await?;

            ctx.phase = "validate".to_string();
            self.validation.set_context(ctx.clone());
            let validation = self
                .base
                .run_agent(
                    &mut self.validation,
                    &format!("Plan:\n{}\n\nExecution:\n{}", planning, execution),
                )
                .await?;

            ctx.phase = "write".to_string();
            self.writer.set_context(ctx.clone());
            todo_markdown = self
                .base
                .run_agent(
                    &mut self.writer,
                    &format!(
                        "Plan:\n{}\n\nExecution:\n{}\n\nValidation:\n{}\n\nPrevious todo list:\n{}",
                        planning, execution, validation, todo_markdown
                    ),
                )
                .await?;

            ctx.phase = "critique".to_string();
            self.critique.set_context(ctx);
            let critique = self.base.run_agent(&mut self.critique, &todo_markdown).await?;

            let decide_context = format!("Todo list:\n{}\n\nCritique:\n{}", todo_markdown, critique);
            let (keep_going, reason) = self
                .conditional
                .decide(&decide_context, "Does this todo list still need another optimization pass?")
                .await;
            if !keep_going {
                log::info!("todo_planner stopping after iteration {} ({})", iteration, reason);
                break;
            }
        }

        let cleanup_ctx = OrchestratorContext {
            objective: objective.to_string(),
            workspace_path: self.workspace_path.clone(),
            phase: "cleanup".to_string(),
            iteration: self.max_iterations,
        };
        self.cleanup.set_context(cleanup_ctx);
        self.base.run_agent(&mut self.cleanup, &todo_markdown).await
    }
}

#[async_trait]
impl OrchestratorAgent for TodoPlanner {
    fn name(&self) -> &str {
        "todo_planner"
    }

    /// Opaque composite per §4.12 — the parent orchestrator must not wrap this call with its own
    /// `OrchestratorAgentStart`/`OrchestratorAgentEnd`.
    fn emits_own_events(&self) -> bool {
        true
    }

    async fn run(&mut self, input: &str) -> Result<String, OrchestratorError> {
        self.execute(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::ScriptedProvider;
    use crate::event::{EventBus, EventKind, RecordingListener};
    use crate::llm_session::LlmSession;
    use crate::tools::ToolRegistry;
    use std::sync::Arc;

    fn agent(name: &str, reply: &str, bus: Arc<EventBus>) -> SubAgent {
        let provider = Arc::new(ScriptedProvider::with_replies([reply]));
        let session = LlmSession::new(provider, "system", 10_000);
        SubAgent::new(name, "system prompt", session, bus)
    }

    fn build_planner(bus: Arc<EventBus>, keep_going_replies: Vec<&'static str>) -> TodoPlanner {
        let base = BaseOrchestrator::new(bus.clone(), Arc::new(ToolRegistry::new()));
        let conditional_provider = Arc::new(ScriptedProvider::with_replies(keep_going_replies));
        let conditional = base.conditional_llm(LlmSession::new(conditional_provider, "decide", 10_000));

        TodoPlanner::new(
            base,
            agent("planning", "plan v1", bus.clone()),
            agent("execution", "picked steps", bus.clone()),
            agent("validation", "looks good", bus.clone()),
            agent("writer", "- [ ] step one\n- [ ] step two", bus.clone()),
            agent("critique", "mostly fine", bus.clone()),
            agent("cleanup", "final cleaned todo", bus),
            conditional,
            3,
        )
    }

    #[tokio::test]
    async fn stops_as_soon_as_conditional_says_enough() {
        let bus = Arc::new(EventBus::new());
        let mut planner = build_planner(bus, vec![r#"{"continue": false, "reason": "optimized"}"#]);

        let result = planner.execute("clean up the repo").await.unwrap();
        assert_eq!(result, "final cleaned todo");
    }

    #[tokio::test]
    async fn opaque_agent_trait_impl_does_not_emit_top_level_agent_events_itself() {
        let mut bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::new());
        bus.register(recorder.clone());
        let bus = Arc::new(bus);

        let mut planner = build_planner(bus.clone(), vec![r#"{"continue": false, "reason": "done"}"#]);

        // Invoke exactly the way a parent orchestrator would, through the trait object.
        let outer_base = BaseOrchestrator::new(bus, Arc::new(ToolRegistry::new()));
        let dyn_planner: &mut dyn OrchestratorAgent = &mut planner;
        let result = outer_base.run_agent(dyn_planner, "clean up").await.unwrap();
        assert_eq!(result, "final cleaned todo");

        let events = recorder.events().await;
        // The inner sub-agents' OrchestratorAgentStart/End events are present (emitted by the
        // planner's own base orchestrator instance), but none carry the opaque name
        // "todo_planner" itself, since the outer call skipped wrapping it.
        let wrapped_outer = events.iter().any(|e| match &e.kind {
            EventKind::OrchestratorAgentStart { agent_name } | EventKind::OrchestratorAgentEnd { agent_name, .. } => {
                agent_name == "todo_planner"
            }
            _ => false,
        });
        assert!(!wrapped_outer);
    }
}
