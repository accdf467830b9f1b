//! Orchestration layer — C9 through C13.
//!
//! [`base::BaseOrchestrator`] is the single implementation backing every orchestrator flavor in
//! this module: it owns the workspace tool registry and event bus, emits
//! `OrchestratorStart`/`OrchestratorEnd` around a run, and wraps each sub-agent invocation with
//! `OrchestratorAgentStart`/`OrchestratorAgentEnd` (§4.9). [`OrchestratorAgent`] is the trait that
//! makes a sub-agent invocable that way; [`TodoPlanner`](todo_planner::TodoPlanner) opts out of the
//! wrapping via `emits_own_events` because it emits its own six sub-agent events internally
//! (§4.12).

pub mod ai_controlled;
pub mod base;
pub mod conditional;
pub mod human_workflow;
pub mod todo_planner;

use async_trait::async_trait;

use crate::agent::SubAgent;
use crate::errors::OrchestratorError;

/// Anything a [`base::BaseOrchestrator`] can invoke as a sub-agent step.
#[async_trait]
pub trait OrchestratorAgent: Send {
    fn name(&self) -> &str;

    /// When true, the base orchestrator does not wrap this call with its own
    /// `OrchestratorAgentStart`/`OrchestratorAgentEnd` — the callee already emits equivalent
    /// events for its own internal sub-agents (§4.12's "opaque agent, no base agent").
    fn emits_own_events(&self) -> bool {
        false
    }

    async fn run(&mut self, input: &str) -> Result<String, OrchestratorError>;
}

#[async_trait]
impl OrchestratorAgent for SubAgent {
    fn name(&self) -> &str {
        SubAgent::name(self)
    }

    async fn run(&mut self, input: &str) -> Result<String, OrchestratorError> {
        SubAgent::run(self, input).await
    }
}
