//! Human-Controlled Workflow — C11.
//!
//! A state machine driven by an external [`WorkflowStatus`] rather than by the orchestrator's own
//! control flow — grounded on the same phase-by-phase bookkeeping style as
//! `orchestration.rs::execute_ralph`'s checklist loop, but the "next step" decision comes from
//! persisted status instead of in-memory task completion markers (§4.11). The objective is never
//! read back from the status store — only ever passed in by the caller — and the workspace path is
//! extracted from it once, at the top of a run, then threaded into every sub-orchestrator call.

use std::sync::Arc;

use crate::agent::{OrchestratorContext, SubAgent};
use crate::errors::OrchestratorError;
use crate::event::{new_correlation_id, EventKind, RuntimeEvent};
use crate::orchestrator::base::BaseOrchestrator;
use crate::orchestrator::conditional::ConditionalLlm;
use crate::orchestrator::todo_planner::TodoPlanner;
use crate::workflow_status::{WorkflowStatus, WorkflowStatusStore};

/// Extracts the workspace path from the free-form objective text: the first whitespace-delimited
/// token that looks like an absolute path, or `"."` if none is present. This is an Open Question
/// resolution (SPEC_FULL.md §9) — the spec names the requirement but not the extraction rule.
fn extract_workspace_path(objective: &str) -> String {
    objective
        .split_whitespace()
        .find(|token| token.starts_with('/'))
        .unwrap_or(".")
        .trim_end_matches(|c: char| c == '.' || c == ',')
        .to_string()
}

pub struct HumanControlledWorkflow {
    base: BaseOrchestrator,
    status_store: Arc<dyn WorkflowStatusStore>,
    todo_planner: TodoPlanner,
    execution_agent: SubAgent,
    validation_agent: SubAgent,
    update_agent: SubAgent,
    critique_agent: SubAgent,
    refine_agent: SubAgent,
    conditional: ConditionalLlm,
    max_refinement_iterations: u32,
}

impl HumanControlledWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: BaseOrchestrator,
        status_store: Arc<dyn WorkflowStatusStore>,
        todo_planner: TodoPlanner,
        execution_agent: SubAgent,
        validation_agent: SubAgent,
        update_agent: SubAgent,
        critique_agent: SubAgent,
        refine_agent: SubAgent,
        conditional: ConditionalLlm,
        max_refinement_iterations: u32,
    ) -> Self {
        Self {
            base,
            status_store,
            todo_planner,
            execution_agent,
            validation_agent,
            update_agent,
            critique_agent,
            refine_agent,
            conditional,
            max_refinement_iterations,
        }
    }

    pub async fn execute(&mut self, workflow_id: &str, objective: &str) -> Result<String, OrchestratorError> {
        let workspace_path = extract_workspace_path(objective);
        let started = self.base.emit_start("human_workflow", objective).await;
        let result = self.run(workflow_id, objective, &workspace_path).await;
        match &result {
            Ok(_) => self.base.emit_end("human_workflow", started, true).await,
            Err(e) => {
                self.base.emit_error("human_workflow", &e.to_string()).await;
                self.base.emit_end("human_workflow", started, false).await;
            }
        }
        result
    }

    async fn run(
        &mut self,
        workflow_id: &str,
        objective: &str,
        workspace_path: &str,
    ) -> Result<String, OrchestratorError> {
        let status = self
            .status_store
            .get(workflow_id)
            .await
            .map(|r| r.status)
            .unwrap_or(WorkflowStatus::PreVerification);

        log::debug!("human_workflow '{}' resumed in status {}", workflow_id, status.as_str());

        match status {
            WorkflowStatus::PreVerification => {
                self.todo_planner.set_workspace_path(workspace_path.to_string());
                let todo_markdown = self.base.run_agent(&mut self.todo_planner, objective).await?;

                log::info!("human_workflow '{}' requesting human feedback on proposed todo list", workflow_id);
                self.base
                    .bus()
                    .emit(RuntimeEvent::new(EventKind::RequestHumanFeedback {
                        request_id: new_correlation_id(),
                        message_for_user: todo_markdown,
                    }))
                    .await;

                Ok("awaiting human verification of the proposed todo list".to_string())
            }

            WorkflowStatus::PostVerification => {
                let mut ctx = OrchestratorContext {
                    objective: objective.to_string(),
                    workspace_path: workspace_path.to_string(),
                    phase: "execute".to_string(),
                    iteration: 0,
                };

                self.execution_agent.set_context(ctx.clone());
                let execution = self
                    .base
                    .run_agent(&mut self.execution_agent, "Execute the next unchecked todo item.")
                    .await?;

                ctx.phase = "validate".to_string();
                self.validation_agent.set_context(ctx.clone());
                let validation = self.base.run_agent(&mut self.validation_agent, &execution).await?;

                ctx.phase = "update".to_string();
                self.update_agent.set_context(ctx);
                self.base
                    .run_agent(
                        &mut self.update_agent,
                        &format!("Execution:\n{}\n\nValidation:\n{}", execution, validation),
                    )
                    .await?;

                self.status_store
                    .set(workflow_id, WorkflowStatus::PostVerificationTodoRefinement)
                    .await;
                log::info!(
                    "human_workflow '{}' moved to {}",
                    workflow_id,
                    WorkflowStatus::PostVerificationTodoRefinement.as_str()
                );
                Ok("executed and validated the next todo item; moving to refinement".to_string())
            }

            WorkflowStatus::PostVerificationTodoRefinement => {
                let mut refined = String::new();

                for iteration in 1..=self.max_refinement_iterations {
                    let ctx = OrchestratorContext {
                        objective: objective.to_string(),
                        workspace_path: workspace_path.to_string(),
                        phase: "refine".to_string(),
                        iteration,
                    };

                    self.critique_agent.set_context(ctx.clone());
                    let critique = self.base.run_agent(&mut self.critique_agent, &refined).await?;

                    self.refine_agent.set_context(ctx);
                    refined = self.base.run_agent(&mut self.refine_agent, &critique).await?;

                    let (keep_refining, reason) = self
                        .conditional
                        .decide(&refined, "Does the todo list need another refinement iteration?")
                        .await;
                    if !keep_refining {
                        log::info!("human_workflow '{}' refinement stopping after iteration {} ({})", workflow_id, iteration, reason);
                        break;
                    }
                }

                self.status_store.set(workflow_id, WorkflowStatus::Completed).await;
                log::info!("human_workflow '{}' moved to {}", workflow_id, WorkflowStatus::Completed.as_str());
                Ok(refined)
            }

            WorkflowStatus::Completed => Ok("workflow already completed".to_string()),
        }
    }
}
