//! AI-Controlled Orchestrator — C10.
//!
//! Grounded on `orchestration.rs::execute_ralph`'s iteration-bookkeeping loop (task checklist,
//! append-only message history, per-iteration agent calls), replacing RALPH's task-completion
//! markers with a plan/execute/validate/organize round gated by a [`ConditionalLlm`] decision
//! instead of marker-counting (§4.10).

use crate::agent::{OrchestratorContext, SubAgent};
use crate::errors::OrchestratorError;
use crate::orchestrator::base::BaseOrchestrator;
use crate::orchestrator::conditional::ConditionalLlm;

/// One completed plan/execute/validate/organize round, kept so later iterations' planning step
/// can see everything that came before (§4.10: "history append-only, visible to next iteration").
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: u32,
    pub planning: String,
    pub execution: String,
    pub validation: String,
    pub organization: String,
}

pub struct AiControlledOrchestrator {
    base: BaseOrchestrator,
    planning_agent: SubAgent,
    execution_agent: SubAgent,
    validation_agent: SubAgent,
    organizer_agent: SubAgent,
    report_agent: SubAgent,
    conditional: ConditionalLlm,
    max_iterations: u32,
}

impl AiControlledOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: BaseOrchestrator,
        planning_agent: SubAgent,
        execution_agent: SubAgent,
        validation_agent: SubAgent,
        organizer_agent: SubAgent,
        report_agent: SubAgent,
        conditional: ConditionalLlm,
        max_iterations: u32,
    ) -> Self {
        Self {
            base,
            planning_agent,
            execution_agent,
            validation_agent,
            organizer_agent,
            report_agent,
            conditional,
            max_iterations,
        }
    }

    /// Runs the plan/execute/validate/organize loop up to `max_iterations` times, then produces a
    /// final report from the accumulated history. `max_iterations` is an upper bound only — a
    /// `false` continue-decision terminates immediately without running that iteration's
    /// execute/validate/organize stages (§4.10).
    pub async fn execute(&mut self, objective: &str, workspace_path: &str) -> Result<String, OrchestratorError> {
        let started = self.base.emit_start("ai_controlled", objective).await;
        let result = self.run(objective, workspace_path).await;
        match &result {
            Ok(_) => self.base.emit_end("ai_controlled", started, true).await,
            Err(e) => {
                self.base.emit_error("ai_controlled", &e.to_string()).await;
                self.base.emit_end("ai_controlled", started, false).await;
            }
        }
        result
    }

    async fn run(&mut self, objective: &str, workspace_path: &str) -> Result<String, OrchestratorError> {
        let mut history: Vec<IterationRecord> = Vec::new();

        for iteration in 1..=self.max_iterations {
            log::info!("ai_controlled iteration {}/{}", iteration, self.max_iterations);
            let mut ctx = OrchestratorContext {
                objective: objective.to_string(),
                workspace_path: workspace_path.to_string(),
                phase: "plan".to_string(),
                iteration,
            };

            self.planning_agent.set_context(ctx.clone());
            let planning = self
                .base
                .run_agent(&mut self.planning_agent, &history_prompt(&history))
                .await?;

            let decide_context = format!("Objective: {}\n\nLatest plan:\n{}", objective, planning);
            let (should_continue, reason) = self
                .conditional
                .decide(&decide_context, "Should we continue executing this plan?")
                .await;
            if !should_continue {
                log::info!("ai_controlled stopping after iteration {} ({})", iteration, reason);
                break;
            }

            ctx.phase = "execute".to_string();
            self.execution_agent.set_context(ctx.clone());
            let execution = self.base.run_agent(&mut self.execution_agent, &planning).await?;

            ctx.phase = "validate".to_string();
            self.validation_agent.set_context(ctx.clone());
            let validation = self
                .base
                .run_agent(
                    &mut self.validation_agent,
                    &format!("Plan:\n{}\n\nExecution:\n{}", planning, execution),
                )
                .await?;

            ctx.phase = "organize".to_string();
            self.organizer_agent.set_context(ctx);
            let organization = self
                .base
                .run_agent(
                    &mut self.organizer_agent,
                    &format!(
                        "Plan:\n{}\n\nExecution:\n{}\n\nValidation:\n{}",
                        planning, execution, validation
                    ),
                )
                .await?;

            history.push(IterationRecord {
                iteration,
                planning,
                execution,
                validation,
                organization,
            });
        }

        let report_ctx = OrchestratorContext {
            objective: objective.to_string(),
            workspace_path: workspace_path.to_string(),
            phase: "report".to_string(),
            iteration: history.len() as u32,
        };
        self.report_agent.set_context(report_ctx);
        self.base
            .run_agent(&mut self.report_agent, &history_prompt(&history))
            .await
    }
}

fn history_prompt(history: &[IterationRecord]) -> String {
    if history.is_empty() {
        return "No prior iterations yet.".to_string();
    }
    let mut out = String::new();
    for record in history {
        out.push_str(&format!(
            "=== Iteration {} ===\nPlan: {}\nExecution: {}\nValidation: {}\nOrganization: {}\n\n",
            record.iteration, record.planning, record.execution, record.validation, record.organization
        ));
    }
    out
}
