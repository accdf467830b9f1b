//! Conditional LLM — C13.
//!
//! Grounded on `orchestration.rs::calculate_convergence_score`/`jaccard_similarity`'s role as a
//! continue/stop gate between iterations, but replaces the heuristic word-overlap score with a
//! single LLM call asked to make the continue/stop judgment directly (§4.13). Never fails: a
//! response that doesn't parse as the expected decision shape is treated as "stop, undecided"
//! rather than propagated as an error.

use std::sync::Arc;

use crate::event::{EventBus, EventKind, RuntimeEvent};
use crate::llm_session::LlmSession;

pub struct ConditionalLlm {
    session: LlmSession,
    bus: Arc<EventBus>,
}

impl ConditionalLlm {
    pub fn new(session: LlmSession, bus: Arc<EventBus>) -> Self {
        Self { session, bus }
    }

    /// Asks the model `question` given `context` and returns `(continue, reason)`. Emits exactly
    /// one `LlmCallEnd` event for the decision call and no start event — this is a single
    /// judgment call, not a full agent turn (§4.13).
    pub async fn decide(&mut self, context: &str, question: &str) -> (bool, String) {
        let prompt = format!(
            "Context:\n{}\n\nQuestion: {}\n\n\
             Respond with ONLY a JSON object of the form {{\"continue\": true|false, \"reason\": \"...\"}}.",
            context, question
        );

        let response = match self.session.send_message(prompt).await {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("conditional_llm call failed, defaulting to stop: {}", e);
                self.emit_end(0).await;
                return (false, "undecided".to_string());
            }
        };

        let tokens_used = self
            .session
            .last_usage()
            .await
            .map(|u| u.total_tokens)
            .unwrap_or(0);
        let response_length = response.content.len();
        self.emit_end_with_length(tokens_used, response_length).await;

        let decision = parse_decision(&response.content);
        if decision.is_none() {
            log::warn!("conditional_llm reply did not parse, defaulting to stop: {:?}", response.content);
        }
        let (cont, reason) = decision.unwrap_or_else(|| (false, "undecided".to_string()));
        log::debug!("conditional_llm decided continue={} ({})", cont, reason);
        (cont, reason)
    }

    async fn emit_end(&self, tokens_used: usize) {
        self.emit_end_with_length(tokens_used, 0).await;
    }

    async fn emit_end_with_length(&self, tokens_used: usize, response_length: usize) {
        self.bus
            .emit(RuntimeEvent::new(EventKind::LlmCallEnd {
                agent_name: "conditional_llm".to_string(),
                iteration: 1,
                tokens_used,
                response_length,
            }))
            .await;
    }
}

fn parse_decision(text: &str) -> Option<(bool, String)> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    let cont = value.get("continue")?.as_bool()?;
    let reason = value
        .get("reason")
        .and_then(|r| r.as_str())
        .unwrap_or("")
        .to_string();
    Some((cont, reason))
}
