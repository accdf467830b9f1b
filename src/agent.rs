//! Generic sub-agent — the unit every orchestrator (C9-C13) drives.
//!
//! A [`SubAgent`] pairs an [`LlmSession`] with an optional [`ToolRegistry`] and a tool-call loop
//! grounded on the inherited `Agent::send`: tool descriptions get folded into the turn's prompt
//! text, the model is asked to reply with a `{"tool_call": {...}}` JSON envelope to invoke one,
//! and plain text ends the turn. Unlike the inherited `Agent`, this type never emits
//! `OrchestratorAgentStart`/`OrchestratorAgentEnd` itself — §4.9 makes that the base
//! orchestrator's job, wrapped around every `SubAgent::run` call it makes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::client_wrapper::ToolDefinition;
use crate::errors::OrchestratorError;
use crate::event::{new_correlation_id, EventBus, EventKind, RuntimeEvent};
use crate::llm_session::LlmSession;
use crate::tools::{ToolArg, ToolRegistry};

const MAX_TOOL_ITERATIONS: u32 = 5;

/// Call-scoped context threaded through every sub-orchestrator and into every agent prompt as a
/// template variable (§4.11). Never persisted — always passed down from the workflow-level call,
/// not read back out of storage.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorContext {
    pub objective: String,
    pub workspace_path: String,
    pub phase: String,
    pub iteration: u32,
}

impl OrchestratorContext {
    /// Substitutes `{{objective}}` / `{{workspace_path}}` placeholders in a prompt template.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{{objective}}", &self.objective)
            .replace("{{workspace_path}}", &self.workspace_path)
    }
}

/// A named LLM-backed worker with optional tool access.
pub struct SubAgent {
    name: String,
    system_prompt_template: String,
    session: LlmSession,
    tools: Option<Arc<ToolRegistry>>,
    bus: Arc<EventBus>,
    context: OrchestratorContext,
}

impl SubAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt_template: impl Into<String>,
        session: LlmSession,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt_template: system_prompt_template.into(),
            session,
            tools: None,
            bus,
            context: OrchestratorContext::default(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set right before invocation by the owning orchestrator (§4.9).
    pub fn set_context(&mut self, context: OrchestratorContext) {
        self.context = context;
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        match &self.tools {
            Some(registry) => registry
                .descriptors()
                .into_iter()
                .map(|d| ToolDefinition {
                    name: d.name,
                    description: d.description,
                    parameters_schema: d.parameters_schema,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Runs one logical turn: sends `input`, executes any requested tool calls in a bounded loop,
    /// and returns the final assistant text. Emits `LlmCallStart/End` and `ToolCallStart/End/Error`
    /// but no orchestrator-agent events — the caller owns those.
    pub async fn run(&mut self, input: &str) -> Result<String, OrchestratorError> {
        self.session
            .set_system_prompt(self.context.render(&self.system_prompt_template));

        let tool_definitions = self.tool_definitions();
        let mut turn_input = self.context.render(input);
        if let Some(registry) = &self.tools {
            let descriptors = registry.descriptors();
            if !descriptors.is_empty() {
                turn_input.push_str("\n\nYou have access to the following tools:\n");
                for d in &descriptors {
                    turn_input.push_str(&format!(
                        "- {}: {}\n  Parameters schema: {}\n",
                        d.name, d.description, d.parameters_schema
                    ));
                }
                turn_input.push_str(
                    "\nTo use a tool, respond with ONLY a JSON object of the form \
                     {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}. \
                     Otherwise respond with your final answer as plain text.\n",
                );
            }
        }

        let mut iteration = 0u32;
        loop {
            iteration += 1;
            log::debug!("agent '{}' turn {} ({} chars in)", self.name, iteration, turn_input.len());
            self.bus
                .emit(RuntimeEvent::new(EventKind::LlmCallStart {
                    agent_name: self.name.clone(),
                    iteration,
                }))
                .await;

            let message = crate::client_wrapper::Message {
                role: crate::client_wrapper::Role::User,
                content: Arc::from(turn_input.clone()),
                tool_calls: Vec::new(),
            };

            let response = self
                .session
                .send(message, Some(tool_definitions.clone()))
                .await
                .map_err(|e| OrchestratorError::ExecutionFailed(format!("{}: {}", self.name, e)))?;

            let tokens_used = self
                .session
                .last_usage()
                .await
                .map(|u| u.total_tokens)
                .unwrap_or(0);
            self.bus
                .emit(RuntimeEvent::new(EventKind::LlmCallEnd {
                    agent_name: self.name.clone(),
                    iteration,
                    tokens_used,
                    response_length: response.content.len(),
                }))
                .await;

            log::info!(
                "agent '{}' responded ({} chars, {} tokens)",
                self.name,
                response.content.len(),
                tokens_used
            );

            let content = response.content.to_string();

            let parsed = if iteration < MAX_TOOL_ITERATIONS {
                self.tools.as_ref().and_then(|_| parse_tool_call(&content))
            } else {
                None
            };

            match parsed {
                Some(call) => {
                    let registry = self.tools.as_ref().expect("tool call parsed without a registry");
                    log::debug!("agent '{}' calling tool '{}'", self.name, call.name);
                    let correlation_id = new_correlation_id();
                    self.bus
                        .emit(
                            RuntimeEvent::new(EventKind::ToolCallStart {
                                agent_name: self.name.clone(),
                                tool_name: call.name.clone(),
                                parameters: call.parameters.clone(),
                            })
                            .with_correlation_id(correlation_id.clone()),
                        )
                        .await;

                    let started = Instant::now();
                    let args = json_object_to_args(&call.parameters);
                    let result = registry.call(&call.name, args).await;
                    let duration_ms = started.elapsed().as_millis() as u64;

                    match result {
                        Ok(value) => {
                            let result_json = value.to_json();
                            self.bus
                                .emit(
                                    RuntimeEvent::new(EventKind::ToolCallEnd {
                                        agent_name: self.name.clone(),
                                        tool_name: call.name.clone(),
                                        success: true,
                                        duration_ms,
                                        result: result_json.clone(),
                                    })
                                    .with_correlation_id(correlation_id),
                                )
                                .await;
                            turn_input = format!("Tool `{}` returned: {}", call.name, result_json);
                        }
                        Err(err) => {
                            log::error!("agent '{}' tool '{}' failed: {}", self.name, call.name, err);
                            self.bus
                                .emit(
                                    RuntimeEvent::new(EventKind::ToolCallError {
                                        agent_name: self.name.clone(),
                                        tool_name: call.name.clone(),
                                        error: err.to_string(),
                                    })
                                    .with_correlation_id(correlation_id),
                                )
                                .await;
                            turn_input = format!(
                                "Tool `{}` failed: {}. Try another approach or give your final answer.",
                                call.name, err
                            );
                        }
                    }
                    continue;
                }
                None => return Ok(content),
            }
        }
    }
}

struct ParsedToolCall {
    name: String,
    parameters: serde_json::Value,
}

fn parse_tool_call(text: &str) -> Option<ParsedToolCall> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    let call = value.get("tool_call")?;
    let name = call.get("name")?.as_str()?.to_string();
    let parameters = call.get("parameters").cloned().unwrap_or_else(|| serde_json::json!({}));
    Some(ParsedToolCall { name, parameters })
}

fn json_object_to_args(value: &serde_json::Value) -> HashMap<String, ToolArg> {
    match value.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), ToolArg::from_json(v.clone())))
            .collect(),
        None => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::ScriptedProvider;
    use crate::errors::ToolError;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl crate::tools::Tool for EchoTool {
        fn descriptor(&self) -> crate::tools::ToolDescriptor {
            crate::tools::ToolDescriptor {
                name: "echo".to_string(),
                description: "echoes the `text` parameter back".to_string(),
                parameters_schema: serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            }
        }

        async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
            args.get("text")
                .cloned()
                .ok_or_else(|| ToolError::InvalidParameters("missing `text`".to_string()))
        }
    }

    fn new_agent(replies: Vec<&str>, tools: Option<Arc<ToolRegistry>>) -> (SubAgent, Arc<EventBus>) {
        let provider = Arc::new(ScriptedProvider::with_replies(replies));
        let session = LlmSession::new(provider, "you are a test agent", 10_000);
        let bus = Arc::new(EventBus::new());
        let mut agent = SubAgent::new("tester", "System: {{objective}}", session, bus.clone());
        if let Some(t) = tools {
            agent = agent.with_tools(t);
        }
        (agent, bus)
    }

    #[tokio::test]
    async fn plain_text_reply_ends_the_turn_immediately() {
        let (mut agent, bus) = new_agent(vec!["the final answer"], None);
        let result = agent.run("do the thing").await.unwrap();
        assert_eq!(result, "the final answer");
        assert_eq!(bus.emitted_count(), 2); // LlmCallStart + LlmCallEnd, no tool events
    }

    #[tokio::test]
    async fn tool_call_is_executed_and_result_fed_back_into_the_next_turn() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let registry = Arc::new(registry);

        let tool_call_reply = r#"{"tool_call": {"name": "echo", "parameters": {"text": "hi"}}}"#;
        let (mut agent, bus) = new_agent(vec![tool_call_reply, "done"], Some(registry));

        let result = agent.run("please echo").await.unwrap();
        assert_eq!(result, "done");
        assert!(bus.emitted_count() >= 4); // 2x LlmCall + ToolCallStart + ToolCallEnd
    }

    #[tokio::test]
    async fn tool_call_loop_terminates_after_the_iteration_cap() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let registry = Arc::new(registry);

        let tool_call_reply = r#"{"tool_call": {"name": "echo", "parameters": {"text": "again"}}}"#;
        let replies = vec![tool_call_reply; MAX_TOOL_ITERATIONS as usize];
        let (mut agent, _bus) = new_agent(replies, Some(registry));

        // After hitting the cap, the loop stops trying to parse tool calls and just returns the
        // last raw response text instead of looping forever.
        let result = agent.run("keep echoing").await.unwrap();
        assert_eq!(result, tool_call_reply);
    }

    #[tokio::test]
    async fn context_placeholders_are_rendered_into_the_system_prompt() {
        let (mut agent, _bus) = new_agent(vec!["ok"], None);
        agent.set_context(OrchestratorContext {
            objective: "ship the feature".to_string(),
            workspace_path: "/workspace".to_string(),
            phase: "execute".to_string(),
            iteration: 1,
        });
        let _ = agent.run("go").await.unwrap();
        // set_system_prompt happened inside run(); verifying the render helper directly is the
        // stable assertion since LlmSession doesn't expose the rendered prompt back out.
        assert_eq!(
            agent.context.render("System: {{objective}}"),
            "System: ship the feature"
        );
    }
}
