//! Conversational session bookkeeping on top of a [`ClientWrapper`] (C14).
//!
//! `LlmSession` owns the message history, a length-bounded trimming strategy, and last-turn
//! token accounting. It is the only thing the orchestrators (C9-C13) and the planner sub-agents
//! call into for text generation; providers themselves stay stateless per [`ClientWrapper`].

use std::sync::Arc;

use crate::client_wrapper::{ClientWrapper, Message, Role, ToolDefinition, TokenUsage};

/// Estimates token count at one token per four bytes of content, plus a flat per-message
/// overhead for the role tag. This mirrors real tokenizer behavior closely enough to drive
/// trimming decisions without depending on a vendor-specific tokenizer crate.
fn estimate_tokens(message: &Message) -> usize {
    1 + (message.content.len() / 4).max(1)
}

/// A conversation with an LLM: system prompt plus a trimmed rolling history.
pub struct LlmSession {
    client: Arc<dyn ClientWrapper>,
    system_prompt: Message,
    history: Vec<Message>,
    max_tokens: usize,
    token_count: usize,
}

impl LlmSession {
    /// Creates a session with a fresh history. `max_tokens` bounds the system prompt plus
    /// history; once exceeded, oldest messages are evicted first.
    pub fn new(client: Arc<dyn ClientWrapper>, system_prompt: impl Into<String>, max_tokens: usize) -> Self {
        let system_prompt = Message {
            role: Role::System,
            content: Arc::from(system_prompt.into()),
            tool_calls: Vec::new(),
        };
        let token_count = estimate_tokens(&system_prompt);
        Self {
            client,
            system_prompt,
            history: Vec::new(),
            max_tokens,
            token_count,
        }
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let old_tokens = estimate_tokens(&self.system_prompt);
        self.system_prompt = Message {
            role: Role::System,
            content: Arc::from(prompt.into()),
            tool_calls: Vec::new(),
        };
        self.token_count = self.token_count - old_tokens + estimate_tokens(&self.system_prompt);
    }

    /// Appends `message`, sends the full (system prompt + history) transcript, and records the
    /// assistant reply in history. `tools` is forwarded verbatim to the provider so that native
    /// function-calling results come back on the reply's `tool_calls`.
    pub async fn send(
        &mut self,
        message: Message,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        self.token_count += estimate_tokens(&message);
        self.history.push(message);
        self.trim();

        let mut request = Vec::with_capacity(self.history.len() + 1);
        request.push(self.system_prompt.clone());
        request.extend(self.history.iter().cloned());

        let response = self.client.send_message(&request, tools).await?;

        self.token_count += estimate_tokens(&response);
        self.history.push(response.clone());
        self.trim();

        Ok(response)
    }

    /// Convenience wrapper for a plain `Role::User` turn with no tool schema.
    pub async fn send_message(&mut self, content: impl Into<String>) -> Result<Message, Box<dyn std::error::Error>> {
        let message = Message {
            role: Role::User,
            content: Arc::from(content.into()),
            tool_calls: Vec::new(),
        };
        self.send(message, None).await
    }

    pub async fn last_usage(&self) -> Option<TokenUsage> {
        self.client.get_last_usage().await
    }

    fn trim(&mut self) {
        while self.token_count > self.max_tokens && !self.history.is_empty() {
            let removed = self.history.remove(0);
            self.token_count -= estimate_tokens(&removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    struct StubClient {
        reply: String,
        usage_slot: Mutex<Option<TokenUsage>>,
        seen_request_lens: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl ClientWrapper for StubClient {
        async fn send_message(
            &self,
            messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn std::error::Error>> {
            self.seen_request_lens.lock().unwrap().push(messages.len());
            Ok(Message {
                role: Role::Assistant,
                content: Arc::from(self.reply.clone()),
                tool_calls: Vec::new(),
            })
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
            Some(&self.usage_slot)
        }
    }

    #[tokio::test]
    async fn send_message_includes_system_prompt_and_records_history() {
        let client = Arc::new(StubClient {
            reply: "hi there".to_string(),
            usage_slot: Mutex::new(None),
            seen_request_lens: StdMutex::new(Vec::new()),
        });
        let mut session = LlmSession::new(client, "be helpful", 10_000);

        let reply = session.send_message("hello").await.unwrap();
        assert_eq!(&*reply.content, "hi there");
        assert_eq!(session.history().len(), 2); // user turn + assistant reply
    }

    #[tokio::test]
    async fn long_history_is_trimmed_to_the_token_budget() {
        let client = Arc::new(StubClient {
            reply: "ok".to_string(),
            usage_slot: Mutex::new(None),
            seen_request_lens: StdMutex::new(Vec::new()),
        });
        // A tiny budget forces eviction after just a couple of turns.
        let mut session = LlmSession::new(client, "sys", 20);

        for i in 0..10 {
            session.send_message(format!("message number {i} with some padding text")).await.unwrap();
        }

        assert!(session.history().len() < 20);
    }
}
