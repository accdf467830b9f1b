//! OpenAI Chat Completions client that captures token usage statistics.
//!
//! The reference real vendor adapter for C14 (§4.14): every request, tool-call or not, goes
//! through [`send_with_native_tools`] against an OpenAI-compatible `/chat/completions` endpoint.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cloudllm::clients::openai::{OpenAIClient, Model};
//! use cloudllm::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() {
//!     let secret_key: String = std::env::var("OPEN_AI_SECRET").expect("OPEN_AI_SECRET not set");
//!     let client = OpenAIClient::new_with_model_enum(&secret_key, Model::GPT41Nano);
//!
//!     let resp = client.send_message(&[
//!         Message { role: Role::System, content: Arc::from("You are an assistant."), tool_calls: vec![] },
//!         Message { role: Role::User, content: Arc::from("Hello!"), tool_calls: vec![] },
//!     ], None).await.unwrap();
//!     println!("Assistant: {}", resp.content);
//!
//!     if let Some(usage) = client.get_last_usage().await {
//!         println!("Tokens — input: {}, output: {}, total: {}", usage.input_tokens, usage.output_tokens, usage.total_tokens);
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client_wrapper::{ClientWrapper, Message, TokenUsage, ToolDefinition};
use crate::clients::common::{get_shared_http_client, send_with_native_tools};

/// Official model identifiers supported by OpenAI's Chat Completions API.
#[allow(non_camel_case_types)]
pub enum Model {
    /// `gpt-5.1` – flagship for coding and agentic tasks with configurable reasoning effort.
    GPT51,
    /// `gpt-5` – high-reasoning, medium latency, text or multimodal input.
    GPT5,
    /// `gpt-5-mini` – fast variant of GPT-5 with balanced cost and quality.
    GPT5Mini,
    /// `gpt-5-nano` – lowest latency GPT-5 configuration.
    GPT5Nano,
    /// `gpt-4o` – Omni model with text + image inputs.
    GPT4o,
    /// `gpt-4o-mini` – cost effective GPT-4o derivative.
    GPt4oMini,
    /// `gpt-4.1` – general availability GPT-4.1.
    GPT41,
    /// `gpt-4.1-mini` – reduced cost GPT-4.1 tier.
    GPT41Mini,
    /// `gpt-4.1-nano` – ultra low cost GPT-4.1 derivative.
    GPT41Nano,
}

/// Convert a [`Model`] variant into the string identifier expected by the REST API.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT51 => "gpt-5.1".to_string(),
        Model::GPT5 => "gpt-5".to_string(),
        Model::GPT5Mini => "gpt-5-mini".to_string(),
        Model::GPT5Nano => "gpt-5-nano".to_string(),
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPt4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
    }
}

/// Client wrapper for OpenAI's Chat Completions API.
///
/// Maintains the selected model identifier plus a [`TokenUsage`] slot so callers can inspect how
/// many tokens each request consumed. Reuses the shared HTTP client pool from
/// [`crate::clients::common`].
pub struct OpenAIClient {
    base_url: String,
    api_key: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and [`Model`] variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// Construct a new client using the provided API key and explicit model name.
    ///
    /// Accepts arbitrary identifiers so OpenAI-compatible self-hosted deployments work too.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, "https://api.openai.com/v1")
    }

    /// Construct a client targeting a custom OpenAI-compatible base URL.
    /// `base_url` should not have a trailing slash (e.g. `"https://api.openai.com/v1"`).
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: secret_key.to_string(),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Convenience helper wrapping [`OpenAIClient::new_with_base_url`] for strongly typed models.
    pub fn new_with_base_url_and_model_enum(secret_key: &str, model: Model, base_url: &str) -> Self {
        Self::new_with_base_url(secret_key, &model_to_string(model), base_url)
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let tools = tools.unwrap_or_default();
        let result = send_with_native_tools(
            &self.base_url,
            &self.api_key,
            &self.model,
            messages,
            &tools,
            get_shared_http_client(),
            &self.token_usage,
        )
        .await;

        if let Err(ref e) = result {
            if log::log_enabled!(log::Level::Error) {
                log::error!("OpenAIClient::send_message(...): {}", e);
            }
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_enum_maps_to_the_documented_wire_identifier() {
        assert_eq!(model_to_string(Model::GPT41Nano), "gpt-4.1-nano");
        assert_eq!(model_to_string(Model::GPT4o), "gpt-4o");
    }

    #[test]
    fn custom_base_url_has_trailing_slash_trimmed() {
        let client = OpenAIClient::new_with_base_url("key", "gpt-4.1-nano", "http://localhost:9000/v1/");
        assert_eq!(client.base_url, "http://localhost:9000/v1");
    }
}
