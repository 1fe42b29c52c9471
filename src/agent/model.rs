//! Chat-completions client for the custom agent
//!
//! Speaks the OpenAI-compatible `/v1/chat/completions` dialect, which local
//! servers (Ollama, llama.cpp, vLLM) and hosted providers all accept.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{AgentError, AgentResult};
use crate::CustomAgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Anything that turns a conversation into the next assistant reply.
/// Blocks until the reply is complete; timeouts are the implementor's job.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AgentResult<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u64,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible endpoint
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u64,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &CustomAgentConfig) -> AgentResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            AgentError::Model(format!("Invalid model endpoint '{}': {}", config.endpoint, e))
        })?;

        let api_key = match config.api_key_env.as_deref() {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                AgentError::Model(format!("Environment variable {var} for the model API key is not set"))
            })?),
            None => None,
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Model(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> AgentResult<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let mut req = self.http.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AgentError::Model(format!("Request to {} failed: {}", self.endpoint, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!("Model endpoint returned {status}: {body}")));
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("Unexpected completion response: {e}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::Model("Completion response had no choices".into()))?;

        debug!("Model {} replied with {} characters", self.model, content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_openai_shape() {
        let messages = vec![
            ChatMessage::new(ChatRole::System, "be brief"),
            ChatMessage::new(ChatRole::User, "hi"),
        ];
        let request = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 10,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn response_parses_first_choice() {
        let json = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"yo"}}]}"#;
        let body: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("yo"));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let config = CustomAgentConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            ChatCompletionsClient::from_config(&config),
            Err(AgentError::Model(_))
        ));
    }

    #[test]
    fn missing_api_key_variable_is_reported() {
        let config = CustomAgentConfig {
            api_key_env: Some("AGENT_RELAY_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        };
        let err = ChatCompletionsClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("AGENT_RELAY_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
