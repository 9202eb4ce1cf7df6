use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One single-message completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: &'static str,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Returns the first choice's content, or `None` when the model sent none.
    async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, AiError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiTransport {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, AiError> {
        let body = ChatCompletionsRequest {
            model: request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|error| AiError::Transport {
                message: error.to_string(),
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|error| AiError::Transport {
            message: error.to_string(),
        })?;
        if !status.is_success() {
            return Err(AiError::Transport {
                message: format!(
                    "openai_http_{status}:{}",
                    String::from_utf8_lossy(&bytes).trim()
                ),
            });
        }

        let parsed: ChatCompletionsResponse =
            serde_json::from_slice(&bytes).map_err(|error| AiError::Transport {
                message: format!("openai_json_decode_failed:{error}"),
            })?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[tokio::test]
    async fn posts_single_user_message_with_bearer_key() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let bearer = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": format!(
                                "{}|{}|{}|{}",
                                bearer,
                                body["model"].as_str().unwrap_or_default(),
                                body["messages"][0]["role"].as_str().unwrap_or_default(),
                                body["max_tokens"],
                            ),
                        }
                    }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let transport = OpenAiTransport::new(&format!("http://{addr}/"), "sk-test");
        let content = transport
            .complete(CompletionRequest {
                model: "gpt-4",
                prompt: "hello".to_string(),
                temperature: 0.3,
                max_tokens: 1000,
            })
            .await?;
        assert_eq!(content.as_deref(), Some("Bearer sk-test|gpt-4|user|1000"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_choice_list_is_no_content() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let transport = OpenAiTransport::new(&format!("http://{addr}"), "sk-test");
        let content = transport
            .complete(CompletionRequest {
                model: "gpt-4",
                prompt: "hello".to_string(),
                temperature: 0.3,
                max_tokens: 10,
            })
            .await?;
        assert_eq!(content, None);
        Ok(())
    }
}
