use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{BackendError, ChatMessage, CompletionBackend};

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK => {
                let content = resp.text().await?;
                extract_text(&content)
            }
            other => {
                let content = resp.text().await.unwrap_or_default();
                Err(BackendError::Status(other, content))
            }
        }
    }
}

fn extract_text(content: &str) -> Result<String, BackendError> {
    let response: ChatCompletionResponse = serde_json::from_str(content)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(BackendError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critique::Role;

    #[test]
    fn test_extract_text() {
        let content = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Buy wards."}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        assert_eq!(extract_text(content).unwrap(), "Buy wards.");
    }

    #[test]
    fn test_extract_text_failures() {
        assert!(matches!(
            extract_text(r#"{"choices": []}"#),
            Err(BackendError::Empty)
        ));
        let blank = r#"{"choices": [{"message": {"role": "assistant", "content": "  "}}]}"#;
        assert!(matches!(extract_text(blank), Err(BackendError::Empty)));
        assert!(matches!(
            extract_text(r#"{"error": {"message": "quota"}}"#),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let messages = [ChatMessage::new(Role::User, "hi")];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 400,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["temperature"], 0.5);
    }
}
