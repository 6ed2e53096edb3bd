use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::history::Message;

/// Hosted chat-completions router (OpenAI-compatible).
pub const DEFAULT_API_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2:featherless-ai";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: u32 = 256;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.95;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("inference response carried no completion: {body}")]
    Malformed { body: String },
}

/// Seam between the chat controller and whatever produces replies.
#[async_trait]
pub trait Inference {
    async fn chat(&self, model: &str, messages: &[Message]) -> Result<String, InferenceError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    api_url: String,
    token: String,
}

impl InferenceClient {
    pub fn new(api_url: &str, token: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.to_string(),
            token: token.to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "mistralai/Mistral-7B-Instruct-v0.2:featherless-ai".to_string(),
            "mistralai/Mistral-7B-Instruct-v0.3:featherless-ai".to_string(),
            "Qwen/Qwen2.5-72B-Instruct:featherless-ai".to_string(),
        ]
    }
}

#[async_trait]
impl Inference for InferenceClient {
    /// One attempt per turn, whole reply or nothing. The full message
    /// sequence goes out on every call; the endpoint is stateless.
    async fn chat(&self, model: &str, messages: &[Message]) -> Result<String, InferenceError> {
        let request = ChatCompletionRequest {
            model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let body = response.text().await?;
        reply_from(&body)
    }
}

fn reply_from(body: &str) -> Result<String, InferenceError> {
    let completion: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|_| InferenceError::Malformed {
            body: body.to_string(),
        })?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| InferenceError::Malformed {
            body: body.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn reply_is_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"4"}}]}"#;
        assert_eq!(reply_from(body).unwrap(), "4");
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = reply_from(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Malformed { .. }));
    }

    #[test]
    fn missing_completion_field_is_malformed() {
        let err = reply_from(r#"{"error":"overloaded"}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Malformed { body } if body.contains("overloaded")));
    }

    #[test]
    fn request_body_carries_fixed_generation_parameters() {
        let messages = vec![Message {
            role: Role::User,
            content: "hi".to_string(),
        }];
        let request = ChatCompletionRequest {
            model: DEFAULT_MODEL,
            messages: &messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };

        let value: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["max_tokens"], 256);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["model"], DEFAULT_MODEL);
    }
}
