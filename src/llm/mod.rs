//! Chat completion client for analysis extraction
//!
//! Talks to an OpenAI-compatible `/v1/chat/completions` endpoint. Requests
//! are capped at a configured rate with a direct governor limiter shared
//! across all callers of one client.

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ChatClient {
    client: Client,
    url: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
    limiter: DirectLimiter,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let url = Url::parse(&config.url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        let limiter = RateLimiter::direct(Quota::per_second(rps));

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            limiter,
        })
    }

    /// Run one completion and return the assistant message content
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.limiter.until_ready().await;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "Sending chat completion request");
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("status {}: {}", status, body)));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Chat("Response contained no completion".to_string()))
    }
}

/// Extract the first top-level JSON object from a completion.
///
/// Models frequently wrap JSON in prose or markdown fences; scanning for a
/// balanced `{ ... }` is more robust than parsing the whole message.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ChatConfig {
        ChatConfig {
            url: format!("{}/v1/chat/completions", server.uri()),
            ..ChatConfig::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "the answer" } }
                ]
            })))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server)).unwrap();
        let out = client.complete("system prompt", "user prompt").await.unwrap();
        assert_eq!(out, "the answer");
    }

    #[tokio::test]
    async fn test_error_status_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server)).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("backend exploded"));
    }

    #[test]
    fn test_extract_json_object_plain() {
        let text = r#"{"quote": "x", "confidence": 0.8}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_object_fenced() {
        let text = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nHope that helps!";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_json_object_braces_in_strings() {
        let text = r#"prefix {"quote": "he said {hello}", "n": 1} suffix"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"quote": "he said {hello}", "n": 1}"#)
        );
    }

    #[test]
    fn test_extract_json_object_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unbalanced"), None);
    }
}
