//! External text classifier.
//!
//! The classifier answers a subscriber's question about a post in free-form
//! text. Deciding whether that answer is a match is not the classifier's job;
//! see [`tweetwatch_core::is_affirmative`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Answers a question about a piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the raw answer, normalized to trimmed lower case.
    async fn classify(&self, text: &str, criterion: &str) -> Result<String, ClassifierError>;
}

#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    async fn classify(&self, text: &str, criterion: &str) -> Result<String, ClassifierError> {
        (**self).classify(text, criterion).await
    }
}

/// The prompt sent for one post: the question, a newline, then the text.
pub fn compose_prompt(criterion: &str, text: &str) -> String {
    format!("{}\n{}", criterion.trim(), text)
}

/// Settings for [`OpenAiClassifier`].
#[derive(Clone)]
pub struct ClassifierConfig {
    pub api_key: String,
    /// Full URL of a chat-completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ClassifierConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 256,
            temperature: 0.5,
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

/// Classifier backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, text: &str, criterion: &str) -> Result<String, ClassifierError> {
        let prompt = compose_prompt(criterion, text);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout(e.to_string())
                } else {
                    ClassifierError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(&response.text().await.unwrap_or_default(), 320);
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ClassifierError::RateLimited(body));
            }
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Malformed("response has no choices".into()))?;

        Ok(answer.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer) -> OpenAiClassifier {
        let mut config = ClassifierConfig::new("sk-test");
        config.endpoint = format!("{}/v1/chat/completions", server.uri());
        OpenAiClassifier::new(config).unwrap()
    }

    #[test]
    fn test_compose_prompt() {
        assert_eq!(
            compose_prompt("  Is this about Rust? ", "Rust 1.80 released"),
            "Is this about Rust?\nRust 1.80 released"
        );
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let rendered = format!("{:?}", ClassifierConfig::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_classify_normalizes_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "messages": [{"role": "user", "content": "Is it a release?\nRust 1.80 is out"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Yes, it announces a release.\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = classifier(&server)
            .classify("Rust 1.80 is out", "Is it a release?")
            .await
            .unwrap();
        assert_eq!(answer, "yes, it announces a release.");
    }

    #[tokio::test]
    async fn test_classify_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let classifier = classifier(&server);
        let first = classifier.classify("t", "q").await.unwrap_err();
        assert!(matches!(first, ClassifierError::RateLimited(_)));
        assert!(first.is_transient());

        let second = classifier.classify("t", "q").await.unwrap_err();
        assert!(matches!(second, ClassifierError::Status { status: 400, .. }));
        assert!(!second.is_transient());
    }

    #[tokio::test]
    async fn test_classify_without_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = classifier(&server).classify("t", "q").await.unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }
}
