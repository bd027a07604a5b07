//! Classification service clients.
//!
//! The pipeline only needs `classify(prompt) -> text`; everything about the
//! wire protocol stays in this module.
//!
//! | Client                | Endpoint                                   |
//! |-----------------------|--------------------------------------------|
//! | `GeminiClassifier`    | `{base}/models/{model}:generateContent`    |
//! | `OpenAiClassifier`    | `{base}/chat/completions`                  |
//!
//! Status mapping: 429 → `RateLimited`, 401/403 → `Configuration`, any other
//! failure → `Service`.

use std::sync::Arc;

use async_trait::async_trait;
use batching::ClassifyError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{Provider, ReportConfig};

/// Longest slice of an error body echoed into an error message.
const ERROR_BODY_SNIPPET: usize = 200;

/// An external natural-language classification capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Send one prompt, return the service's free-form text answer.
    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError>;
}

/// Build the client selected by `config.provider`.
pub fn build_classifier(config: &ReportConfig) -> Result<Arc<dyn Classifier>, ClassifyError> {
    config.validate().map_err(ClassifyError::Configuration)?;
    let classifier: Arc<dyn Classifier> = match config.provider {
        Provider::Gemini => Arc::new(GeminiClassifier::new(config)?),
        Provider::OpenAi => Arc::new(OpenAiClassifier::new(config)?),
    };
    Ok(classifier)
}

fn http_client(config: &ReportConfig) -> Result<reqwest::Client, ClassifyError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ClassifyError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn api_key(config: &ReportConfig) -> Result<String, ClassifyError> {
    config
        .api_key
        .clone()
        .ok_or_else(|| ClassifyError::Configuration("API key missing".to_string()))
}

// ── Gemini ───────────────────────────────────────────────────────────────────

pub struct GeminiClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(config: &ReportConfig) -> Result<Self, ClassifyError> {
        Ok(Self {
            http: http_client(config)?,
            endpoint: format!("{}/models/{}:generateContent", config.base_url(), config.model),
            api_key: api_key(config)?,
        })
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let text = read_body(response).await?;
        parse_gemini_response(&text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Concatenated text parts of the first candidate.
fn parse_gemini_response(body: &str) -> Result<String, ClassifyError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Service(format!("unreadable Gemini response: {e}")))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    non_empty(text)
}

// ── OpenAI-compatible ────────────────────────────────────────────────────────

pub struct OpenAiClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(config: &ReportConfig) -> Result<Self, ClassifyError> {
        Ok(Self {
            http: http_client(config)?,
            endpoint: format!("{}/chat/completions", config.base_url()),
            api_key: api_key(config)?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let text = read_body(response).await?;
        parse_chat_completion(&text)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn parse_chat_completion(body: &str) -> Result<String, ClassifyError> {
    let parsed: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Service(format!("unreadable chat completion: {e}")))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    non_empty(text)
}

// ── Shared helpers ───────────────────────────────────────────────────────────

async fn read_body(response: reqwest::Response) -> Result<String, ClassifyError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    debug!(status = status.as_u16(), bytes = text.len(), "classification response");
    check_status(status, &text)?;
    Ok(text)
}

fn check_status(status: StatusCode, body: &str) -> Result<(), ClassifyError> {
    if status.is_success() {
        return Ok(());
    }
    let snippet: String = body.chars().take(ERROR_BODY_SNIPPET).collect();
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet.trim());
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ClassifyError::RateLimited(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClassifyError::Configuration(detail),
        _ => ClassifyError::Service(detail),
    })
}

fn transport_error(err: reqwest::Error) -> ClassifyError {
    if err.is_timeout() {
        ClassifyError::Service(format!("request timed out: {err}"))
    } else {
        ClassifyError::Service(err.to_string())
    }
}

fn non_empty(text: String) -> Result<String, ClassifyError> {
    if text.trim().is_empty() {
        Err(ClassifyError::Service(
            "classification response contained no text".to_string(),
        ))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_parts_are_concatenated() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"```yaml\n"},{"text":"absence: []\n```"}]}}]}"#;
        assert_eq!(
            parse_gemini_response(body).unwrap(),
            "```yaml\nabsence: []\n```"
        );
    }

    #[test]
    fn gemini_without_candidates_is_a_service_error() {
        let err = parse_gemini_response(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Service(_)));
        assert!(err.is_retriable());
    }

    #[test]
    fn chat_completion_content_is_returned() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"late_arrival: []"}}]}"#;
        assert_eq!(parse_chat_completion(body).unwrap(), "late_arrival: []");
    }

    #[test]
    fn garbage_body_is_a_service_error() {
        assert!(matches!(
            parse_chat_completion("<html>bad gateway</html>"),
            Err(ClassifyError::Service(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(StatusCode::OK, "").is_ok());
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Err(ClassifyError::RateLimited(ref m)) if m == "HTTP 429: slow down"
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, ""),
            Err(ClassifyError::Configuration(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, ""),
            Err(ClassifyError::Service(_))
        ));
    }

    #[test]
    fn endpoints_follow_provider() {
        let config = ReportConfig {
            api_key: Some("k".into()),
            ..ReportConfig::default()
        };
        let gemini = GeminiClassifier::new(&config).unwrap();
        assert_eq!(
            gemini.endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let config = ReportConfig {
            provider: Provider::OpenAi,
            base_url: Some("http://localhost:8080/v1".into()),
            model: "local".into(),
            api_key: Some("k".into()),
            ..ReportConfig::default()
        };
        let openai = OpenAiClassifier::new(&config).unwrap();
        assert_eq!(openai.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn build_classifier_requires_api_key() {
        let err = build_classifier(&ReportConfig::default()).err().unwrap();
        assert!(matches!(err, ClassifyError::Configuration(_)));
    }
}
