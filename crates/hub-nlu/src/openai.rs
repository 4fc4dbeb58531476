//! OpenAI / Azure OpenAI extraction client
//!
//! Sends the utterance to a chat-completions endpoint with an extraction
//! prompt and `json_object` response format, then decodes the returned JSON
//! as a [`StructuredExtraction`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use hub_core::{NluConfig, NluProvider, NluResult};

use crate::error::{NluError, Result};
use crate::schema::{ProviderPayload, StructuredExtraction};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AZURE_API_VERSION: &str = "2025-01-01-preview";
const PLACEHOLDER_KEY: &str = "sk-your-openai-api-key-here";
const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = r#"You are a calendar scheduling assistant. Extract intent and entities from user requests about scheduling meetings.

Extract the following information:
- Intent: One of "BookMeeting", "CancelMeeting", or "RescheduleMeeting"
- Attendees: List of person names or email addresses mentioned (e.g., ["John", "mary@example.com", "Bob Smith"])
- Start DateTime: When the meeting starts (yyyy-MM-ddTHH:mm). Resolve relative dates like "tomorrow" or "next Friday" against the current date below
- End DateTime: When the meeting ends (yyyy-MM-ddTHH:mm). If not specified, use 1 hour after the start
- Subject: Meeting title (default "Meeting")
- Location: Meeting location name if mentioned (e.g., "Conference Room A", "Teams Meeting")
- Recurrence Pattern: If recurring, one of "daily", "weekly", "weekday", "monthly"; otherwise null
- Exceptions: Exception rules for recurring meetings (e.g., ["monday", "first tuesday", "second friday"]) or null

Return ONLY a JSON object in exactly this format, using null for optional fields that are not mentioned:
{
  "intent": "BookMeeting",
  "attendees": ["John", "mary@example.com"],
  "startDateTime": "2025-12-10T15:00",
  "endDateTime": "2025-12-10T16:00",
  "subject": "Meeting with John",
  "location": null,
  "recurrencePattern": null,
  "exceptions": null
}

Rules:
- Date/time values use 24-hour yyyy-MM-ddTHH:mm with a literal 'T'
- If only a time is given, assume today's date
- "book", "schedule", "create", "set up", "add" -> BookMeeting
- "cancel", "delete", "remove" -> CancelMeeting
- "reschedule", "move", "change", "update", "modify" -> RescheduleMeeting"#;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Azure carries the deployment in the URL instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessageResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageResponse {
    #[serde(default)]
    pub content: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Where requests go and how they authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// `Authorization: Bearer` against an OpenAI-compatible base URL
    OpenAi { base_url: String },
    /// `api-key` header against a deployment URL
    Azure { url: String },
}

/// Chat-completions backed [`NluProvider`]
#[derive(Clone)]
pub struct OpenAiExtractor {
    client: Client,
    api_key: String,
    model: String,
    target: Target,
}

impl OpenAiExtractor {
    pub fn new(config: &NluConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(NluError::Http)?;

        let target = match config.endpoint.as_deref().map(|e| e.trim_end_matches('/')) {
            Some(endpoint) if azure_endpoint(endpoint, config) => {
                let deployment = config
                    .deployment
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or(&config.model);
                let api_version = config
                    .api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_AZURE_API_VERSION);
                Target::Azure {
                    url: format!(
                        "{}/openai/deployments/{}/chat/completions?api-version={}",
                        endpoint, deployment, api_version
                    ),
                }
            }
            Some(endpoint) => Target::OpenAi {
                base_url: endpoint.to_string(),
            },
            None => Target::OpenAi {
                base_url: OPENAI_BASE_URL.to_string(),
            },
        };

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            target,
        })
    }

    pub fn is_azure(&self) -> bool {
        matches!(self.target, Target::Azure { .. })
    }

    fn url(&self) -> String {
        match &self.target {
            Target::OpenAi { base_url } => format!("{}/chat/completions", base_url),
            Target::Azure { url } => url.clone(),
        }
    }

    /// Reject keys that cannot possibly work before spending a round trip
    fn check_api_key(&self) -> Result<()> {
        let key = self.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_KEY {
            return Err(NluError::Config("OpenAI API key is missing".to_string()));
        }
        let official = matches!(&self.target, Target::OpenAi { base_url } if base_url == OPENAI_BASE_URL);
        if official && !key.starts_with("sk-") {
            return Err(NluError::Config(
                "OpenAI API keys must start with 'sk-'; set nlu.endpoint for Azure OpenAI".to_string(),
            ));
        }
        Ok(())
    }

    /// Request body for `text`, with `now` as the date context
    pub fn build_request(&self, text: &str, now: NaiveDateTime) -> ChatCompletionRequest {
        let date_context = format!(
            "Current date: {}, Current time: {}",
            now.format("%Y-%m-%d"),
            now.format("%H:%M")
        );

        ChatCompletionRequest {
            model: (!self.is_azure()).then(|| self.model.clone()),
            messages: vec![
                ChatMessage::system(format!("{}\n\n{}", SYSTEM_PROMPT, date_context)),
                ChatMessage::user(text),
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
            temperature: TEMPERATURE,
        }
    }

    async fn try_extract(&self, text: &str) -> Result<NluResult> {
        self.check_api_key()?;

        let url = self.url();
        let request = self.build_request(text, chrono::Local::now().naive_local());
        debug!(url = %url, azure = self.is_azure(), "Sending extraction request");

        let builder = self.client.post(&url).json(&request);
        let builder = if self.is_azure() {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                warn!("OpenAI authentication failed; check nlu.api_key");
            } else if status == reqwest::StatusCode::NOT_FOUND && self.is_azure() {
                warn!("Azure OpenAI deployment not found; check nlu.endpoint, nlu.deployment and nlu.api_version");
            }
            return Err(NluError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

fn azure_endpoint(endpoint: &str, config: &NluConfig) -> bool {
    endpoint.contains(".azure.com") || config.deployment.is_some()
}

/// Decode a chat-completions body into an [`NluResult`]
pub fn parse_completion(body: &str) -> Result<NluResult> {
    let response: ChatCompletionResponse = serde_json::from_str(body)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| NluError::InvalidResponse("No choices in response".to_string()))?;

    info!(content = %content, "OpenAI extracted content");
    let extraction: StructuredExtraction = serde_json::from_str(&content)?;
    Ok(ProviderPayload::Structured(extraction).into_nlu_result())
}

#[async_trait]
impl NluProvider for OpenAiExtractor {
    fn name(&self) -> &str {
        if self.is_azure() { "azure-openai" } else { "openai" }
    }

    async fn extract(&self, text: &str) -> NluResult {
        match self.try_extract(text).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, provider = self.name(), "NLU extraction failed");
                NluResult::provider_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use chrono::NaiveDate;
    use serde_json::json;

    fn config(api_key: &str) -> NluConfig {
        NluConfig {
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_standard_openai_request() {
        let extractor = OpenAiExtractor::new(&config("sk-test")).unwrap();
        assert!(!extractor.is_azure());
        assert_eq!(extractor.url(), "https://api.openai.com/v1/chat/completions");

        let body = serde_json::to_value(extractor.build_request("book it", now())).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "book it"}));
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.ends_with("Current date: 2024-01-15, Current time: 10:30"));
    }

    #[test]
    fn test_azure_request_uses_deployment_url() {
        let extractor = OpenAiExtractor::new(&NluConfig {
            api_key: "azure-key".to_string(),
            endpoint: Some("https://hub.openai.azure.com/".to_string()),
            deployment: Some("gpt-4o".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(extractor.is_azure());
        assert_eq!(
            extractor.url(),
            "https://hub.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2025-01-01-preview"
        );
        let body = serde_json::to_value(extractor.build_request("x", now())).unwrap();
        assert!(body.get("model").is_none());
        assert!(extractor.check_api_key().is_ok());
    }

    #[test]
    fn test_api_key_sanity_check() {
        assert!(OpenAiExtractor::new(&config("")).unwrap().check_api_key().is_err());
        assert!(
            OpenAiExtractor::new(&config(PLACEHOLDER_KEY))
                .unwrap()
                .check_api_key()
                .is_err()
        );
        assert!(OpenAiExtractor::new(&config("abc")).unwrap().check_api_key().is_err());
        assert!(OpenAiExtractor::new(&config("sk-abc")).unwrap().check_api_key().is_ok());
    }

    #[test]
    fn test_parse_completion() {
        let content = json!({
            "intent": "RescheduleMeeting",
            "attendees": null,
            "startDateTime": "2024-01-18T10:00",
            "endDateTime": null,
            "subject": "Sync",
            "location": null,
            "recurrencePattern": null,
            "exceptions": null
        })
        .to_string();
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string();

        let result = parse_completion(&body).unwrap();
        assert_eq!(result.intent, "RescheduleMeeting");
        assert_eq!(result.entities.len(), 2);
    }

    #[test]
    fn test_parse_completion_without_choices() {
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(NluError::InvalidResponse(_))
        ));
        assert!(matches!(parse_completion("not json"), Err(NluError::Json(_))));
    }

    #[tokio::test]
    async fn test_invalid_key_reports_provider_error() {
        let extractor = OpenAiExtractor::new(&config("")).unwrap();
        assert_eq!(extractor.extract("book a meeting").await, NluResult::provider_error());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_extract_against_compatible_endpoint() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["authorization"], "Bearer test-key");
                assert_eq!(body["response_format"]["type"], "json_object");
                let content = json!({
                    "intent": "BookMeeting",
                    "attendees": ["Mary"],
                    "startDateTime": "2024-01-16T14:00",
                    "endDateTime": "2024-01-16T15:00",
                    "subject": "Meeting with Mary"
                })
                .to_string();
                Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
            }),
        );
        let base_url = serve(app).await;

        let extractor = OpenAiExtractor::new(&NluConfig {
            api_key: "test-key".to_string(),
            endpoint: Some(base_url),
            ..Default::default()
        })
        .unwrap();

        let result = extractor.extract("Book a meeting with Mary").await;
        assert_eq!(result.intent, "BookMeeting");
        assert_eq!(result.entities.len(), 4);
    }

    #[tokio::test]
    async fn test_http_error_reports_provider_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = serve(app).await;

        let extractor = OpenAiExtractor::new(&NluConfig {
            api_key: "test-key".to_string(),
            endpoint: Some(base_url),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(extractor.extract("x").await, NluResult::provider_error());
    }
}
