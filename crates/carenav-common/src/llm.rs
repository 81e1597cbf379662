use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CommonError;
use crate::guidance::{CollaboratorError, GuidanceCollaborator, GuidanceRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ERROR_BODY_BYTES: usize = 8 * 1024;

#[derive(Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl LlmClientConfig {
    pub fn from_env() -> Result<Self, CommonError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup. Numbers that do not parse are
    /// rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CommonError> {
        let base_url =
            lookup("CARENAV_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = lookup("CARENAV_LLM_API_KEY")
            .or_else(|| lookup("GEMINI_API_KEY"))
            .filter(|k| !k.trim().is_empty());

        let model = lookup("CARENAV_LLM_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let request_timeout = match lookup("CARENAV_LLM_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(CommonError::Config(format!(
                        "CARENAV_LLM_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                    )))
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let max_error_body_bytes = lookup("CARENAV_LLM_MAX_ERROR_BODY_BYTES")
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|_| {
                    CommonError::Config(format!(
                        "CARENAV_LLM_MAX_ERROR_BODY_BYTES must be a non-negative integer, got '{raw}'"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_ERROR_BODY_BYTES);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            request_timeout,
            max_error_body_bytes,
        })
    }
}

impl fmt::Debug for LlmClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("max_error_body_bytes", &self.max_error_body_bytes)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },

    #[error("completion has no choices[0].message.content")]
    MissingContent,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// Every call is a single attempt: guidance requests must not fan out into retries.
#[derive(Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self, LlmClientError> {
        let http = reqwest::Client::builder()
            .user_agent("carenav/guidance")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    pub async fn chat_completions(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    /// Ask the model for guidance and return the raw assistant text.
    pub async fn request_guidance(
        &self,
        request: &GuidanceRequest,
    ) -> Result<String, LlmClientError> {
        let completion = self
            .chat_completions(&ChatCompletionRequest::guidance(&self.config.model, request))
            .await?;

        if let Some(usage) = &completion.usage {
            debug!(
                model = %self.config.model,
                total_tokens = usage.total_tokens,
                "guidance completion received"
            );
        }

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmClientError::MissingContent)
    }

    async fn parse_json_response<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, LlmClientError> {
        if resp.status().is_success() {
            let bytes = resp.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> LlmClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string());
            return LlmClientError::Upstream { status, message };
        }
        LlmClientError::UpstreamBody { status, body }
    }
}

impl GuidanceCollaborator for LlmClient {
    fn generate<'a>(
        &'a self,
        request: &'a GuidanceRequest,
    ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
        Box::pin(async move {
            if self.config.api_key.is_none() {
                return Err(CollaboratorError::Unavailable(
                    "no API key configured".to_string(),
                ));
            }
            self.request_guidance(request)
                .await
                .map_err(CollaboratorError::from)
        })
    }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

fn system_instruction(request: &GuidanceRequest) -> String {
    let language = request.language.name();
    format!(
        "You help people prepare for a medical visit based on the symptoms they describe.\n\
\n\
Rate urgency as exactly one of:\n\
- Green: mild symptoms that rest or over-the-counter care can manage.\n\
- Yellow: symptoms that need a professional evaluation but are not an immediate threat to life.\n\
- Red: serious symptoms such as severe pain, trouble breathing or sudden weakness.\n\
\n\
Write a checklist of steps to prepare for the visit: documents to bring (ID, insurance, \
earlier records), tests they may be asked to take, and practical advice such as when to go \
and whether to bring someone along.\n\
\n\
Add a short, calm explanation.\n\
\n\
Never give a diagnosis and never recommend specific medication. Write the checklist and \
explanation in {language}.\n\
\n\
Reply with a single JSON object: \
{{\"urgency\": \"Green|Yellow|Red\", \"checklist\": [\"...\"], \"explanation\": \"...\"}}"
    )
}

fn user_prompt(request: &GuidanceRequest) -> String {
    format!(
        "Symptoms: \"{}\"\nClassified department: {}\nLanguage: {} ({})",
        request.symptoms,
        request.department,
        request.language.name(),
        request.language.code()
    )
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    /// JSON-mode completion request asking for guidance on `request`.
    pub fn guidance(model: &str, request: &GuidanceRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_instruction(request),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt(request),
                },
            ],
            temperature: None,
            response_format: Some(ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: Option<u32>,
    pub message: ChatCompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}
