//! Generic OpenAI-compatible chat-completion client
//!
//! Works against any provider exposing OpenAI's `/v1/chat/completions` API.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use callio_core::{
    CallioError, Completion, CompletionClient, CompletionRequest, Message, TokenUsage,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Request body for chat completions endpoint
#[derive(Serialize, Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl From<&CompletionRequest> for ChatCompletionRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        }
    }
}

/// Non-streaming response from chat completions
#[derive(Deserialize, Debug, Clone)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// OpenAI-style error response
#[derive(Deserialize, Debug, Clone)]
pub struct OpenAiError {
    pub error: ErrorDetail,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
}

#[derive(Deserialize, Debug)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: String,
}

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Default)]
pub struct OpenAiCompatibleBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    http: Option<Client>,
}

impl OpenAiCompatibleBuilder {
    pub fn base_url(mut self, value: impl Into<String>) -> Result<Self, CallioError> {
        let value = value.into();
        Url::parse(&value).map_err(|err| {
            CallioError::InvalidConfig(format!("invalid base url '{value}': {err}"))
        })?;
        self.base_url = Some(value);
        Ok(self)
    }

    pub fn api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = Some(value.into());
        self
    }

    pub fn http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleClient, CallioError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CallioError::InvalidConfig("missing api key".to_string()))?;

        Ok(OpenAiCompatibleClient {
            http: self.http.unwrap_or_default(),
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: SecretString::new(api_key),
        })
    }
}

impl OpenAiCompatibleClient {
    pub fn builder() -> OpenAiCompatibleBuilder {
        OpenAiCompatibleBuilder::default()
    }

    /// Client for the public OpenAI endpoint.
    pub fn openai(api_key: impl Into<String>) -> Result<Self, CallioError> {
        Self::builder().api_key(api_key).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Ids of the models the endpoint offers.
    pub async fn list_models(&self) -> Result<Vec<String>, CallioError> {
        let response = self
            .http
            .get(self.endpoint("models"))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| map_transport_error(err, None))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &headers, &body, None));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|err| CallioError::InvalidResponse(err.to_string()))?;
        let mut ids = list.data.into_iter().map(|model| model.id).collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CallioError> {
        let body = ChatCompletionRequest::from(&request);
        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| map_transport_error(err, Some(request.timeout)))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &headers, &text, Some(request.timeout)));
        }

        let text = response
            .text()
            .await
            .map_err(|err| map_transport_error(err, Some(request.timeout)))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|err| CallioError::InvalidResponse(err.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CallioError::InvalidResponse("no choices returned".to_string()))?;
        tracing::debug!(finish_reason = ?choice.finish_reason, "chat completion finished");

        let usage = match parsed.usage {
            Some(usage) => TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            None => {
                tracing::warn!(model = %request.model, "response carried no usage block");
                TokenUsage::default()
            }
        };

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            usage,
        })
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Option<Duration>) -> CallioError {
    if err.is_timeout() {
        return CallioError::Timeout(timeout.unwrap_or_default());
    }
    if err.is_decode() {
        return CallioError::InvalidResponse(err.to_string());
    }
    CallioError::Network(err.to_string())
}

fn map_status_error(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    timeout: Option<Duration>,
) -> CallioError {
    let message = error_message(body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => CallioError::RateLimited {
            message,
            retry_after: retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT => CallioError::Timeout(timeout.unwrap_or_default()),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            CallioError::ServiceUnavailable(format!("{status}: {message}"))
        }
        status if status.is_server_error() => CallioError::Api(format!("{status}: {message}")),
        status => CallioError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAiError>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
