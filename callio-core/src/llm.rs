use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CallioError;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Model parameters shared by every request of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub system_message: String,
    pub context: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ModelParams {
    /// System message followed by the prior context turns.
    pub fn preamble(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.context.len() + 2);
        messages.push(Message::system(self.system_message.clone()));
        messages.extend(self.context.iter().cloned());
        messages
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub timeout: Duration,
}

impl CompletionRequest {
    /// Builds the request for one prompt. An empty prompt sends the preamble
    /// alone, asking what the assistant would say given only the context.
    pub fn for_prompt(params: &ModelParams, prompt: &str) -> Self {
        let mut messages = params.preamble();
        if !prompt.is_empty() {
            messages.push(Message::user(prompt));
        }
        Self {
            model: params.model.clone(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: 1.0,
            timeout: params.timeout,
        }
    }
}

/// Token consumption reported by the provider for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CallioError>;
}

#[async_trait::async_trait]
impl<C> CompletionClient for std::sync::Arc<C>
where
    C: CompletionClient + ?Sized,
{
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CallioError> {
        (**self).complete(request).await
    }
}
