pub mod openai_compatible;

pub use callio_core::{Completion, CompletionClient, CompletionRequest, Message, Role, TokenUsage};

pub use openai_compatible::{
    ChatCompletionRequest, ChatCompletionResponse, OpenAiCompatibleBuilder,
    OpenAiCompatibleClient, OPENAI_BASE_URL,
};
