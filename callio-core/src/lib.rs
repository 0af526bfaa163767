mod cost;
mod error;
mod llm;
mod log;
mod retry;

pub use cost::{CostRates, Progress, RunAccumulator};
pub use error::CallioError;
pub use llm::{
    Completion, CompletionClient, CompletionRequest, Message, ModelParams, Role, TokenUsage,
};
pub use log::{FileLog, LogSink};
pub use retry::{is_transient, RetryPolicy, Retrying};
