//! Running a CSV file of prompts through a completion provider.

pub mod config;
pub mod dispatcher;
pub mod job;

pub use config::{ApiKey, JobConfig, DEFAULT_BASE_URL};
pub use dispatcher::{BatchDispatcher, RowOutcome, ERROR_CELL_PREFIX};
pub use job::{preview, probe_writable, run_batch, sample_prompts, Job, RunSummary};
