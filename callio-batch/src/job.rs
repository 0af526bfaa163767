use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use callio_core::{
    CallioError, CompletionClient, CompletionRequest, LogSink, RetryPolicy, Retrying,
    RunAccumulator,
};
use callio_csv::{extract, write_output, ExtractOptions, RowRange};

use crate::config::JobConfig;
use crate::dispatcher::BatchDispatcher;

const PREVIEW_TIMEOUT: Duration = Duration::from_secs(7);
const PREVIEW_RETRY_DELAY: Duration = Duration::from_secs(1);
const PREVIEW_MAX_RETRIES: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub rows: usize,
    pub failed_rows: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
}

impl RunSummary {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Job Complete. Output written to: {}", self.output_path.display())?;
        writeln!(f, "Total Cost: ${:.6}", self.total_cost)?;
        write!(f, "Total Tokens: {}", self.total_tokens())?;
        if self.failed_rows > 0 {
            write!(f, "\nFailed Rows: {} of {}", self.failed_rows, self.rows)?;
        }
        Ok(())
    }
}

/// One configured run over an input file.
pub struct Job {
    config: JobConfig,
    client: Arc<dyn CompletionClient>,
    accumulator: Arc<RunAccumulator>,
    log: Option<Arc<dyn LogSink>>,
}

impl Job {
    pub fn new(config: JobConfig, client: Arc<dyn CompletionClient>) -> Self {
        let accumulator = Arc::new(RunAccumulator::new(config.cost_rates()));
        Self {
            config,
            client,
            accumulator,
            log: None,
        }
    }

    /// Uses an accumulator owned by the caller, e.g. one it already
    /// subscribed to for progress.
    pub fn with_accumulator(mut self, accumulator: Arc<RunAccumulator>) -> Self {
        self.accumulator = accumulator;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn accumulator(&self) -> Arc<RunAccumulator> {
        Arc::clone(&self.accumulator)
    }

    /// Validates, reads the input, checks the output path, dispatches every
    /// row and writes the output. Nothing is sent to the provider unless the
    /// configuration, input and output path are all usable.
    pub async fn run(&self) -> Result<RunSummary, CallioError> {
        let config = &self.config;
        config.validate()?;
        let table = extract(&config.input_path, &config.extract_options())?;
        probe_writable(&config.output_path)?;

        self.write_log(&format!(
            "Job started: {} rows from {} with {}",
            table.prompts.len(),
            config.input_path.display(),
            config.model
        ));

        let retry = config.retry_policy();
        let client = Arc::clone(&self.client);
        let mut dispatcher = BatchDispatcher::new(client, config.max_workers, retry)
            .with_accumulator(Arc::clone(&self.accumulator));
        if let Some(log) = &self.log {
            dispatcher = dispatcher.with_log(Arc::clone(log));
        }
        let outcomes = dispatcher
            .dispatch(&table.prompts, &config.model_params())
            .await?;

        let cells = outcomes.iter().map(|outcome| outcome.cell()).collect::<Vec<_>>();
        write_output(
            &config.output_path,
            &table.headers,
            &table.rows,
            &cells,
            &config.output_options(),
        )?;

        let progress = self.accumulator.snapshot();
        let summary = RunSummary {
            output_path: config.output_path.clone(),
            rows: outcomes.len(),
            failed_rows: outcomes.iter().filter(|outcome| outcome.is_failed()).count(),
            prompt_tokens: progress.prompt_tokens,
            completion_tokens: progress.completion_tokens,
            total_cost: progress.cost,
        };
        tracing::info!(
            rows = summary.rows,
            failed_rows = summary.failed_rows,
            total_tokens = summary.total_tokens(),
            cost = summary.total_cost,
            output = %summary.output_path.display(),
            "job complete"
        );
        self.write_log(&format!(
            "Job complete: {} rows ({} failed), {} tokens, ${:.6}",
            summary.rows,
            summary.failed_rows,
            summary.total_tokens(),
            summary.total_cost
        ));
        Ok(summary)
    }

    fn write_log(&self, text: &str) {
        if let Some(log) = &self.log {
            log.write(text);
        }
    }
}

pub async fn run_batch(
    config: &JobConfig,
    client: Arc<dyn CompletionClient>,
) -> Result<RunSummary, CallioError> {
    Job::new(config.clone(), client).run().await
}

/// Fails with `FileUnwritable` when `path` cannot be opened for writing.
/// An existing file is left untouched.
pub fn probe_writable(path: &Path) -> Result<(), CallioError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map(drop)
        .map_err(|source| CallioError::FileUnwritable {
            path: path.to_path_buf(),
            source,
        })
}

/// The first `count` prompts starting at the configured first row.
pub fn sample_prompts(config: &JobConfig, count: usize) -> Result<Vec<String>, CallioError> {
    let options = ExtractOptions {
        range: RowRange::limited(config.row_start, count),
        ..config.extract_options()
    };
    let table = extract(&config.input_path, &options)?;
    Ok(table.prompts.into_iter().map(|prompt| prompt.text).collect())
}

/// Quick responses for a handful of prompts, in input order. A prompt that
/// still fails after a couple of short retries previews as an empty string.
pub async fn preview(
    config: &JobConfig,
    client: Arc<dyn CompletionClient>,
    prompts: &[String],
) -> Vec<String> {
    let client = Retrying::new(
        client,
        RetryPolicy::new(PREVIEW_RETRY_DELAY).with_max_retries(Some(PREVIEW_MAX_RETRIES)),
    );
    let client = &client;
    let params = {
        let mut params = config.model_params();
        params.timeout = PREVIEW_TIMEOUT;
        params
    };
    let params = &params;

    stream::iter(prompts)
        .map(move |prompt| async move {
            match client.complete(CompletionRequest::for_prompt(params, prompt)).await {
                Ok(completion) => completion.text,
                Err(error) => {
                    tracing::warn!(error = %error, "preview request failed");
                    String::new()
                }
            }
        })
        .buffered(config.max_workers.max(1))
        .collect()
        .await
}
