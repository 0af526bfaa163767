use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use callio_core::{
    CallioError, Completion, CompletionClient, CompletionRequest, CostRates, LogSink, ModelParams,
    RetryPolicy, RunAccumulator,
};
use callio_csv::PromptRow;

/// Cell text written in place of a response for a row that failed terminally.
pub const ERROR_CELL_PREFIX: &str = "ERROR: ";

/// How one row ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RowOutcome {
    Completed(Completion),
    Failed(String),
}

impl RowOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RowOutcome::Failed(_))
    }

    /// The output cell for this row.
    pub fn cell(&self) -> String {
        match self {
            RowOutcome::Completed(completion) => completion.text.clone(),
            RowOutcome::Failed(message) => format!("{ERROR_CELL_PREFIX}{message}"),
        }
    }
}

/// Sends every prompt of a run to the provider with at most `max_workers`
/// requests in flight, and returns one outcome per prompt in input order.
///
/// A worker slot is held only while a request is outstanding. Between
/// retries the slot is released so other rows can proceed.
pub struct BatchDispatcher {
    client: Arc<dyn CompletionClient>,
    max_workers: usize,
    retry: RetryPolicy,
    accumulator: Arc<RunAccumulator>,
    log: Option<Arc<dyn LogSink>>,
}

impl BatchDispatcher {
    pub fn new(client: Arc<dyn CompletionClient>, max_workers: usize, retry: RetryPolicy) -> Self {
        Self {
            client,
            max_workers,
            retry,
            accumulator: Arc::new(RunAccumulator::new(CostRates::default())),
            log: None,
        }
    }

    pub fn with_accumulator(mut self, accumulator: Arc<RunAccumulator>) -> Self {
        self.accumulator = accumulator;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn accumulator(&self) -> &Arc<RunAccumulator> {
        &self.accumulator
    }

    pub async fn dispatch(
        &self,
        prompts: &[PromptRow],
        params: &ModelParams,
    ) -> Result<Vec<RowOutcome>, CallioError> {
        if self.max_workers == 0 {
            return Err(CallioError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        self.accumulator.start(prompts.len());
        tracing::info!(
            rows = prompts.len(),
            max_workers = self.max_workers,
            model = %params.model,
            "dispatching batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set = JoinSet::new();
        for (position, prompt) in prompts.iter().enumerate() {
            let worker = RowWorker {
                client: Arc::clone(&self.client),
                semaphore: Arc::clone(&semaphore),
                retry: self.retry,
                accumulator: Arc::clone(&self.accumulator),
                log: self.log.clone(),
                row: prompt.index,
                request: CompletionRequest::for_prompt(params, &prompt.text),
            };
            join_set.spawn(async move { (position, worker.run_isolated().await) });
        }

        let mut slots: Vec<Option<RowOutcome>> = (0..prompts.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (position, outcome) = joined.map_err(|err| CallioError::Worker(err.to_string()))?;
            slots[position] = Some(outcome);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| {
                    CallioError::Worker(format!("row {position} finished without a result"))
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("max_workers", &self.max_workers)
            .field("retry", &self.retry)
            .field("accumulator", &self.accumulator)
            .field("log", &self.log.is_some())
            .finish()
    }
}

struct RowWorker {
    client: Arc<dyn CompletionClient>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    accumulator: Arc<RunAccumulator>,
    log: Option<Arc<dyn LogSink>>,
    row: usize,
    request: CompletionRequest,
}

impl RowWorker {
    /// Like [`RowWorker::run`], but a panic inside the client fails only
    /// this row.
    async fn run_isolated(self) -> RowOutcome {
        let row = self.row;
        let accumulator = Arc::clone(&self.accumulator);
        let log = self.log.clone();
        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = format!("worker panicked: {}", panic_message(panic.as_ref()));
                accumulator.record_failure();
                tracing::error!(row, error = %message, "row failed");
                if let Some(log) = &log {
                    log.write(&format!("Row {row} failed: {message}"));
                }
                RowOutcome::Failed(message)
            }
        }
    }

    async fn run(self) -> RowOutcome {
        let client = &self.client;
        let semaphore = &self.semaphore;
        let request = &self.request;
        let result = self
            .retry
            .run(
                move || async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| CallioError::Worker("worker pool closed".to_string()))?;
                    client.complete(request.clone()).await
                },
                |retry, error| self.report_retry(retry, error),
            )
            .await;

        match result {
            Ok(completion) => {
                self.accumulator.record(completion.usage);
                RowOutcome::Completed(completion)
            }
            Err(error) => {
                self.accumulator.record_failure();
                tracing::error!(row = self.row, error = %error, "row failed");
                self.write_log(&format!("Row {} failed: {error}", self.row));
                RowOutcome::Failed(error.to_string())
            }
        }
    }

    fn report_retry(&self, retry: usize, error: &CallioError) {
        tracing::warn!(row = self.row, retry, error = %error, "retrying row");
        self.write_log(&format!(
            "API error in getting response for row {} (retry {retry}): {error}",
            self.row
        ));
    }

    fn write_log(&self, text: &str) {
        if let Some(log) = &self.log {
            log.write(text);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
