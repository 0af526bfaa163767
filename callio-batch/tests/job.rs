use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use callio_batch::{preview, probe_writable, run_batch, sample_prompts, Job, JobConfig};
use callio_core::{
    CallioError, Completion, CompletionClient, CompletionRequest, CostRates, LogSink, Message,
    Role, RunAccumulator, TokenUsage,
};
use callio_csv::{Column, RowBound};

const PRODUCTS: &str = "name,description\n\
Widget,small\n\
Gadget,shiny\n\
Doohickey,odd\n";

/// Echoes the user turn back; rejects the prompt `bad`.
#[derive(Default)]
struct Echo {
    calls: AtomicUsize,
    user_turns: Mutex<Vec<usize>>,
}

#[async_trait]
impl CompletionClient for Echo {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CallioError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let users = request
            .messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count();
        self.user_turns.lock().unwrap().push(users);
        let last = request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        if last.contains("bad") {
            return Err(CallioError::Rejected {
                status: 400,
                message: "bad prompt".to_string(),
            });
        }
        Ok(Completion {
            text: format!("about {last}"),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        })
    }
}

#[derive(Default)]
struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl LogSink for RecordingLog {
    fn write(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

fn write_input(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("input.csv");
    fs::write(&path, contents).unwrap();
    path
}

fn config(dir: &Path, input: &str) -> JobConfig {
    JobConfig {
        input_path: write_input(dir, input),
        output_path: dir.join("output.csv"),
        input_columns: "1".parse().unwrap(),
        output_column: Column::from_one_based(2).unwrap(),
        max_workers: 4,
        ..JobConfig::default()
    }
}

#[tokio::test]
async fn run_batch_writes_responses_next_to_the_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), PRODUCTS);
    let client = Arc::new(Echo::default());

    let summary = run_batch(&config, client.clone()).await.unwrap();

    assert_eq!(
        fs::read_to_string(&config.output_path).unwrap(),
        "name,description\n\
         Widget,about Widget\n\
         Gadget,about Gadget\n\
         Doohickey,about Doohickey\n"
    );
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.failed_rows, 0);
    assert_eq!(summary.prompt_tokens, 30);
    assert_eq!(summary.completion_tokens, 15);
    assert_eq!(summary.total_tokens(), 45);
    assert!((summary.total_cost - 0.000075).abs() < 1e-12);
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn output_row_count_matches_selected_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig {
        keep_data: false,
        include_headers: false,
        row_start: RowBound::Index(1),
        row_end: RowBound::End,
        ..config(dir.path(), PRODUCTS)
    };

    let summary = run_batch(&config, Arc::new(Echo::default())).await.unwrap();

    let written = fs::read_to_string(&config.output_path).unwrap();
    assert_eq!(written, "about Gadget\nabout Doohickey\n");
    assert_eq!(summary.rows, written.lines().count());
}

#[tokio::test]
async fn terminal_failure_is_written_as_error_cell() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "name\ngood\nbad\nfine\n");

    let summary = run_batch(&config, Arc::new(Echo::default())).await.unwrap();

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.failed_rows, 1);
    assert_eq!(summary.prompt_tokens, 20);
    let written = fs::read_to_string(&config.output_path).unwrap();
    let lines = written.lines().collect::<Vec<_>>();
    assert_eq!(lines[1], "good,about good");
    assert_eq!(lines[2], "bad,ERROR: Request rejected (400): bad prompt");
    assert_eq!(lines[3], "fine,about fine");
}

#[tokio::test]
async fn missing_column_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig {
        input_columns: "1,4".parse().unwrap(),
        ..config(dir.path(), PRODUCTS)
    };
    let client = Arc::new(Echo::default());

    let err = run_batch(&config, client.clone()).await.unwrap_err();

    match err {
        CallioError::ColumnNotFound { columns } => assert_eq!(columns, vec![4]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bad_selection_leaves_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig {
        input_columns: "5".parse().unwrap(),
        ..config(dir.path(), "a,b,c\n1,2,3\n")
    };
    let client = Arc::new(Echo::default());

    let err = run_batch(&config, client.clone()).await.unwrap_err();

    assert!(matches!(err, CallioError::ColumnNotFound { .. }));
    assert!(!config.output_path.exists());
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unwritable_output_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig {
        output_path: dir.path().join("no-such-dir").join("out.csv"),
        ..config(dir.path(), PRODUCTS)
    };
    let client = Arc::new(Echo::default());

    let err = run_batch(&config, client.clone()).await.unwrap_err();

    assert!(matches!(err, CallioError::FileUnwritable { .. }));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_configuration_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(Echo::default());

    let reversed = JobConfig {
        row_start: RowBound::Index(3),
        row_end: RowBound::Index(1),
        ..config(dir.path(), PRODUCTS)
    };
    let err = run_batch(&reversed, client.clone()).await.unwrap_err();
    assert!(matches!(err, CallioError::InvalidRange(_)));

    let missing_input = JobConfig {
        input_path: dir.path().join("absent.csv"),
        ..config(dir.path(), PRODUCTS)
    };
    let err = run_batch(&missing_input, client.clone()).await.unwrap_err();
    assert!(matches!(err, CallioError::FileUnreadable { .. }));

    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn job_reports_progress_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), PRODUCTS);
    let accumulator = Arc::new(RunAccumulator::new(CostRates::new(1.0, 2.0)));
    let mut progress = accumulator.subscribe();
    let log = Arc::new(RecordingLog::default());

    let summary = Job::new(config, Arc::new(Echo::default()))
        .with_accumulator(accumulator.clone())
        .with_log(log.clone())
        .run()
        .await
        .unwrap();

    let last = *progress.borrow_and_update();
    assert_eq!(last.remaining, 0);
    assert_eq!(last.total_tokens(), 45);
    assert!((summary.total_cost - 0.06).abs() < 1e-12);

    let lines = log.lines.lock().unwrap();
    assert!(lines.first().unwrap().starts_with("Job started: 3 rows"));
    assert!(lines.last().unwrap().starts_with("Job complete: 3 rows (0 failed)"));
}

#[test]
fn summary_display_rounds_cost() {
    let summary = callio_batch::RunSummary {
        output_path: PathBuf::from("out.csv"),
        rows: 2,
        failed_rows: 0,
        prompt_tokens: 1000,
        completion_tokens: 500,
        total_cost: 0.002_500_4,
    };

    assert_eq!(
        summary.to_string(),
        "Job Complete. Output written to: out.csv\nTotal Cost: $0.002500\nTotal Tokens: 1500"
    );
}

#[test]
fn sample_prompts_start_at_the_configured_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig {
        row_start: RowBound::Index(1),
        row_end: RowBound::Index(2),
        ..config(dir.path(), PRODUCTS)
    };

    let samples = sample_prompts(&config, 2).unwrap();

    assert_eq!(samples, vec!["Gadget", "Doohickey"]);
}

#[tokio::test]
async fn preview_keeps_order_and_blanks_failures() {
    let config = JobConfig::default();
    let prompts = vec!["one".to_string(), "bad".to_string(), "three".to_string()];

    let responses = preview(&config, Arc::new(Echo::default()), &prompts).await;

    assert_eq!(responses, vec!["about one", "", "about three"]);
}

#[tokio::test]
async fn empty_preview_prompt_sends_only_the_context() {
    let config = JobConfig {
        context: vec![Message::user("hi"), Message::assistant("hello")],
        ..JobConfig::default()
    };
    let client = Arc::new(Echo::default());

    let responses = preview(&config, client.clone(), &[String::new()]).await;

    assert_eq!(responses, vec!["about hello"]);
    assert_eq!(*client.user_turns.lock().unwrap(), vec![1]);
}

#[test]
fn probe_leaves_existing_output_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("existing.csv");
    fs::write(&path, "keep me\n").unwrap();

    probe_writable(&path).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "keep me\n");
}
