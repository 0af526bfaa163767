use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use callio_core::{CallioError, CostRates, Message, ModelParams, RetryPolicy};
use callio_csv::{Column, ColumnSelection, ExtractOptions, OutputOptions, RowBound, RowRange};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// API key kept out of `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

/// Everything one run needs. Keys written by older config files
/// (`input_file`, `sleep_time`, ...) are accepted as aliases; unknown keys
/// are ignored and missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    #[serde(alias = "input_file")]
    pub input_path: PathBuf,
    #[serde(alias = "output_file")]
    pub output_path: PathBuf,
    pub include_headers: bool,
    pub keep_data: bool,
    pub max_workers: usize,
    pub model: String,
    #[serde(alias = "input_cost")]
    pub input_cost_per_k: f64,
    #[serde(alias = "output_cost")]
    pub output_cost_per_k: f64,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(alias = "task_timeout")]
    pub request_timeout_secs: f64,
    #[serde(alias = "sleep_time")]
    pub retry_delay_secs: f64,
    /// Ceiling on retries of one row; `None` keeps retrying.
    pub max_retries: Option<usize>,
    pub input_columns: ColumnSelection,
    pub output_column: Column,
    pub row_start: RowBound,
    pub row_end: RowBound,
    pub separator: String,
    #[serde(alias = "system_msg")]
    pub system_message: String,
    pub context: Vec<Message>,
    /// Last text previewed with `sample`, one prompt per line.
    pub sample_inputs: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            api_key: ApiKey::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            input_path: PathBuf::from("input_data.csv"),
            output_path: PathBuf::from("output_data.csv"),
            include_headers: true,
            keep_data: true,
            max_workers: 50,
            model: "gpt-3.5-turbo".to_string(),
            input_cost_per_k: 0.0015,
            output_cost_per_k: 0.002,
            max_tokens: 30,
            temperature: 0.9,
            request_timeout_secs: 20.0,
            retry_delay_secs: 10.0,
            max_retries: None,
            input_columns: ColumnSelection::single(Column::from_index(1)),
            output_column: Column::from_index(1),
            row_start: RowBound::Start,
            row_end: RowBound::End,
            separator: " - ".to_string(),
            system_message: "You are a helpful assistant".to_string(),
            context: Vec::new(),
            sample_inputs: String::new(),
        }
    }
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self, CallioError> {
        let text = fs::read_to_string(path).map_err(|source| CallioError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config: JobConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CallioError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| CallioError::FileUnwritable {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks everything that can be checked without opening the input.
    pub fn validate(&self) -> Result<(), CallioError> {
        if self.max_workers == 0 {
            return invalid("max_workers must be at least 1");
        }
        if self.input_path.as_os_str().is_empty() {
            return invalid("input path is empty");
        }
        if self.output_path.as_os_str().is_empty() {
            return invalid("output path is empty");
        }
        if self.model.trim().is_empty() {
            return invalid("model is empty");
        }
        for (name, value) in [
            ("input cost", self.input_cost_per_k),
            ("output cost", self.output_cost_per_k),
            ("retry delay", self.retry_delay_secs),
            ("temperature", self.temperature),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(&format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if !self.request_timeout_secs.is_finite() || self.request_timeout_secs <= 0.0 {
            return invalid(&format!(
                "request timeout must be positive, got {}",
                self.request_timeout_secs
            ));
        }
        if let (RowBound::Index(start), RowBound::Index(end)) = (self.row_start, self.row_end) {
            if start > end {
                return Err(CallioError::InvalidRange(format!(
                    "row start {start} is after row end {end}"
                )));
            }
        }
        Ok(())
    }

    pub fn row_range(&self) -> RowRange {
        RowRange::new(self.row_start, self.row_end)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            columns: self.input_columns.clone(),
            range: self.row_range(),
            separator: self.separator.clone(),
        }
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            include_headers: self.include_headers,
            keep_data: self.keep_data,
            output_column: self.output_column,
        }
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            system_message: self.system_message.clone(),
            context: self.context.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: secs(self.request_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(secs(self.retry_delay_secs)).with_max_retries(self.max_retries)
    }

    pub fn cost_rates(&self) -> CostRates {
        CostRates::new(self.input_cost_per_k, self.output_cost_per_k)
    }
}

fn invalid(message: &str) -> Result<(), CallioError> {
    Err(CallioError::InvalidConfig(message.to_string()))
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
