use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use callio_batch::{ApiKey, JobConfig};
use callio_core::{CallioError, Role};
use callio_csv::{Column, ColumnSelection, RowBound};

#[derive(Parser, Debug)]
#[command(
    name = "callio",
    version,
    about = "Send every row of a CSV file to a chat-completion model and collect the answers"
)]
pub struct Cli {
    /// Configuration file (defaults to <data dir>/Callio/config.json).
    #[arg(long, global = true, env = "CALLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every selected row through the model and write the output file.
    Run {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Preview responses for the first rows, or for prompts read from stdin.
    Sample {
        #[command(flatten)]
        job: JobArgs,
        /// Number of rows to preview, starting at the first selected row.
        #[arg(long, default_value_t = 5, conflicts_with = "stdin")]
        count: usize,
        /// Read prompts from stdin, one per line.
        #[arg(long)]
        stdin: bool,
    },
    /// List the models offered by the endpoint.
    Models {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Write the default configuration file.
    Init {
        /// Replace an existing configuration.
        #[arg(long)]
        force: bool,
    },
    /// Edit the conversation turns sent before every prompt.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Show or clear the run log.
    Log {
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// Append a turn. An assistant turn without text is generated from the
    /// current context.
    Add {
        #[arg(value_enum)]
        role: TurnRole,
        text: Option<String>,
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Remove every context turn.
    Clear,
    /// Print the system message and context turns.
    Show,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TurnRole {
    User,
    Assistant,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,
}

impl ConnectionArgs {
    pub fn apply(&self, config: &mut JobConfig) {
        if let Some(key) = &self.api_key {
            config.api_key = ApiKey::new(key.clone());
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
    }
}

/// Flags that override the stored configuration for one invocation.
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Input columns, 1-based, e.g. "1,3".
    #[arg(short, long)]
    pub columns: Option<ColumnSelection>,
    /// Output column, 1-based.
    #[arg(long)]
    pub output_column: Option<usize>,
    /// First data row (0-based) or "start".
    #[arg(long)]
    pub start: Option<RowBound>,
    /// Row after the last one to process, or "end".
    #[arg(long)]
    pub end: Option<RowBound>,
    #[arg(long)]
    pub separator: Option<String>,
    #[arg(short, long)]
    pub workers: Option<usize>,
    #[arg(short, long)]
    pub model: Option<String>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long)]
    pub max_retries: Option<usize>,
    /// Omit the header row from the output.
    #[arg(long)]
    pub no_headers: bool,
    /// Write only the responses instead of the input rows.
    #[arg(long)]
    pub no_keep_data: bool,
    /// Store these overrides (not the connection settings) in the
    /// configuration file.
    #[arg(long)]
    pub save: bool,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl JobArgs {
    pub fn apply(&self, config: &mut JobConfig) -> Result<(), CallioError> {
        if let Some(input) = &self.input {
            config.input_path = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(columns) = &self.columns {
            config.input_columns = columns.clone();
        }
        if let Some(number) = self.output_column {
            config.output_column = Column::from_one_based(number)?;
        }
        if let Some(start) = self.start {
            config.row_start = start;
        }
        if let Some(end) = self.end {
            config.row_end = end;
        }
        if let Some(separator) = &self.separator {
            config.separator = separator.clone();
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if self.max_retries.is_some() {
            config.max_retries = self.max_retries;
        }
        if self.no_headers {
            config.include_headers = false;
        }
        if self.no_keep_data {
            config.keep_data = false;
        }
        Ok(())
    }
}
