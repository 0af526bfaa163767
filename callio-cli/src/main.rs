mod cli;
mod settings;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use callio_batch::{preview, sample_prompts, Job, JobConfig};
use callio_core::{Message, Role};
use callio_llm::OpenAiCompatibleClient;

use crate::cli::{Cli, Command, ConnectionArgs, ContextAction, JobArgs, TurnRole};
use crate::settings::{default_config_path, load_config, open_log, save_config};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Command::Run { job } => run(&config_path, &job).await,
        Command::Sample { job, count, stdin } => sample(&config_path, &job, count, stdin).await,
        Command::Models { connection } => models(&config_path, &connection).await,
        Command::Init { force } => init(&config_path, force),
        Command::Context { action } => context(&config_path, action).await,
        Command::Log { clear } => show_log(&config_path, clear),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_client(config: &JobConfig) -> Result<OpenAiCompatibleClient> {
    OpenAiCompatibleClient::builder()
        .base_url(config.base_url.clone())?
        .api_key(config.api_key.expose())
        .build()
        .context("no API key configured; set OPENAI_API_KEY or pass --api-key")
}

fn job_config(config_path: &Path, args: &JobArgs) -> Result<JobConfig> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config)?;
    if args.save {
        save_config(config_path, &config)?;
    }
    args.connection.apply(&mut config);
    Ok(config)
}

async fn run(config_path: &Path, args: &JobArgs) -> Result<()> {
    let config = job_config(config_path, args)?;
    let client = Arc::new(build_client(&config)?);
    let log = Arc::new(open_log(config_path));
    let job = Job::new(config, client).with_log(log);

    let mut updates = job.accumulator().subscribe();
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = *updates.borrow_and_update();
            eprint!("\r{snapshot}    ");
        }
    });

    let result = job.run().await;
    progress.abort();
    eprintln!();

    let summary = result.context("batch run failed")?;
    println!("{summary}");
    Ok(())
}

async fn sample(config_path: &Path, args: &JobArgs, count: usize, stdin: bool) -> Result<()> {
    let config = job_config(config_path, args)?;
    let prompts = if stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read prompts from stdin")?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    } else {
        sample_prompts(&config, count)?
    };
    if prompts.is_empty() {
        bail!("no prompts to preview");
    }

    let client = Arc::new(build_client(&config)?);
    let responses = preview(&config, client, &prompts).await;
    for (prompt, response) in prompts.iter().zip(&responses) {
        println!("> {prompt}\n{response}\n");
    }

    if args.save {
        let mut stored = load_config(config_path)?;
        args.apply(&mut stored)?;
        stored.sample_inputs = prompts.join("\n");
        save_config(config_path, &stored)?;
    }
    Ok(())
}

async fn models(config_path: &Path, connection: &ConnectionArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    connection.apply(&mut config);
    let client = build_client(&config)?;
    for model in client.list_models().await? {
        println!("{model}");
    }
    Ok(())
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace it",
            config_path.display()
        );
    }
    save_config(config_path, &JobConfig::default())?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

async fn context(config_path: &Path, action: ContextAction) -> Result<()> {
    let mut config = load_config(config_path)?;
    match action {
        ContextAction::Add {
            role,
            text,
            connection,
        } => {
            let text = match (role, text) {
                (_, Some(text)) => text,
                (TurnRole::User, None) => bail!("a user turn needs text"),
                (TurnRole::Assistant, None) => {
                    let mut connected = config.clone();
                    connection.apply(&mut connected);
                    let client = Arc::new(build_client(&connected)?);
                    let reply = preview(&connected, client, &[String::new()])
                        .await
                        .into_iter()
                        .next()
                        .unwrap_or_default();
                    if reply.is_empty() {
                        bail!("the model returned no reply for the current context");
                    }
                    reply
                }
            };
            let role = Role::from(role);
            println!("{}: {text}", role_label(role));
            config.context.push(Message::new(role, text));
        }
        ContextAction::Clear => config.context.clear(),
        ContextAction::Show => {
            println!("system: {}", config.system_message);
            for message in &config.context {
                println!("{}: {}", role_label(message.role), message.content);
            }
            return Ok(());
        }
    }
    save_config(config_path, &config)
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn show_log(config_path: &Path, clear: bool) -> Result<()> {
    let log = open_log(config_path);
    if clear {
        return log
            .clear()
            .with_context(|| format!("failed to clear {}", log.path().display()));
    }
    match log.read() {
        Ok(text) => print!("{text}"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", log.path().display()))
        }
    }
    Ok(())
}
