//! askdoc CLI
//!
//! Ask questions about a document, with a web search fallback.

mod commands;
mod display;
mod ingress;

use askdoc_core::config::{AppConfig, CliOverrides, ScrapeTrigger};
use askdoc_core::{init_logging, LogFormat};
use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, IndexCommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// askdoc - answers from your document, or from the web when it has none
#[derive(Parser, Debug)]
#[command(name = "askdoc")]
#[command(about = "Question answering over a document with web search fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "ASKDOC_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "ASKDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (error, warn, info, debug, trace or a full directive)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// LLM provider (openai, ollama)
    #[arg(short, long, global = true, env = "ASKDOC_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "ASKDOC_MODEL")]
    model: Option<String>,

    /// Disable the web search fallback
    #[arg(long, global = true)]
    no_web: bool,

    /// Disable page scraping of web results
    #[arg(long, global = true)]
    no_scrape: bool,

    /// When to scrape a web result (never, insufficient-snippets, always)
    #[arg(long, global = true)]
    scrape_trigger: Option<ScrapeTrigger>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask one question, optionally about a document
    Ask(AskCommand),

    /// Interactive session with uploads, history and reset
    Chat(ChatCommand),

    /// Index a document and show what a search finds in it
    Index(IndexCommand),
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            workspace: self.workspace.clone(),
            config_file: self.config.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            verbose: self.verbose,
            no_color: self.no_color,
            no_web: self.no_web,
            no_scrape: self.no_scrape,
            scrape_trigger: self.scrape_trigger,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            display::report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load()?.with_overrides(cli.overrides());

    let format: LogFormat = config.log_format.parse()?;
    init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("askdoc starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {} ({})", config.provider, config.model);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Index(_) => "index",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
