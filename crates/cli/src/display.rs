//! Terminal output: busy indicator, streamed answers and JSON.

use askdoc_core::AppError;
use askdoc_knowledge::{IndexStats, ProgressReporter};
use askdoc_pipeline::{Answer, SourceKind, ToolKind, ToolSetupError};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spinner on stderr while a document is indexed.
pub struct BusyIndicator {
    spinner: ProgressBar,
}

impl BusyIndicator {
    pub fn start(message: impl Into<String>) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
        );
        spinner.set_message(message.into());
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    /// Progress reporter that shows indexing phases on the spinner.
    pub fn reporter(&self) -> ProgressReporter {
        let spinner = self.spinner.clone();
        ProgressReporter::new(Arc::new(move |event| {
            spinner.set_message(event.format_simple());
        }))
    }

    pub fn finish(self) {
        self.spinner.finish_and_clear();
    }
}

pub fn print_index_stats(stats: &IndexStats) {
    eprintln!(
        "Indexed {}: {} chunks from {} bytes in {:.2}s ({} / {})",
        stats.document,
        stats.chunk_count,
        stats.size_bytes,
        stats.build_secs,
        stats.embedding_provider,
        stats.embedding_model
    );
}

/// Print chunks from `rx` as they arrive, until the sender is dropped.
pub fn spawn_printer(mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            stdout.flush().ok();
        }
        println!();
    })
}

pub fn print_sources(answer: &Answer) {
    if answer.sources.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        let kind = match source.kind {
            SourceKind::Document => "doc",
            SourceKind::WebSearch => "web",
            SourceKind::PageScrape => "page",
        };
        eprintln!("  [{}] {} {}", i + 1, kind, source.origin);
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an error, setting apart the ones the user has to act on.
pub fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(message)) => {
            eprintln!("Configuration error: {}", message);
            eprintln!(
                "Fix the provider settings in .askdoc/config.yaml or the environment."
            );
        }
        Some(AppError::Indexing(message)) => {
            eprintln!("Could not index the document: {}", message);
            eprintln!("Try uploading a different document.");
        }
        Some(AppError::StillIndexing(name)) => {
            eprintln!("Still indexing {}, ask again when it is done.", name)
        }
        _ => eprintln!("Error: {:#}", err),
    }
}

/// Print a tool left out of the session, with the flag that silences it.
pub fn report_tool_error(error: &ToolSetupError) {
    let flag = match error.tool {
        ToolKind::WebSearch => "--no-web",
        ToolKind::PageScrape => "--no-scrape",
        ToolKind::DocumentSearch => "",
    };
    eprintln!("Configuration error ({}): {}", error.tool, error.message);
    if !flag.is_empty() {
        eprintln!("Continuing without {}. Pass {} to disable it.", error.tool, flag);
    }
}
