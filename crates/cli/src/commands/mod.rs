//! Command handlers for the askdoc CLI.

pub mod ask;
pub mod chat;
pub mod index;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use index::IndexCommand;

use crate::display::{print_index_stats, report_tool_error, spawn_printer, BusyIndicator};
use crate::ingress::read_document;
use askdoc_core::config::AppConfig;
use askdoc_pipeline::{Answer, SessionManager, UploadOutcome};
use std::path::Path;
use tokio::sync::mpsc;

/// Validate configuration and construct the session with its services.
///
/// Tools that could not be set up are reported and left out; the session
/// still answers from the document.
pub async fn open_session(config: &AppConfig) -> anyhow::Result<SessionManager> {
    config.validate()?;
    let session = SessionManager::from_app_config(config).await?;
    for error in session.tool_errors() {
        report_tool_error(error);
    }
    Ok(session)
}

/// Check, read and index a document under the busy indicator.
pub async fn upload_document(
    session: &SessionManager,
    path: &Path,
    allow_text: bool,
) -> anyhow::Result<UploadOutcome> {
    let upload = read_document(path, allow_text).await?;

    let busy = BusyIndicator::start(format!("Indexing {}", upload.name));
    let result = session.upload_with_progress(upload, &busy.reporter()).await;
    busy.finish();

    let outcome = result?;
    match &outcome {
        UploadOutcome::Indexed(stats) => print_index_stats(stats),
        UploadOutcome::Unchanged => eprintln!("{} is already loaded", path.display()),
        UploadOutcome::Superseded => eprintln!("Upload of {} was superseded", path.display()),
    }
    Ok(outcome)
}

/// Ask `query`, printing the answer as it streams when `stream` is set.
pub async fn answer(session: &SessionManager, query: &str, stream: bool) -> anyhow::Result<Answer> {
    if !stream {
        return Ok(session.ask(query).await?);
    }

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx);
    let answer = session.ask_streaming(query, tx).await;
    printer.await?;
    Ok(answer?)
}
