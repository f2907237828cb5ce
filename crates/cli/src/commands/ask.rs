//! Ask command handler.
//!
//! One question, optionally about a document uploaded for this run only.

use super::{answer, open_session, upload_document};
use crate::display::{print_json, print_sources};
use askdoc_core::config::AppConfig;
use askdoc_knowledge::DocumentIdentity;
use askdoc_pipeline::{Answer, PipelineId};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Ask one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Document to answer from (PDF)
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Also accept .txt and .md documents
    #[arg(long)]
    pub allow_text: bool,

    /// Print the answer at once instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskOutput<'a> {
    question: &'a str,
    #[serde(flatten)]
    answer: &'a Answer,
    document: Option<DocumentIdentity>,
    pipeline_id: Option<PipelineId>,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.question.join(" ");
        let session = open_session(config).await?;

        if let Some(ref path) = self.document {
            upload_document(&session, path, self.allow_text).await?;
        }

        let stream = !self.no_stream && !self.json;
        let answer = answer(&session, &question, stream).await?;

        if self.json {
            return print_json(&AskOutput {
                question: &question,
                answer: &answer,
                document: session.document_identity(),
                pipeline_id: session.pipeline_id(),
            });
        }

        if !stream {
            println!("{}", answer.text);
        }
        print_sources(&answer);
        Ok(())
    }
}
