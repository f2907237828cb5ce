//! Chat command handler.
//!
//! A line-oriented session: questions are answered against the loaded
//! document, `/upload` swaps it, `/reset` starts over.

use super::{answer, open_session, upload_document};
use crate::display::{print_sources, report_error};
use askdoc_core::config::AppConfig;
use askdoc_pipeline::{Role, SessionManager};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  /upload <path>   load a document (replaces the current one)
  /status          show the loaded document
  /history         show the conversation so far
  /reset           drop the document and the history
  /help            show this help
  /quit            leave
Anything else is a question.";

/// Interactive session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Document to load before the first question (PDF)
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Also accept .txt and .md documents
    #[arg(long)]
    pub allow_text: bool,

    /// Print answers at once instead of streaming them
    #[arg(long)]
    pub no_stream: bool,
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq)]
enum ReplInput<'a> {
    Empty,
    Quit,
    Help,
    Reset,
    History,
    Status,
    Upload(&'a str),
    Unknown(&'a str),
    Question(&'a str),
}

impl<'a> ReplInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Question(line);
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match name {
            "quit" | "exit" | "q" => Self::Quit,
            "help" | "?" => Self::Help,
            "reset" => Self::Reset,
            "history" => Self::History,
            "status" => Self::Status,
            "upload" if !arg.is_empty() => Self::Upload(arg),
            _ => Self::Unknown(line),
        }
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing chat command");

        let session = open_session(config).await?;
        if let Some(ref path) = self.document {
            upload_document(&session, path, self.allow_text).await?;
        }

        eprintln!("askdoc chat. Type /help for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt();
            let Some(line) = lines.next_line().await? else {
                break;
            };

            match ReplInput::parse(&line) {
                ReplInput::Empty => {}
                ReplInput::Quit => break,
                ReplInput::Help => eprintln!("{}", HELP),
                ReplInput::Reset => {
                    session.reset();
                    eprintln!("Session reset.");
                }
                ReplInput::History => print_history(&session),
                ReplInput::Status => print_status(&session),
                ReplInput::Upload(path) => {
                    if let Err(err) =
                        upload_document(&session, &PathBuf::from(path), self.allow_text).await
                    {
                        report_error(&err);
                    }
                }
                ReplInput::Unknown(line) => {
                    eprintln!("Unknown command {:?}. Type /help for commands.", line)
                }
                ReplInput::Question(question) => {
                    self.ask(&session, question).await;
                }
            }
        }

        tracing::info!("Chat ended after {} turns", session.history().len());
        Ok(())
    }

    async fn ask(&self, session: &SessionManager, question: &str) {
        match answer(session, question, !self.no_stream).await {
            Ok(answer) => {
                if self.no_stream {
                    println!("{}", answer.text);
                }
                print_sources(&answer);
            }
            Err(err) => report_error(&err),
        }
    }
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

fn print_status(session: &SessionManager) {
    match session.document_stats() {
        Some(stats) => eprintln!(
            "{} ({}): {} chunks",
            stats.document,
            session.phase(),
            stats.chunk_count
        ),
        None => eprintln!("No document loaded ({}).", session.phase()),
    }
}

fn print_history(session: &SessionManager) {
    let history = session.history();
    if history.is_empty() {
        eprintln!("No questions yet.");
    }
    for turn in history {
        let who = match turn.role {
            Role::User => "you",
            Role::Assistant => "askdoc",
        };
        eprintln!("[{}] {}: {}", turn.at.format("%H:%M:%S"), who, turn.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_question() {
        assert_eq!(
            ReplInput::parse("  What does the warranty cover? "),
            ReplInput::Question("What does the warranty cover?")
        );
        assert_eq!(ReplInput::parse("   "), ReplInput::Empty);
    }

    #[test]
    fn test_commands() {
        assert_eq!(ReplInput::parse("/quit"), ReplInput::Quit);
        assert_eq!(ReplInput::parse("/exit"), ReplInput::Quit);
        assert_eq!(ReplInput::parse("/help"), ReplInput::Help);
        assert_eq!(ReplInput::parse("/reset"), ReplInput::Reset);
        assert_eq!(ReplInput::parse("/history"), ReplInput::History);
        assert_eq!(ReplInput::parse("/status"), ReplInput::Status);
    }

    #[test]
    fn test_upload_takes_the_rest_of_the_line() {
        assert_eq!(
            ReplInput::parse("/upload  docs/user manual.pdf "),
            ReplInput::Upload("docs/user manual.pdf")
        );
        assert_eq!(ReplInput::parse("/upload"), ReplInput::Unknown("/upload"));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(ReplInput::parse("/frobnicate"), ReplInput::Unknown("/frobnicate"));
    }
}
