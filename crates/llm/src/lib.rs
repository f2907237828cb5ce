//! LLM integration crate for askdoc.
//!
//! A provider-agnostic client trait used by the synthesis stage, with
//! OpenAI chat completions (default) and Ollama (local) implementations.
//!
//! # Example
//! ```no_run
//! use askdoc_llm::{LlmClient, LlmRequest, providers::OpenAiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAiClient::new("sk-...");
//! let request = LlmRequest::new("What does the warranty cover?", "gpt-4o")
//!     .with_temperature(0.7)
//!     .with_max_tokens(1000);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
mod lines;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderKind;
