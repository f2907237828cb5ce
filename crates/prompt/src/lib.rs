//! Prompt system for askdoc.
//!
//! - YAML-based prompt definitions, with built-in defaults compiled in
//! - Workspace overrides from `.askdoc/prompts/<id>.yml`
//! - Handlebars template rendering

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{RETRIEVAL_PROMPT_ID, SYNTHESIS_PROMPT_ID};
pub use loader::{load_prompt, load_prompt_file};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
