//! Prompt types.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
///
/// `role`, `goal`, `system` and `template` are all Handlebars templates.
/// `role` and `goal` are rendered first and exposed to `system` as
/// `{{role}}` and `{{goal}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    pub api_version: String,

    #[serde(default)]
    pub created_by: String,

    /// Who the model acts as
    #[serde(default)]
    pub role: String,

    /// What the model is trying to achieve
    #[serde(default)]
    pub goal: String,

    /// System message template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template
    pub template: String,

    pub output: PromptOutputSpec,
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "text", "markdown")
    pub format: String,
}

/// A fully rendered prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,

    pub user: String,

    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPromptMetadata {
    pub source_prompt_id: String,

    /// Names of the variables supplied to the templates
    pub resolved_variables: Vec<String>,
}
