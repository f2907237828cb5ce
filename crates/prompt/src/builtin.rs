//! Prompt definitions shipped with askdoc.

use crate::types::PromptDefinition;
use askdoc_core::{AppError, AppResult};

/// Renders a `RetrievalResult` into the evidence block handed to synthesis.
pub const RETRIEVAL_PROMPT_ID: &str = "retrieval.default";

/// Turns the evidence block into the final answer.
pub const SYNTHESIS_PROMPT_ID: &str = "synthesis.default";

const RETRIEVAL_YAML: &str = include_str!("../prompts/retrieval.default.yml");
const SYNTHESIS_YAML: &str = include_str!("../prompts/synthesis.default.yml");

/// Look up a built-in definition by ID.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<Option<PromptDefinition>> {
    let source = match prompt_id {
        RETRIEVAL_PROMPT_ID => RETRIEVAL_YAML,
        SYNTHESIS_PROMPT_ID => SYNTHESIS_YAML,
        _ => return Ok(None),
    };

    serde_yaml::from_str(source)
        .map(Some)
        .map_err(|e| AppError::Prompt(format!("Built-in prompt {} is invalid: {}", prompt_id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_parse() {
        let retrieval = builtin_prompt(RETRIEVAL_PROMPT_ID).unwrap().unwrap();
        assert_eq!(retrieval.id, RETRIEVAL_PROMPT_ID);

        let synthesis = builtin_prompt(SYNTHESIS_PROMPT_ID).unwrap().unwrap();
        assert!(synthesis.system.unwrap().contains("{{sentinel}}"));
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_prompt("agent.plan").unwrap().is_none());
    }
}
