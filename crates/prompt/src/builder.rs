//! Prompt builder: renders a definition's templates with Handlebars.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use askdoc_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::{Map, Value};

/// Build a prompt from a definition and template variables.
///
/// `role` and `goal` are rendered first and made available to the system
/// template. Variables are plain JSON so templates can iterate lists
/// (`{{#each evidence}}`).
///
/// # Example
/// ```no_run
/// use askdoc_prompt::{build_prompt, load_prompt, SYNTHESIS_PROMPT_ID};
/// use serde_json::json;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(Path::new("."), SYNTHESIS_PROMPT_ID)?;
/// let built = build_prompt(&def, json!({"query": "What is covered?", "evidence": "..."}))?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, variables: Value) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let mut variables = match variables {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(AppError::Prompt(format!(
                "Prompt variables must be an object, got {}",
                other
            )))
        }
    };

    let mut handlebars = Handlebars::new();
    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    let role = render(&handlebars, &definition.role, &variables)?;
    let goal = render(&handlebars, &definition.goal, &variables)?;
    variables.insert("role".to_string(), Value::String(role));
    variables.insert("goal".to_string(), Value::String(goal));

    let system = definition
        .system
        .as_deref()
        .map(|template| render(&handlebars, template, &variables))
        .transpose()?;

    let user = render(&handlebars, &definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables: variables.keys().cloned().collect(),
        },
    })
}

fn render(handlebars: &Handlebars<'_>, template: &str, variables: &Map<String, Value>) -> AppResult<String> {
    handlebars
        .render_template(template, variables)
        .map(|rendered| rendered.trim().to_string())
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{builtin_prompt, RETRIEVAL_PROMPT_ID, SYNTHESIS_PROMPT_ID};
    use serde_json::json;

    const SENTINEL: &str = "I'm sorry, I couldn't find the information you're looking for.";

    #[test]
    fn test_synthesis_prompt_carries_sentinel_verbatim() {
        let def = builtin_prompt(SYNTHESIS_PROMPT_ID).unwrap().unwrap();
        let built = build_prompt(
            &def,
            json!({
                "query": "How long is the warranty?",
                "evidence": "[Document 1] manual.pdf\nTwo years.",
                "sentinel": SENTINEL,
            }),
        )
        .unwrap();

        let system = built.system.unwrap();
        assert!(system.contains(SENTINEL));
        assert!(system.contains("How long is the warranty?"));
        assert!(built.user.starts_with("Question: How long is the warranty?"));
        assert!(built.user.contains("Two years."));
        assert_eq!(built.metadata.source_prompt_id, SYNTHESIS_PROMPT_ID);
    }

    #[test]
    fn test_retrieval_prompt_lists_evidence() {
        let def = builtin_prompt(RETRIEVAL_PROMPT_ID).unwrap().unwrap();
        let built = build_prompt(
            &def,
            json!({
                "query": "capital of France",
                "evidence": [
                    {"label": "Web", "number": 1, "origin": "https://a.example", "text": "Paris is the capital."},
                    {"label": "Web", "number": 2, "origin": "https://b.example", "text": "France, capital Paris."},
                ],
            }),
        )
        .unwrap();

        assert!(built.user.contains("[Web 1] https://a.example"));
        assert!(built.user.contains("Paris is the capital."));
        assert!(built.user.contains("---"));
        assert!(built.user.contains("[Web 2]"));
    }

    #[test]
    fn test_no_html_escaping() {
        let def = builtin_prompt(SYNTHESIS_PROMPT_ID).unwrap().unwrap();
        let built = build_prompt(&def, json!({"query": "a < b & c", "evidence": ""})).unwrap();
        assert!(built.user.contains("a < b & c"));
    }

    #[test]
    fn test_non_object_variables_rejected() {
        let def = builtin_prompt(SYNTHESIS_PROMPT_ID).unwrap().unwrap();
        assert!(build_prompt(&def, json!(["query"])).is_err());
    }
}
