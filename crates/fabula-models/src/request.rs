//! Incoming story-generation requests and their validation rules.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError as FieldError};

const MIN_PROMPT_WORDS: usize = 5;

/// A request to generate a new story.
///
/// Validation mirrors what the public surface enforces before a job is
/// accepted; the worker re-checks on dequeue so a malformed payload
/// never reaches the providers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct StoryRequest {
    /// Story title
    #[validate(length(min = 3, max = 200, message = "title must be 3-200 characters"))]
    pub title: String,

    /// Prompt text the pipeline narrates and illustrates
    #[validate(
        length(min = 10, max = 1000, message = "prompt must be 10-1000 characters"),
        custom(function = "validate_prompt_words")
    )]
    pub prompt_text: String,
}

impl StoryRequest {
    /// Trim surrounding whitespace from both fields before validation.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.prompt_text = self.prompt_text.trim().to_string();
        self
    }

    /// Normalize then validate, producing a single describable error.
    pub fn into_validated(self) -> Result<Self, ValidationError> {
        let normalized = self.normalized();
        normalized.validate().map_err(ValidationError::from)?;
        Ok(normalized)
    }
}

fn validate_prompt_words(prompt: &str) -> Result<(), FieldError> {
    if prompt.split_whitespace().count() < MIN_PROMPT_WORDS {
        return Err(FieldError::new("prompt_too_few_words")
            .with_message(format!("prompt must contain at least {MIN_PROMPT_WORDS} words").into()));
    }
    Ok(())
}

/// A request rejected before entering the pipeline.
#[derive(Debug, thiserror::Error)]
#[error("invalid request: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{field}: {msg}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self { message }
    }
}
