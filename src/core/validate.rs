use crate::error::MetaError;

/// Rejects blank prompts and prompts longer than `max_chars` characters.
pub fn validate_prompt(prompt: &str, max_chars: usize) -> Result<(), MetaError> {
    if prompt.trim().is_empty() {
        return Err(MetaError::ValidationFailed("Prompt is empty".into()));
    }

    let len = prompt.chars().count();
    if len > max_chars {
        return Err(MetaError::ValidationFailed(format!(
            "Prompt is {len} characters long, limit is {max_chars}"
        )));
    }

    Ok(())
}
