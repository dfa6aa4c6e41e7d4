use crate::constants::{BASE_PROMPT, USER_PROMPT_PREFIX};

/// Build the final provider prompt from an already-normalized caller prompt.
///
/// The base template is always sent; caller instructions are appended
/// verbatim when non-empty.
pub fn combine_prompts(normalized_prompt: &str) -> String {
    if normalized_prompt.is_empty() {
        return BASE_PROMPT.to_string();
    }

    let mut prompt =
        String::with_capacity(BASE_PROMPT.len() + USER_PROMPT_PREFIX.len() + normalized_prompt.len());
    prompt.push_str(BASE_PROMPT);
    prompt.push_str(USER_PROMPT_PREFIX);
    prompt.push_str(normalized_prompt);
    prompt
}
