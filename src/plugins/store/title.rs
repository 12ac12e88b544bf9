use super::types::DEFAULT_CONVERSATION_TITLE;

const AUTO_TITLE_MAX_CHARS: usize = 36;
const RENAME_MAX_CHARS: usize = 80;

pub(crate) const UNTITLED_CONVERSATION: &str = "Untitled";
pub(crate) const UNTITLED_PROJECT: &str = "Project";

/// Title taken from the first user message: trimmed, then cut to 36 chars.
pub(crate) fn derive_title(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(AUTO_TITLE_MAX_CHARS).collect())
}

pub(crate) fn is_placeholder_title(title: &str) -> bool {
    title == DEFAULT_CONVERSATION_TITLE
}

/// Normalize a user-supplied name; blank input falls back to `fallback`.
pub(crate) fn normalize_name(input: &str, fallback: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(RENAME_MAX_CHARS).collect()
}
