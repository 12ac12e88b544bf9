//! Built-in prompts.

/// System prompt used until the user saves their own.
pub const SYSTEM_PROMPT_DEFAULT: &str = "You are an advanced agent. Output complete working code. For projects, output multiple files using ```file path``` blocks.";
