pub mod ai;
pub mod composer;
pub mod config;
pub mod export;
pub mod prompts;
pub mod render;
