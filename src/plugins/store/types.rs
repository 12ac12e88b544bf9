use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONVERSATION_TITLE: &str = "New chat";
pub const DEFAULT_PROJECT_NAME: &str = "My Project";
pub const INDEX_HTML_PATH: &str = "index.html";

pub(crate) const DEFAULT_INDEX_HTML: &str = "<!doctype html>\n<html><head><meta charset='utf-8'><meta name='viewport' content='width=device-width,initial-scale=1'><title>New Project</title></head><body><h1>Hello</h1></body></html>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub(crate) fn new(id: String, now: u64) -> Self {
        Self {
            id,
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Last assistant message, i.e. the target of an in-flight stream.
    pub fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Older saves wrote this field as `type`.
    #[serde(alias = "type", default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub content: String,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

impl FileEntry {
    pub fn new(mime_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

impl Project {
    pub(crate) fn new(id: String, name: String, now: u64) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            INDEX_HTML_PATH.to_string(),
            FileEntry::new("text/html", DEFAULT_INDEX_HTML),
        );
        Self {
            id,
            name,
            updated_at: now,
            files,
        }
    }
}

/// Sidebar row for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: u64,
    pub message_count: u32,
    pub is_active: bool,
}

/// Sidebar row for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub updated_at: u64,
    pub file_count: u32,
    pub is_active: bool,
}
