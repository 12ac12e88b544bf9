//! Builds the user turn from typed text plus attached files.

use std::path::Path;

pub const ATTACHMENT_TEXT_LIMIT: usize = 120_000;
const TRUNCATED_MARKER: &str = "\n\n[TRUNCATED]";
const ATTACHMENTS_HEADER: &str = "\n\n---\nAttachments:\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Inlined text. Always empty for images.
    pub text: String,
}

fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(ATTACHMENT_TEXT_LIMIT) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATED_MARKER),
        None => text.to_string(),
    }
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, text: &str) -> Self {
        let mime_type = mime_type.into();
        let text = if mime_type.starts_with("image/") {
            String::new()
        } else {
            truncate_text(text)
        };
        Self {
            name: name.into(),
            mime_type,
            text,
        }
    }

    /// Read a local file. Images keep only their name; other files are read
    /// as (lossy) UTF-8.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        if mime_type.starts_with("image/") {
            return Ok(Self::new(name, mime_type, ""));
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::new(name, mime_type, &String::from_utf8_lossy(&bytes)))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Final user message content, or `None` when there is nothing to send.
pub fn compose_message(text: &str, attachments: &[Attachment]) -> Option<String> {
    let text = text.trim();
    if text.is_empty() && attachments.is_empty() {
        return None;
    }

    let mut content = text.to_string();
    if !attachments.is_empty() {
        content.push_str(ATTACHMENTS_HEADER);
        for attachment in attachments {
            content.push_str(&format!("- {}\n", attachment.name));
            if !attachment.text.is_empty() {
                content.push_str(&format!("```text\n{}\n```\n", attachment.text));
            }
        }
    }
    Some(content)
}

/// Attachments staged for the next send.
#[derive(Debug, Default)]
pub struct Composer {
    attachments: Vec<Attachment>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn clear(&mut self) {
        self.attachments.clear();
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}
