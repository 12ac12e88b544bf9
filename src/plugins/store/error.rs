use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreError {
    #[error("NotFound: {message}")]
    NotFound { message: String },
    #[error("InvalidInput: {message}")]
    InvalidInput { message: String },
    #[error("Persistence: {message}")]
    Persistence { message: String },
    #[error("Internal: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message }
            | Self::InvalidInput { message }
            | Self::Persistence { message }
            | Self::Internal { message } => message,
        }
    }
}

/// Failure to write through to the durable backing.
///
/// The in-memory model is already updated when this is reported; callers
/// surface it as "changes not saved".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PersistError {
    #[error("Unavailable: {message}")]
    Unavailable { message: String },
    #[error("QuotaExceeded: {message}")]
    QuotaExceeded { message: String },
    #[error("Serialize: {message}")]
    Serialize { message: String },
}

impl PersistError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unavailable { message }
            | Self::QuotaExceeded { message }
            | Self::Serialize { message } => message,
        }
    }
}

impl From<PersistError> for StoreError {
    fn from(err: PersistError) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

fn is_quota_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("quota")
        || lower.contains("no space")
        || lower.contains("disk full")
        || lower.contains("file too large")
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        let message = err.to_string();
        if err.kind() == std::io::ErrorKind::StorageFull || is_quota_error(&message) {
            return Self::quota_exceeded(message);
        }
        Self::unavailable(message)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialize(err.to_string())
    }
}
