use serde::Serialize;
use thiserror::Error;

/// Failures that callers branch on. Everything else travels as plain
/// `anyhow` context and classifies as [`ErrorKind::Internal`].
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("page not found: {title}")]
    PageNotFound { title: String },
    #[error("remote service error: {0}")]
    RemoteService(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PageNotFound,
    RemoteService,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageNotFound => "page_not_found",
            Self::RemoteService => "remote_service_error",
            Self::Storage => "storage_error",
            Self::Internal => "internal_error",
        }
    }
}

/// Walks the cause chain and reports the first recognizable failure.
pub fn error_kind(error: &anyhow::Error) -> ErrorKind {
    for cause in error.chain() {
        if let Some(skill_error) = cause.downcast_ref::<SkillError>() {
            return match skill_error {
                SkillError::PageNotFound { .. } => ErrorKind::PageNotFound,
                SkillError::RemoteService(_) => ErrorKind::RemoteService,
                SkillError::Storage(_) => ErrorKind::Storage,
            };
        }
        if cause.is::<rusqlite::Error>() {
            return ErrorKind::Storage;
        }
        if cause.is::<reqwest::Error>() {
            return ErrorKind::RemoteService;
        }
    }
    ErrorKind::Internal
}

pub fn is_page_not_found(error: &anyhow::Error) -> bool {
    error_kind(error) == ErrorKind::PageNotFound
}
