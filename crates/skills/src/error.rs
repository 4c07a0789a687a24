use {serde::Serialize, skillsyoga_common::FromMessage};

/// Failure taxonomy for every engine operation. `Display` is always one
/// short line suitable for showing to a user as-is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Traversal, or a path resolving outside its root.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Missing manifest, file, directory, root or tool.
    #[error("not found: {0}")]
    NotFound(String),
    /// Rename/create/copy target already exists.
    #[error("already exists: {0}")]
    Conflict(String),
    /// Disallowed remote locator or malformed request.
    #[error("{0}")]
    Validation(String),
    /// Directory deletion attempted on a non-empty directory.
    #[error("directory is not empty: {0}")]
    NotEmpty(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Snapshot fetch failure (clone or download), reported verbatim.
    #[error("{0}")]
    Fetch(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{message}")]
    Message { message: String },
}

/// Stable discriminant of [`Error`] for callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    Conflict,
    Validation,
    NotEmpty,
    Io,
    Fetch,
    Cancelled,
    Other,
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath(message.into())
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::Io(_) => ErrorKind::Io,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Message { .. } => ErrorKind::Other,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

impl From<skillsyoga_config::Error> for Error {
    fn from(err: skillsyoga_config::Error) -> Self {
        match err {
            skillsyoga_config::Error::Io(e) => Self::Io(e),
            skillsyoga_config::Error::NotFound { message } => Self::NotFound(message),
            skillsyoga_config::Error::Validation { message } => Self::Validation(message),
            other => Self::message(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::message(format!("background task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

skillsyoga_common::impl_context!();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_single_line() {
        let errors = [
            Error::invalid_path("../etc"),
            Error::not_found("SKILL.md"),
            Error::conflict("notes.md"),
            Error::NotEmpty("assets".into()),
            Error::Cancelled,
        ];
        for err in errors {
            assert!(!err.to_string().contains('\n'), "{err}");
        }
    }

    #[test]
    fn config_errors_keep_their_kind() {
        let err: Error = skillsyoga_config::Error::not_found("tool not found: x").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: Error = skillsyoga_config::Error::validation("bad id").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
