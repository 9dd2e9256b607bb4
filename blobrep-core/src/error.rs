use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("conflict ({code}): {message}")]
    Conflict { code: String, message: String },

    #[error("integrity mismatch for {key}: {detail}")]
    IntegrityMismatch { key: String, detail: String },

    #[error("external store error: {0}")]
    TransientStore(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BlobError>;

impl BlobError {
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the replication worker should try the same message again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Whether the facade boundary may swallow this error in production/test
    /// mode. Integrity drift, conflicts and configuration mistakes always
    /// surface to the caller.
    pub fn is_degradable(&self) -> bool {
        !matches!(
            self,
            Self::IntegrityMismatch { .. }
                | Self::Conflict { .. }
                | Self::Config(_)
                | Self::InvalidRequest(_)
        )
    }

    /// HTTP-equivalent status for callers that surface errors to users.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict { .. } => 409,
            Self::InvalidRequest(_) => 400,
            Self::TransientStore(_) => 503,
            _ => 500,
        }
    }

    /// Machine-readable code carried by conflicts.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Conflict { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

impl From<object_store::Error> for BlobError {
    fn from(error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            object_store::Error::InvalidPath { source } => {
                Self::InvalidRequest(format!("invalid object path: {}", source))
            }
            other => Self::TransientStore(other.to_string()),
        }
    }
}
