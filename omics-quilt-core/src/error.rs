use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuiltError>;

#[derive(Debug, Error)]
pub enum QuiltError {
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unsupported file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Transfer failed for {uri}: {message}")]
    Transfer { uri: String, message: String },

    #[error("No file detected for analysis")]
    NoInput,

    #[error("Multiple storage records in one event are not supported (got {0})")]
    UnsupportedBatch(usize),

    #[error("Error launching {failed} of {total} workflow runs, check logs")]
    PartialFailure { failed: usize, total: usize },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Workflow runner error: {0}")]
    Runner(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuiltError {
    pub(crate) fn transfer(uri: impl Into<String>, message: impl ToString) -> Self {
        QuiltError::Transfer {
            uri: uri.into(),
            message: message.to_string(),
        }
    }

    /// Maps an object store failure for `uri` onto the locator taxonomy.
    pub(crate) fn from_object_store(uri: &str, error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { .. } => QuiltError::NotFound(uri.to_string()),
            other => QuiltError::transfer(uri, other),
        }
    }

    /// True for failures caused by the triggering input rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            QuiltError::NoInput | QuiltError::UnsupportedBatch(_) | QuiltError::InvalidEvent(_)
        )
    }
}

impl From<serde_json::Error> for QuiltError {
    fn from(error: serde_json::Error) -> Self {
        QuiltError::Parse(format!("json: {}", error))
    }
}

impl From<serde_yaml::Error> for QuiltError {
    fn from(error: serde_yaml::Error) -> Self {
        QuiltError::Parse(format!("yaml: {}", error))
    }
}
