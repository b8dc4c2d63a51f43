/* Failures that cross a component boundary are categorized here instead of
being passed around as raw `anyhow::Error`s. Collaborators (storage, route
source) keep returning `anyhow::Result`; the core maps those at the call site
into one of the kinds below and keeps the original error as `cause` for
logging.
*/
use strum_macros::{Display, EnumIter};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ErrorKind {
    Network,
    Storage,
    MalformedResponse,
    // expected, should not be shown to the user as an error
    Cancelled,
    Validation,
    Unexpected,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<anyhow::Error>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: anyhow::Error) -> Self {
        Error {
            kind,
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn network(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::with_cause(ErrorKind::Network, message, cause)
    }

    pub fn storage(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::with_cause(ErrorKind::Storage, message, cause)
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Operation was cancelled")
    }

    pub fn unexpected(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::with_cause(ErrorKind::Unexpected, message, cause)
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Short text suitable for showing to the user. Validation and response
    /// errors already carry a precise message, everything else gets a
    /// generic prefix so internals don't leak into the UI.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation | ErrorKind::MalformedResponse => self.message.clone(),
            ErrorKind::Network => format!("Network error: {}", self.message),
            ErrorKind::Storage => format!("Storage error: {}", self.message),
            ErrorKind::Cancelled => self.message.clone(),
            ErrorKind::Unexpected => format!("Unexpected error: {}", self.message),
        }
    }

    /// Full text including the underlying cause chain, for the log file.
    pub fn log_message(&self) -> String {
        match &self.cause {
            None => format!("[{}] {}", self.kind, self.message),
            Some(cause) => format!("[{}] {}: {:#}", self.kind, self.message, cause),
        }
    }
}
