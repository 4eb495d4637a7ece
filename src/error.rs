pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    /// Transport-level failure on a required read: a non-success, non-404
    /// response from the backend.
    #[error("transfer failed with status {status}: {reason}")]
    Transfer { status: u16, reason: String },
    /// A required marker file was fetched but could not be interpreted.
    #[error("malformed metadata in {key}: {reason}")]
    MalformedMetadata { key: String, reason: String },
    /// The operation was cancelled; distinct from both success and failure.
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub(crate) fn transfer(status: reqwest::StatusCode) -> Self {
        Self::Transfer {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("unrecognized status")
                .to_string(),
        }
    }

    pub fn malformed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedMetadata {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
