use reqwest::StatusCode;
use shopforge_core::ForgeError;
use thiserror::Error;

/// Failure surface of the infrastructure clients. Every external system
/// can fail independently; `is_retryable` is the classification the
/// pipeline uses to label a halted step for the operator.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{system} returned {status}: {body}")]
    Api {
        system: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{system}: {resource} not found")]
    NotFound {
        system: &'static str,
        resource: String,
    },

    #[error("{operation} did not complete within {waited_secs}s")]
    Timeout { operation: String, waited_secs: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("template error: {0}")]
    Template(String),
}

impl InfraError {
    /// Whether a retry could plausibly succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Timeout { .. } => true,
            Self::Database(e) => matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut),
            Self::Url(_) | Self::NotFound { .. } | Self::InvalidIdentifier(_) | Self::Template(_) => {
                false
            }
        }
    }

    /// Teardown steps treat a missing resource as already cleaned up.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<InfraError> for ForgeError {
    fn from(e: InfraError) -> Self {
        match &e {
            InfraError::Database(_) => ForgeError::Database(e.to_string()),
            _ => ForgeError::Infrastructure(e.to_string()),
        }
    }
}
