use reqwest::StatusCode;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::transport::TransportError;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the bearer token. Credentials and the whole cache
    /// have already been discarded when this is returned.
    #[error("{message}")]
    Unauthorized { message: String },

    #[error(transparent)]
    Connectivity(#[from] TransportError),

    /// Any other non-success response; `message` is the server's, verbatim.
    #[error("{message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    Url(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, ClientError::Connectivity(_))
    }

    /// Status of an application-level failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable error code from the server (`out_of_stock`, ...).
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
