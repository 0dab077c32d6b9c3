use http::StatusCode;
use thiserror::Error;

pub type RouterResult<T> = Result<T, RouterError>;

/// Error type shared by the router and its backends.
///
/// Every error maps to an HTTP status via [`RouterError::http_status`];
/// kinds without a natural status default to 500. The dispatch engine
/// classifies backend failures purely by that status.
#[derive(Error, Debug)]
pub enum RouterError {
    /// A federated read in which every participant reported 404.
    #[error("not found")]
    NotFound,

    /// One or more remote backends failed with something other than 404.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// The caller's context carries no tokens to forward.
    #[error("no token provided")]
    NoToken,

    #[error("configuration problem: {0}")]
    Config(String),

    /// An error reported by a backend, preserving its HTTP status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// The request's cancellation signal fired while a call was in flight.
    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RouterError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            RouterError::NotFound => StatusCode::NOT_FOUND,
            RouterError::BadGateway(_) | RouterError::Client(_) => StatusCode::BAD_GATEWAY,
            RouterError::NoToken => StatusCode::UNAUTHORIZED,
            RouterError::Http { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// An error carrying an explicit HTTP status, as received from a backend.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        RouterError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        RouterError::BadGateway(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        RouterError::Config(message.into())
    }
}
