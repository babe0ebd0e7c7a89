/// Shared error type used across all facadegw crates.
///
/// Every variant maps onto one stable, machine-readable code (see
/// [`Error::code`]).  `Io` and `Json` exist so `?` works on library calls;
/// both classify as `internal` and never reach the caller verbatim.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("disabled: {0}")]
    Disabled(String),

    #[error("conflict: {} changed since the manifest was started", .paths.join(", "))]
    Conflict { paths: Vec<String> },

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes surfaced in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Disabled,
    Conflict,
    RateLimited,
    ProviderUnavailable,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Disabled => "disabled",
            ErrorCode::Conflict => "conflict",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::ProviderUnavailable => "provider_unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Disabled(_) => ErrorCode::Disabled,
            Error::Conflict { .. } => ErrorCode::Conflict,
            Error::RateLimited { .. } => ErrorCode::RateLimited,
            Error::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            Error::Timeout(_) => ErrorCode::Timeout,
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => ErrorCode::Internal,
        }
    }

    /// Whether this failure must be hidden behind a correlation id.
    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::Internal
    }

    /// Message that is safe to hand back to a caller.
    ///
    /// Internal failures return a fixed string; callers get the detail only
    /// through the correlation id the dispatcher attaches.
    pub fn public_message(&self) -> String {
        match self {
            Error::InvalidInput(m)
            | Error::NotFound(m)
            | Error::Disabled(m)
            | Error::ProviderUnavailable(m)
            | Error::Timeout(m) => m.clone(),
            Error::Conflict { paths } => {
                format!("files changed since the manifest was started: {}", paths.join(", "))
            }
            Error::RateLimited { retry_after_secs } => {
                format!("rate limit exceeded, retry after {retry_after_secs}s")
            }
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => "internal error".into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}
