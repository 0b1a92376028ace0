use thiserror::Error;

/// Failures surfaced by the request layer and the services built on it.
///
/// Cloneable so that a single settled request can be handed to every caller
/// that joined it while it was in flight.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse buckets used to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Server,
    Network,
    Timeout,
    Validation,
    NotFound,
    Conflict,
    Unknown,
}

impl ErrorKind {
    /// Transient failures where asking the user to try again makes sense.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Server | ErrorKind::Network | ErrorKind::Timeout
        )
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::RateLimit(_) => ErrorKind::RateLimit,
            AppError::Server(_) => ErrorKind::Server,
            AppError::Network(_) => ErrorKind::Network,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Http { status: 404, .. } => ErrorKind::NotFound,
            AppError::Http { status: 409, .. } => ErrorKind::Conflict,
            AppError::Http { status: 400, .. } => ErrorKind::Validation,
            AppError::Http { status: 401 | 403, .. } => ErrorKind::Auth,
            other => classify_message(&other.to_string()),
        }
    }
}

/// Map free-form error text onto an [`ErrorKind`].
///
/// Used for errors that arrive as strings from collaborators (identity
/// provider, storage) so they get the same user messaging as typed ones.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["401", "unauthorized", "token", "auth", "sign in"]) {
        ErrorKind::Auth
    } else if has(&["429", "rate limit", "quota", "too many requests"]) {
        ErrorKind::RateLimit
    } else if has(&["timeout", "timed out"]) {
        ErrorKind::Timeout
    } else if has(&["500", "502", "503", "504", "server error", "internal error"]) {
        ErrorKind::Server
    } else if has(&["network", "offline", "connection", "failed to fetch"]) {
        ErrorKind::Network
    } else if has(&["already exists", "duplicate", "conflict"]) {
        ErrorKind::Conflict
    } else if has(&["not found", "404"]) {
        ErrorKind::NotFound
    } else if has(&["invalid", "validation", "must not be empty"]) {
        ErrorKind::Validation
    } else {
        ErrorKind::Unknown
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            AppError::Network(e.to_string())
        } else if e.is_decode() {
            AppError::Serialization(e.to_string())
        } else {
            AppError::Other(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Other(format!("{:#}", e))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("HTTP 401 Unauthorized"), ErrorKind::Auth);
        assert_eq!(classify_message("Quota exceeded for reads"), ErrorKind::RateLimit);
        assert_eq!(classify_message("Request timed out after 30s"), ErrorKind::Timeout);
        assert_eq!(classify_message("HTTP 503"), ErrorKind::Server);
        assert_eq!(classify_message("Connection reset"), ErrorKind::Network);
        assert_eq!(
            classify_message("A sheet named 'Acme' already exists"),
            ErrorKind::Conflict
        );
        assert_eq!(classify_message("Sheet not found"), ErrorKind::NotFound);
        assert_eq!(classify_message("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn test_kind_for_http_status() {
        let err = AppError::Http {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = AppError::Http {
            status: 418,
            message: "HTTP 418".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(AppError::Timeout("x".to_string()).kind().is_transient());
        assert!(!AppError::Conflict("x".to_string()).kind().is_transient());
    }
}
