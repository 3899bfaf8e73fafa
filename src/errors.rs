use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Coarse classification of an [`AppError`], used to pick the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    RegistryUnavailable,
    RegistryError,
    MalformedResponse,
    Database,
    Internal,
}

/// Status code for every error kind. The boundary never inspects message text.
const STATUS_TABLE: &[(ErrorKind, StatusCode)] = &[
    (ErrorKind::Validation, StatusCode::BAD_REQUEST),
    (ErrorKind::Conflict, StatusCode::CONFLICT),
    (ErrorKind::Unauthorized, StatusCode::UNAUTHORIZED),
    (ErrorKind::Forbidden, StatusCode::FORBIDDEN),
    (ErrorKind::NotFound, StatusCode::NOT_FOUND),
    (ErrorKind::RegistryUnavailable, StatusCode::SERVICE_UNAVAILABLE),
    (ErrorKind::RegistryError, StatusCode::BAD_GATEWAY),
    (ErrorKind::MalformedResponse, StatusCode::BAD_GATEWAY),
    (ErrorKind::Database, StatusCode::INTERNAL_SERVER_ERROR),
    (ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR),
];

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        STATUS_TABLE
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, status)| *status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Stable machine-readable code included in error bodies.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RegistryUnavailable => "registry_unavailable",
            ErrorKind::RegistryError => "registry_error",
            ErrorKind::MalformedResponse => "malformed_registry_response",
            ErrorKind::Database => "database_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Malformed input or a broken business rule.
    Validation(String),
    /// A unique field is already taken.
    Conflict(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Authenticated, but not allowed.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// The external registry could not be reached (connect error, timeout).
    RegistryUnavailable(String),
    /// The external registry answered with a non-success status.
    RegistryError {
        /// HTTP status returned by the registry.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// The registry answered, but not with the expected document shape.
    MalformedResponse(String),
    /// Database-related errors.
    Database(sqlx::Error),
    /// Internal server error.
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Kind of the innermost error; context wrappers are transparent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::RegistryUnavailable(_) => ErrorKind::RegistryUnavailable,
            AppError::RegistryError { .. } => ErrorKind::RegistryError,
            AppError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            AppError::Database(_) => ErrorKind::Database,
            AppError::Internal(_) => ErrorKind::Internal,
            AppError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Message safe to hand back to API clients.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized(_) => "Unauthorized".to_string(),
            AppError::RegistryUnavailable(_) => "Registry service unavailable".to_string(),
            AppError::RegistryError { status, .. } => {
                format!("Registry service returned status {}", status)
            }
            AppError::MalformedResponse(_) => "Registry returned an unexpected response".to_string(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RegistryUnavailable(msg) => write!(f, "Registry unavailable: {}", msg),
            AppError::RegistryError { status, body } => {
                write!(f, "Registry returned status {}: {}", status, body)
            }
            AppError::MalformedResponse(msg) => write!(f, "Malformed registry response: {}", msg),
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps the error kind to a status through the lookup table and logs
    /// server-side failures with their full detail.
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status();

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else if matches!(kind, ErrorKind::Unauthorized | ErrorKind::Forbidden) {
            tracing::warn!("Access denied: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "status": "error",
            "message": self.public_message(),
            "code": kind.code(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    /// Unique violations become conflicts so a lost check-then-insert race
    /// reads the same as a failed uniqueness check.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique constraint").to_string();
                return AppError::Conflict(format!("Duplicate value violates {}", constraint));
            }
        }
        AppError::Database(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: f(),
        })
    }
}
