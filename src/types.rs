//! Error types for grapevine

/// Main error type for grapevine operations
#[derive(Debug, thiserror::Error)]
pub enum GrapevineError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Self reference: {0}")]
    SelfReference(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GrapevineError {
    /// HTTP status code for embedding API layers
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) => 401,
            Self::NotFound(_) => 404,
            Self::SelfReference(_) => 422,
            Self::AlreadyExists(_) => 409,
            Self::Forbidden(_) => 403,
            Self::RateLimited(_) => 429,
            Self::BadRequest(_) => 400,
            Self::Database(_) => 503,
            Self::Internal(_) => 500,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for GrapevineError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GrapevineError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for GrapevineError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for grapevine operations
pub type Result<T> = std::result::Result<T, GrapevineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GrapevineError::Unauthenticated("no caller".into()).status_code(),
            401
        );
        assert_eq!(
            GrapevineError::AlreadyExists("edge".into()).status_code(),
            409
        );
        assert_eq!(
            GrapevineError::RateLimited("follow".into()).status_code(),
            429
        );
    }
}
