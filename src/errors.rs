pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("role id missing")]
    RoleIdMissing,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("session storage error")]
    Storage(#[from] sqlx::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Message shown to the operator in a notification.
    ///
    /// Backend-provided detail wins over the generic description of the error kind.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Remote { message, .. } if !message.trim().is_empty() => message.clone(),
            AppError::Remote { status, .. } => format!("Request failed with status {status}"),
            AppError::Validation(message)
            | AppError::Unauthorized(message)
            | AppError::NotFound(message) => message.clone(),
            AppError::RoleIdMissing => "Role id is missing".to_string(),
            AppError::Timeout(_) => "The server took too long to respond".to_string(),
            AppError::Transport(_) => "Could not reach the server".to_string(),
            AppError::Decode(_) => "The server sent an unexpected response".to_string(),
            AppError::Storage(_) => "Local session storage failed".to_string(),
            AppError::Configuration(message) => message.clone(),
            AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }

    /// True for failures detected before any remote call was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::RoleIdMissing)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout(value.to_string())
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_is_preferred() {
        let err = AppError::remote(422, "Email already registered");
        assert_eq!(err.user_message(), "Email already registered");

        let blank = AppError::remote(500, "  ");
        assert_eq!(blank.user_message(), "Request failed with status 500");
    }

    #[test]
    fn validation_kinds_are_flagged() {
        assert!(AppError::validation("nope").is_validation());
        assert!(AppError::RoleIdMissing.is_validation());
        assert!(!AppError::timeout("slow").is_validation());
    }
}
