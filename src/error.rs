use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// One field that failed input validation, with the user-facing message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every failure a handler can return. Mapped to an HTTP status and the
/// uniform `{success: false, message}` envelope exactly once, here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("{0} already exists")]
    DuplicateCredential(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The token outlived the account; the caller has to register again.
    #[error("please signUp first")]
    AccountNotFound,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("please wait {remaining_minutes} minute(s) before requesting a new code")]
    RateLimited { remaining_minutes: i64 },

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("OTP has expired, please request a new one")]
    ExpiredOtp,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidOtp
            | Self::ExpiredOtp
            | Self::AlreadyVerified
            | Self::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            Self::DuplicateCredential(_) => StatusCode::CONFLICT,
            Self::NotFound(_) | Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match self {
            Self::Validation(errors) => ErrorBody {
                success: false,
                message: "validation error".into(),
                errors: Some(errors),
            },
            // Nothing from the underlying failure reaches the client.
            Self::Internal(source) => {
                error!(error = %source, "internal error");
                ErrorBody {
                    success: false,
                    message: "Internal server error".into(),
                    errors: None,
                }
            }
            other => ErrorBody {
                success: false,
                message: other.to_string(),
                errors: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation(vec![]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::DuplicateCredential("Email").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::NotFound("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::AccountNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::unauthenticated("please login first").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::RateLimited {
                remaining_minutes: 3
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::InvalidOtp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ExpiredOtp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            ApiError::DuplicateCredential("Email").to_string(),
            "Email already exists"
        );
        assert_eq!(ApiError::NotFound("User").to_string(), "User not found");
        assert_eq!(ApiError::AccountNotFound.to_string(), "please signUp first");
        assert_eq!(
            ApiError::RateLimited {
                remaining_minutes: 42
            }
            .to_string(),
            "please wait 42 minute(s) before requesting a new code"
        );
    }

    #[test]
    fn validation_envelope_carries_field_errors() {
        let err = ApiError::Validation(vec![FieldError::new(
            "email",
            "Invalid email format",
        )]);
        let body = ErrorBody {
            success: false,
            message: err.to_string(),
            errors: match err {
                ApiError::Validation(errors) => Some(errors),
                _ => None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""success":false"#));
        assert!(json.contains(r#""field":"email""#));
        assert!(json.contains("Invalid email format"));
    }

    #[test]
    fn internal_error_does_not_leak_its_source() {
        let response =
            ApiError::Internal(anyhow::anyhow!("connection refused (secret-host:5432)"))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
