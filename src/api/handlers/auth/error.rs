//! Typed failure taxonomy for auth operations.
//!
//! Orchestration helpers return `AuthFailure` so handlers never leak
//! internal errors to the transport layer. Messages are intentionally
//! generic: a caller cannot distinguish "unknown account" from "wrong
//! password", nor *why* a token was rejected.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    Conflict(&'static str),
    #[error("Rate limited")]
    RateLimited,
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

pub const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const MSG_INVALID_TOKEN: &str = "Invalid token";
pub const MSG_ACCOUNT_LOCKED: &str =
    "Account is locked due to repeated failed logins; reset your password to unlock it";
pub const MSG_ACCOUNT_INACTIVE: &str = "Account is deactivated";

impl AuthFailure {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        // Internal causes are logged server-side only; the body stays stable.
        if let Self::Internal(err) = &self {
            error!("internal failure: {err:#}");
        }
        let status = self.status();
        let body = match self {
            Self::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            AuthFailure::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthFailure::Forbidden(MSG_ACCOUNT_LOCKED).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthFailure::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthFailure::Conflict("Email already exists").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthFailure::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthFailure::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_message_is_generic() {
        let failure = AuthFailure::Internal(anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(failure.to_string(), "Internal error");
    }

    #[test]
    fn credential_message_is_shared() {
        let missing = AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS);
        let wrong = AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS);
        assert_eq!(missing.to_string(), wrong.to_string());
    }
}
