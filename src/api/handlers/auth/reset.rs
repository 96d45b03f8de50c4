//! Password reset: request a reset link, then consume it.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use super::error::{AuthFailure, MSG_ACCOUNT_INACTIVE, MSG_INVALID_TOKEN};
use super::password::hash_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{enqueue_email, lookup_user_by_email, reset_password_and_unlock};
use super::tokens::TokenKind;
use super::types::{ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{build_reset_url, extract_client_ip, normalize_email, valid_email};

const MIN_PASSWORD_LEN: usize = 8;

/// Queue a password-reset email.
///
/// Unknown and malformed emails answer 204 like known ones, so the
/// endpoint cannot be used to probe for accounts. A deactivated account
/// is the one deliberate exception and answers 403.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset accepted"),
        (status = 400, description = "Invalid payload", body = String),
        (status = 403, description = "Account deactivated", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Ok(StatusCode::NO_CONTENT);
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ForgotPassword)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::ForgotPassword)
            == RateLimitDecision::Limited
    {
        // Limits stay opaque too.
        return Ok(StatusCode::NO_CONTENT);
    }

    let Some(user) = lookup_user_by_email(&pool, &email).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };
    if !user.is_active {
        return Err(AuthFailure::Forbidden(MSG_ACCOUNT_INACTIVE));
    }

    let token = auth_state
        .signer()
        .issue_action(TokenKind::PasswordReset, user.id)?;
    let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
    let payload = json!({
        "email": user.email,
        "reset_url": reset_url,
    });
    if let Err(err) = enqueue_email(&*pool, &user.email, "password_reset", &payload).await {
        // Keep the response opaque even when the outbox write fails.
        warn!("failed to enqueue password reset email: {err:#}");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Consume a reset token: install the new password, clear the lockout
/// state, and revoke every outstanding session.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Invalid/expired token or weak password", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthFailure::Validation("Missing token".to_string()));
    }
    if request.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthFailure::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let claims = auth_state
        .signer()
        .verify_action(TokenKind::PasswordReset, token)
        .map_err(|_| AuthFailure::Validation(MSG_INVALID_TOKEN.to_string()))?;

    let password_hash = hash_password(request.new_password).await?;

    if !reset_password_and_unlock(&pool, claims.sub, &password_hash).await? {
        return Err(AuthFailure::Validation(MSG_INVALID_TOKEN.to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{lazy_pool, test_state};
    use super::{forgot_password, reset_password, ForgotPasswordRequest, ResetPasswordRequest};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;

    #[tokio::test]
    async fn forgot_password_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = forgot_password(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_malformed_email_is_opaque() -> Result<()> {
        let pool = lazy_pool()?;
        let response = forgot_password(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_garbage_token() -> Result<()> {
        let pool = lazy_pool()?;
        let response = reset_password(
            Extension(pool),
            Extension(test_state()),
            Some(Json(ResetPasswordRequest {
                token: "not-a-jwt".to_string(),
                new_password: "secret123".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_short_password() -> Result<()> {
        let pool = lazy_pool()?;
        let state = test_state();
        let token = state
            .signer()
            .issue_action(super::TokenKind::PasswordReset, uuid::Uuid::new_v4())?;
        let response = reset_password(
            Extension(pool),
            Extension(state),
            Some(Json(ResetPasswordRequest {
                token,
                new_password: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
