//! Email verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{AuthFailure, MSG_INVALID_TOKEN};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::authenticate_bearer;
use super::state::AuthState;
use super::storage::{enqueue_email, set_email_verified};
use super::tokens::TokenKind;
use super::types::VerifyEmailRequest;
use super::utils::{build_verify_url, extract_client_ip};

/// Consume an email-verify token and mark the address verified.
///
/// Verifying an already verified address succeeds again with 204; the
/// token proves control of the mailbox either way.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid/expired token", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthFailure::Validation("Missing token".to_string()));
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        return Err(AuthFailure::RateLimited);
    }

    let claims = auth_state
        .signer()
        .verify_action(TokenKind::EmailVerify, token)
        .map_err(|_| AuthFailure::Validation(MSG_INVALID_TOKEN.to_string()))?;

    if !set_email_verified(&pool, claims.sub).await? {
        // The account behind the token is gone.
        return Err(AuthFailure::Validation(MSG_INVALID_TOKEN.to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Send a fresh verification email to the authenticated account.
#[utoipa::path(
    post,
    path = "/v1/auth/send-verification",
    responses(
        (status = 204, description = "Verification email queued"),
        (status = 400, description = "Missing bearer token", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Email already verified", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn send_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let user = authenticate_bearer(&pool, &auth_state, &headers).await?;

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&user.email, RateLimitAction::VerifyEmail)
            == RateLimitDecision::Limited
    {
        return Err(AuthFailure::RateLimited);
    }

    if user.is_email_verified {
        return Err(AuthFailure::Forbidden("Email already verified"));
    }

    let token = auth_state
        .signer()
        .issue_action(TokenKind::EmailVerify, user.id)?;
    let verify_url = build_verify_url(auth_state.config().frontend_base_url(), &token);
    let payload = json!({
        "email": user.email,
        "verify_url": verify_url,
    });
    enqueue_email(&*pool, &user.email, "verify_email", &payload).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{lazy_pool, test_state};
    use super::{send_verification, verify_email, VerifyEmailRequest};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;

    #[tokio::test]
    async fn verify_email_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = verify_email(HeaderMap::new(), Extension(pool), Extension(test_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_garbage_token() -> Result<()> {
        let pool = lazy_pool()?;
        let response = verify_email(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Some(Json(VerifyEmailRequest {
                token: "not-a-jwt".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_rejects_reset_token() -> Result<()> {
        // A password-reset token must not verify an email.
        let pool = lazy_pool()?;
        let state = test_state();
        let reset = state
            .signer()
            .issue_action(super::TokenKind::PasswordReset, uuid::Uuid::new_v4())?;
        let response = verify_email(
            HeaderMap::new(),
            Extension(pool),
            Extension(state),
            Some(Json(VerifyEmailRequest { token: reset })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn send_verification_missing_bearer() -> Result<()> {
        let pool = lazy_pool()?;
        let response = send_verification(HeaderMap::new(), Extension(pool), Extension(test_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
