//! Password login.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{
    AuthFailure, MSG_ACCOUNT_INACTIVE, MSG_ACCOUNT_LOCKED, MSG_INVALID_CREDENTIALS,
};
use super::lockout::{FailureOutcome, LockoutPolicy};
use super::password::verify_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{
    enqueue_email, lookup_credentials, record_login_failure, record_login_success,
    store_token_pair,
};
use super::tokens::TokenKind;
use super::types::{LoginRequest, TokenPairResponse};
use super::utils::{extract_client_ip, normalize_email, valid_email};

/// Exchange email + password for a token pair.
///
/// Unknown email and wrong password share one message so the response
/// cannot be used to probe for accounts. The lock and active checks run
/// before any password work, and the failure that crosses the lockout
/// threshold itself answers 403, not 401.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenPairResponse),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Invalid email or password", body = String),
        (status = 403, description = "Account locked or deactivated", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        // Malformed credentials get the same answer as wrong ones.
        return Err(AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS));
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return Err(AuthFailure::RateLimited);
    }

    let Some((user, password_hash)) = lookup_credentials(&pool, &email).await? else {
        return Err(AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS));
    };

    if user.is_locked {
        return Err(AuthFailure::Forbidden(MSG_ACCOUNT_LOCKED));
    }
    if !user.is_active {
        return Err(AuthFailure::Forbidden(MSG_ACCOUNT_INACTIVE));
    }

    if !verify_password(password_hash, request.password).await? {
        let policy = auth_state.lockout_policy();
        let attempts = record_login_failure(&pool, user.id, policy).await?;
        if let Some(attempts) = attempts {
            if policy.should_notify(attempts) {
                info!(user_id = %user.id, "account locked after repeated failed logins");
                // Best effort: a mail failure must not change the response.
                let payload = json!({ "email": user.email });
                if let Err(err) =
                    enqueue_email(&*pool, &user.email, "account_locked", &payload).await
                {
                    warn!("failed to enqueue lockout notification: {err:#}");
                }
            }
        }
        return Err(failure_response(policy, attempts));
    }

    record_login_success(&pool, user.id).await?;

    let signer = auth_state.signer();
    let pair = signer.issue_pair(user.id, &user.email, user.role)?;
    store_token_pair(
        &pool,
        user.id,
        &pair,
        signer.ttl_seconds(TokenKind::Access),
        signer.ttl_seconds(TokenKind::Refresh),
    )
    .await?;

    Ok((StatusCode::OK, Json(TokenPairResponse::from(pair))))
}

/// Map a recorded login failure to its response. The attempt that crosses
/// the lockout threshold answers 403 locked; every other failure, including
/// an account deleted mid-flight, keeps the shared credentials message.
fn failure_response(policy: LockoutPolicy, attempts: Option<i32>) -> AuthFailure {
    match attempts.map(|attempts| policy.classify_failure(attempts)) {
        Some(FailureOutcome::Locked) => AuthFailure::Forbidden(MSG_ACCOUNT_LOCKED),
        Some(FailureOutcome::Counted(_)) | None => {
            AuthFailure::Unauthorized(MSG_INVALID_CREDENTIALS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{lazy_pool, test_state};
    use super::{failure_response, login, LockoutPolicy, LoginRequest, MSG_ACCOUNT_LOCKED};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = login(HeaderMap::new(), Extension(pool), Extension(test_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_malformed_email_is_unauthorized() -> Result<()> {
        let pool = lazy_pool()?;
        let response = login(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Some(Json(LoginRequest {
                email: "not-an-email".to_string(),
                password: "secret123".to_string(),
            })),
        )
        .await
        .into_response();
        // Same status and message as a wrong password.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn login_empty_password_is_unauthorized() -> Result<()> {
        let pool = lazy_pool()?;
        let response = login(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Some(Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn crossing_failure_answers_locked() {
        let policy = LockoutPolicy::default();
        // Four failures still answer like a wrong password.
        assert_eq!(
            failure_response(policy, Some(4)).status(),
            StatusCode::UNAUTHORIZED
        );
        // The fifth locks the account and says so immediately.
        let locked = failure_response(policy, Some(5));
        assert_eq!(locked.status(), StatusCode::FORBIDDEN);
        assert_eq!(locked.to_string(), MSG_ACCOUNT_LOCKED);
        // Overshoot from concurrent failures stays 403.
        assert_eq!(
            failure_response(policy, Some(6)).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn vanished_account_keeps_credentials_message() {
        let policy = LockoutPolicy::default();
        assert_eq!(
            failure_response(policy, None).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn disabled_lockout_never_answers_locked() {
        let policy = LockoutPolicy::new(5, false);
        assert_eq!(
            failure_response(policy, Some(50)).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
