//! Bearer authentication and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{AuthFailure, MSG_INVALID_TOKEN};
use super::state::AuthState;
use super::storage::{is_token_active, lookup_user, revoke_all_for_user, UserRecord};
use super::tokens::TokenKind;
use super::utils::extract_bearer_token;

/// Authenticate a request by its bearer access token.
///
/// Signature, expiry, ledger liveness, and account existence are all
/// required; the caller gets the current account row, not the claims, so
/// stale role or lock data in the token cannot be trusted past this point.
pub(crate) async fn authenticate_bearer(
    pool: &PgPool,
    auth_state: &AuthState,
    headers: &HeaderMap,
) -> Result<UserRecord, AuthFailure> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthFailure::Validation("Missing bearer token".to_string()));
    };

    let claims = auth_state
        .signer()
        .verify_session(TokenKind::Access, &token)
        .map_err(|_| AuthFailure::Unauthorized(MSG_INVALID_TOKEN))?;

    if !is_token_active(pool, &token).await? {
        return Err(AuthFailure::Unauthorized(MSG_INVALID_TOKEN));
    }

    let Some(user) = lookup_user(pool, claims.sub).await? else {
        return Err(AuthFailure::Unauthorized(MSG_INVALID_TOKEN));
    };

    Ok(user)
}

/// End every session for the authenticated account.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 400, description = "Missing bearer token", body = String),
        (status = 401, description = "Invalid token", body = String)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let user = authenticate_bearer(&pool, &auth_state, &headers).await?;

    revoke_all_for_user(&*pool, user.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{lazy_pool, test_state};
    use super::logout;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn logout_missing_bearer() -> Result<()> {
        let pool = lazy_pool()?;
        let response = logout(HeaderMap::new(), Extension(pool), Extension(test_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn logout_garbage_token_is_unauthorized() -> Result<()> {
        let pool = lazy_pool()?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"));
        let response = logout(headers, Extension(pool), Extension(test_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn logout_rejects_refresh_token() -> Result<()> {
        // Refresh tokens rotate sessions; they do not authenticate requests.
        let pool = lazy_pool()?;
        let state = test_state();
        let refresh = state.signer().issue_session(
            super::TokenKind::Refresh,
            uuid::Uuid::new_v4(),
            "alice@example.com",
            super::super::storage::Role::User,
        )?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {refresh}"))?,
        );
        let response = logout(headers, Extension(pool), Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
