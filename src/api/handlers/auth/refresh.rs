//! Session rotation via refresh token.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{
    AuthFailure, MSG_ACCOUNT_INACTIVE, MSG_ACCOUNT_LOCKED, MSG_INVALID_TOKEN,
};
use super::state::AuthState;
use super::storage::{is_token_active, lookup_user, rotate_session};
use super::tokens::TokenKind;
use super::types::{RefreshRequest, TokenPairResponse};

/// Exchange a live refresh token for a fresh pair.
///
/// The presented token must verify *and* still be live in the ledger; the
/// rotation then revokes every outstanding record for the account before
/// recording the new pair, so the old pair can never be replayed. Role and
/// lock state are re-read from the account, not trusted from the claims.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session rotated", body = TokenPairResponse),
        (status = 400, description = "Invalid payload", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Account locked or deactivated", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let token = request.refresh_token.trim();
    if token.is_empty() {
        return Err(AuthFailure::Validation("Missing token".to_string()));
    }

    let signer = auth_state.signer();
    let claims = signer
        .verify_session(TokenKind::Refresh, token)
        .map_err(|_| AuthFailure::Unauthorized(MSG_INVALID_TOKEN))?;

    // Absent, revoked, and expired ledger entries all read as revoked.
    if !is_token_active(&pool, token).await? {
        return Err(AuthFailure::Unauthorized(MSG_INVALID_TOKEN));
    }

    let Some(user) = lookup_user(&pool, claims.sub).await? else {
        return Err(AuthFailure::Unauthorized(MSG_INVALID_TOKEN));
    };
    if user.is_locked {
        return Err(AuthFailure::Forbidden(MSG_ACCOUNT_LOCKED));
    }
    if !user.is_active {
        return Err(AuthFailure::Forbidden(MSG_ACCOUNT_INACTIVE));
    }

    let pair = signer.issue_pair(user.id, &user.email, user.role)?;
    rotate_session(
        &pool,
        user.id,
        &pair,
        signer.ttl_seconds(TokenKind::Access),
        signer.ttl_seconds(TokenKind::Refresh),
    )
    .await?;

    Ok((StatusCode::OK, Json(TokenPairResponse::from(pair))))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{lazy_pool, test_state};
    use super::{refresh, RefreshRequest};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Json;

    #[tokio::test]
    async fn refresh_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = refresh(Extension(pool), Extension(test_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_garbage_token_is_unauthorized() -> Result<()> {
        let pool = lazy_pool()?;
        let response = refresh(
            Extension(pool),
            Extension(test_state()),
            Some(Json(RefreshRequest {
                refresh_token: "not-a-jwt".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() -> Result<()> {
        // A valid *access* token must not rotate a session.
        let pool = lazy_pool()?;
        let state = test_state();
        let access = state.signer().issue_session(
            super::TokenKind::Access,
            uuid::Uuid::new_v4(),
            "alice@example.com",
            super::super::storage::Role::User,
        )?;
        let response = refresh(
            Extension(pool),
            Extension(state),
            Some(Json(RefreshRequest {
                refresh_token: access,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
