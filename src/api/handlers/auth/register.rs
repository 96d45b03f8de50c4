//! Account registration.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::error::AuthFailure;
use super::password::hash_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{create_account, NewAccount, Role, SignupOutcome};
use super::tokens::TokenKind;
use super::types::{RegisterRequest, SessionResponse};
use super::utils::{build_verify_url, extract_client_ip, normalize_email, valid_email};

const MIN_PASSWORD_LEN: usize = 8;

/// Create a new account and start its first session.
///
/// The account row, default satellite rows, ledger entries for the fresh
/// token pair, and the verification-email outbox row land in a single
/// transaction, so a half-created account is never observable.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid payload", body = String),
        (status = 409, description = "Email already exists", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Missing payload".to_string()));
    };

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AuthFailure::Validation("Missing name".to_string()));
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthFailure::Validation("Invalid email".to_string()));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthFailure::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return Err(AuthFailure::RateLimited);
    }

    let password_hash = hash_password(request.password).await?;

    // The id is generated here so tokens can be signed before the insert
    // and recorded in the same transaction.
    let user_id = Uuid::new_v4();
    let signer = auth_state.signer();
    let pair = signer.issue_pair(user_id, &email, Role::User)?;
    let verify_token = signer.issue_action(TokenKind::EmailVerify, user_id)?;
    let verify_url = build_verify_url(auth_state.config().frontend_base_url(), &verify_token);
    let email_payload = json!({
        "email": email,
        "verify_url": verify_url,
    });

    let outcome = create_account(
        &pool,
        NewAccount {
            user_id,
            name: &name,
            email: &email,
            password_hash: &password_hash,
            session: &pair,
            access_ttl_seconds: signer.ttl_seconds(TokenKind::Access),
            refresh_ttl_seconds: signer.ttl_seconds(TokenKind::Refresh),
            email_template: "verify_email",
            email_payload: &email_payload,
        },
        auth_state.defaults(),
    )
    .await?;

    match outcome {
        SignupOutcome::Created(user) => Ok((
            StatusCode::CREATED,
            Json(SessionResponse::new(&user, pair)),
        )),
        SignupOutcome::Conflict => Err(AuthFailure::Conflict("Email already exists")),
    }
}
