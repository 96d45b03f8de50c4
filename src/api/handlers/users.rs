//! Account management endpoints: lookup, activation, role changes, and
//! deletion. All of them authenticate via bearer access token; mutations
//! require the admin role.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::error::AuthFailure;
use super::auth::session::authenticate_bearer;
use super::auth::storage::{
    delete_user as delete_user_record, lookup_user, set_active, set_role, UserRecord,
};
use super::auth::types::{UpdateRoleRequest, UserSummary};
use super::auth::{AuthState, Role};

fn parse_user_id(raw: &str) -> Result<Uuid, AuthFailure> {
    Uuid::parse_str(raw).map_err(|_| AuthFailure::Validation("Invalid user id".to_string()))
}

fn require_admin(caller: &UserRecord) -> Result<(), AuthFailure> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(AuthFailure::Forbidden("Admin role required"))
    }
}

fn require_admin_or_self(caller: &UserRecord, target: Uuid) -> Result<(), AuthFailure> {
    if caller.role == Role::Admin || caller.id == target {
        Ok(())
    } else {
        Err(AuthFailure::Forbidden("Admin role required"))
    }
}

/// Fetch an account summary. Accounts can read themselves; admins can read
/// anyone.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Account summary", body = UserSummary),
        (status = 400, description = "Invalid user id", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Admin role required", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AuthFailure> {
    let target = parse_user_id(&id)?;
    let caller = authenticate_bearer(&pool, &auth_state, &headers).await?;
    require_admin_or_self(&caller, target)?;

    let Some(user) = lookup_user(&pool, target).await? else {
        return Err(AuthFailure::NotFound);
    };

    Ok((StatusCode::OK, Json(UserSummary::from(&user))))
}

async fn update_activation(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
    raw_id: &str,
    active: bool,
) -> Result<impl IntoResponse, AuthFailure> {
    let target = parse_user_id(raw_id)?;
    let caller = authenticate_bearer(pool, auth_state, headers).await?;
    require_admin(&caller)?;

    let Some(mut user) = lookup_user(pool, target).await? else {
        return Err(AuthFailure::NotFound);
    };
    if user.is_active == active {
        return Err(AuthFailure::Validation(
            if active {
                "Account is already active"
            } else {
                "Account is already deactivated"
            }
            .to_string(),
        ));
    }

    if !set_active(pool, target, active).await? {
        return Err(AuthFailure::NotFound);
    }
    user.is_active = active;

    Ok((StatusCode::OK, Json(UserSummary::from(&user))))
}

/// Reactivate a deactivated account.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/activate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Account activated", body = UserSummary),
        (status = 400, description = "Invalid id or already active", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Admin role required", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn activate_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AuthFailure> {
    update_activation(&headers, &pool, &auth_state, &id, true).await
}

/// Deactivate an account. Every outstanding token is revoked with it.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/deactivate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Account deactivated", body = UserSummary),
        (status = 400, description = "Invalid id or already deactivated", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Admin role required", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn deactivate_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AuthFailure> {
    update_activation(&headers, &pool, &auth_state, &id, false).await
}

/// Change an account's role.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/role",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserSummary),
        (status = 400, description = "Invalid id or role", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Admin role required", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
    payload: Option<Json<UpdateRoleRequest>>,
) -> Result<impl IntoResponse, AuthFailure> {
    let target = parse_user_id(&id)?;
    // An unknown role fails deserialization, so a missing and an invalid
    // payload land on the same answer.
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::Validation("Invalid role".to_string()));
    };

    let caller = authenticate_bearer(&pool, &auth_state, &headers).await?;
    require_admin(&caller)?;

    let Some(mut user) = lookup_user(&pool, target).await? else {
        return Err(AuthFailure::NotFound);
    };

    if !set_role(&pool, target, request.role).await? {
        return Err(AuthFailure::NotFound);
    }
    user.role = request.role;

    Ok((StatusCode::OK, Json(UserSummary::from(&user))))
}

/// Delete an account. Ledger entries and satellite rows cascade with it.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Account deleted", body = String),
        (status = 400, description = "Invalid user id", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 403, description = "Admin role required", body = String),
        (status = 404, description = "Not found", body = String)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AuthFailure> {
    let target = parse_user_id(&id)?;
    let caller = authenticate_bearer(&pool, &auth_state, &headers).await?;
    require_admin(&caller)?;

    if !delete_user_record(&pool, target).await? {
        return Err(AuthFailure::NotFound);
    }

    Ok((StatusCode::OK, "User deleted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::auth::test_support::{lazy_pool, test_state};
    use super::{get_user, update_role};
    use anyhow::Result;
    use axum::extract::{Extension, Path};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn get_user_malformed_id() -> Result<()> {
        let pool = lazy_pool()?;
        let response = get_user(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Path("not-a-uuid".to_string()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn get_user_missing_bearer() -> Result<()> {
        let pool = lazy_pool()?;
        let response = get_user(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Path(uuid::Uuid::new_v4().to_string()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn update_role_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let response = update_role(
            HeaderMap::new(),
            Extension(pool),
            Extension(test_state()),
            Path(uuid::Uuid::new_v4().to_string()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
