//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::{Role, UserRecord};
use super::tokens::TokenPair;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Account summary returned to clients; never carries the password hash.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub is_active: bool,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_email_verified: user.is_email_verified,
            is_active: user.is_active,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
}

impl SessionResponse {
    #[must_use]
    pub(super) fn new(user: &UserRecord, pair: TokenPair) -> Self {
        Self {
            user: UserSummary::from(user),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let request = RegisterRequest {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret12".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: RegisterRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.name, "Alice");
        Ok(())
    }

    #[test]
    fn user_summary_omits_sensitive_fields() -> Result<()> {
        let user = UserRecord {
            id: Uuid::new_v4(),
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            role: Role::User,
            is_email_verified: false,
            is_locked: false,
            is_active: true,
            failed_login_attempts: 2,
        };
        let value = serde_json::to_value(UserSummary::from(&user))?;
        assert!(value.get("password_hash").is_none());
        assert!(value.get("failed_login_attempts").is_none());
        assert!(value.get("is_locked").is_none());
        assert_eq!(
            value.get("role").and_then(serde_json::Value::as_str),
            Some("user")
        );
        Ok(())
    }

    #[test]
    fn update_role_request_rejects_unknown_role() {
        let result: Result<UpdateRoleRequest, _> =
            serde_json::from_value(serde_json::json!({ "role": "superuser" }));
        assert!(result.is_err());
    }
}
