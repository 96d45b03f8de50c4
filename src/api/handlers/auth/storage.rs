//! Database helpers for accounts, the revocation ledger, and the outbox.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::defaults::ProvisionDefaults;
use super::lockout::LockoutPolicy;
use super::tokens::{TokenKind, TokenPair};
use super::utils::{hash_ledger_token, is_unique_violation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Account fields needed by the auth flows; the password hash is only
/// fetched by [`lookup_credentials`].
#[derive(Clone, Debug)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) is_email_verified: bool,
    pub(crate) is_locked: bool,
    pub(crate) is_active: bool,
    pub(crate) failed_login_attempts: i32,
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(UserRecord),
    Conflict,
}

const USER_COLUMNS: &str = r"
    id, name, email, role, is_email_verified, is_locked, is_active,
    failed_login_attempts
";

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role_text: String = row.get("role");
    let role = Role::parse(&role_text)
        .with_context(|| format!("unknown role in users table: {role_text}"))?;
    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role,
        is_email_verified: row.get("is_email_verified"),
        is_locked: row.get("is_locked"),
        is_active: row.get("is_active"),
        failed_login_attempts: row.get("failed_login_attempts"),
    })
}

pub(crate) async fn lookup_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    row.as_ref().map(row_to_user).transpose()
}

pub(super) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    row.as_ref().map(row_to_user).transpose()
}

/// Fetch account plus password hash for login. The hash never leaves the
/// login flow.
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<(UserRecord, String)>> {
    let query =
        format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE lower(email) = lower($1)");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    row.map(|row| {
        let hash: String = row.get("password_hash");
        row_to_user(&row).map(|user| (user, hash))
    })
    .transpose()
}

/// Everything a new account needs, pre-computed by the handler so the
/// whole signup lands in one transaction.
pub(super) struct NewAccount<'a> {
    pub(super) user_id: Uuid,
    pub(super) name: &'a str,
    pub(super) email: &'a str,
    pub(super) password_hash: &'a str,
    pub(super) session: &'a TokenPair,
    pub(super) access_ttl_seconds: i64,
    pub(super) refresh_ttl_seconds: i64,
    pub(super) email_template: &'a str,
    pub(super) email_payload: &'a serde_json::Value,
}

/// Create the account, its default satellite rows, the ledger entries for
/// the fresh token pair, and the verification-email outbox row in one
/// transaction.
///
/// A duplicate email maps to `Conflict` instead of an error so the handler
/// can answer 409 without string-matching.
pub(super) async fn create_account(
    pool: &PgPool,
    account: NewAccount<'_>,
    defaults: &dyn ProvisionDefaults,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = format!(
        r"
        INSERT INTO users (id, name, email, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(account.user_id)
        .bind(account.name)
        .bind(account.email)
        .bind(account.password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user = match row {
        Ok(row) => row_to_user(&row)?,
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    defaults.provision(&mut tx, user.id).await?;

    insert_ledger_entry(
        &mut tx,
        user.id,
        &account.session.access_token,
        TokenKind::Access,
        account.access_ttl_seconds,
    )
    .await?;
    insert_ledger_entry(
        &mut tx,
        user.id,
        &account.session.refresh_token,
        TokenKind::Refresh,
        account.refresh_ttl_seconds,
    )
    .await?;

    enqueue_email(
        &mut *tx,
        account.email,
        account.email_template,
        account.email_payload,
    )
    .await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created(user))
}

/// Default profile, settings, and achievements rows for a new account.
pub(crate) async fn insert_default_records(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<()> {
    for (table, query) in [
        ("profiles", "INSERT INTO profiles (user_id) VALUES ($1)"),
        (
            "user_settings",
            "INSERT INTO user_settings (user_id) VALUES ($1)",
        ),
        (
            "user_achievements",
            "INSERT INTO user_achievements (user_id) VALUES ($1)",
        ),
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .with_context(|| format!("failed to insert default {table} row"))?;
    }
    Ok(())
}

/// Reset the failure counter and stamp the login time after a successful
/// login.
pub(super) async fn record_login_success(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = 0, last_login = NOW(), updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record login success")?;
    Ok(())
}

/// Count a failed login and apply the lock in the same statement.
///
/// The increment and the threshold comparison happen atomically in SQL, so
/// concurrent failures each observe a distinct counter value and exactly
/// one of them crosses the threshold. Returns the post-increment count, or
/// `None` when the account vanished between lookup and update.
pub(super) async fn record_login_failure(
    pool: &PgPool,
    user_id: Uuid,
    policy: LockoutPolicy,
) -> Result<Option<i32>> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = failed_login_attempts + 1,
            is_locked = is_locked OR ($2 AND failed_login_attempts + 1 >= $3),
            updated_at = NOW()
        WHERE id = $1
        RETURNING failed_login_attempts
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(policy.enabled())
        .bind(policy.threshold())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to record login failure")?;

    Ok(row.map(|row| row.get("failed_login_attempts")))
}

/// Mark the email verified. Returns `false` when the account is gone.
pub(super) async fn set_email_verified(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = r"
        UPDATE users
        SET is_email_verified = TRUE, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(result.rows_affected() > 0)
}

/// Install a new password hash, clear the lockout state, and revoke every
/// outstanding session token, all in one transaction.
pub(super) async fn reset_password_and_unlock(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin password reset transaction")?;

    let query = r"
        UPDATE users
        SET password_hash = $2,
            is_locked = FALSE,
            failed_login_attempts = 0,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to reset password")?;

    if result.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(false);
    }

    revoke_all_for_user(&mut *tx, user_id).await?;

    tx.commit()
        .await
        .context("commit password reset transaction")?;
    Ok(true)
}

/// Activate or deactivate an account. Deactivation revokes every
/// outstanding token so existing sessions die with the account.
pub(crate) async fn set_active(pool: &PgPool, user_id: Uuid, active: bool) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin activation transaction")?;

    let query = r"
        UPDATE users
        SET is_active = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(active)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update activation state")?;

    if result.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(false);
    }

    if !active {
        revoke_all_for_user(&mut *tx, user_id).await?;
    }

    tx.commit().await.context("commit activation transaction")?;
    Ok(true)
}

pub(crate) async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<bool> {
    let query = r"
        UPDATE users
        SET role = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update role")?;
    Ok(result.rows_affected() > 0)
}

/// Delete the account. Ledger entries and satellite rows go with it via
/// `ON DELETE CASCADE`.
pub(crate) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

/// Record a freshly issued access/refresh pair in the ledger. Only hashes
/// are stored; the raw tokens go to the client alone.
pub(super) async fn store_token_pair(
    pool: &PgPool,
    user_id: Uuid,
    pair: &TokenPair,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin token ledger transaction")?;

    insert_ledger_entry(
        &mut tx,
        user_id,
        &pair.access_token,
        TokenKind::Access,
        access_ttl_seconds,
    )
    .await?;
    insert_ledger_entry(
        &mut tx,
        user_id,
        &pair.refresh_token,
        TokenKind::Refresh,
        refresh_ttl_seconds,
    )
    .await?;

    tx.commit()
        .await
        .context("commit token ledger transaction")?;
    Ok(())
}

/// Rotate a session: revoke every live ledger entry for the account and
/// record the replacement pair in the same transaction. Idempotent
/// revocation keeps concurrent rotations safe; each winner's fresh pair
/// is the only one left standing when its transaction commits.
pub(super) async fn rotate_session(
    pool: &PgPool,
    user_id: Uuid,
    pair: &TokenPair,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin rotation transaction")?;

    revoke_all_for_user(&mut *tx, user_id).await?;
    insert_ledger_entry(
        &mut tx,
        user_id,
        &pair.access_token,
        TokenKind::Access,
        access_ttl_seconds,
    )
    .await?;
    insert_ledger_entry(
        &mut tx,
        user_id,
        &pair.refresh_token,
        TokenKind::Refresh,
        refresh_ttl_seconds,
    )
    .await?;

    tx.commit().await.context("commit rotation transaction")?;
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    token: &str,
    kind: TokenKind,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO auth_tokens (user_id, token_hash, kind, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(hash_ledger_token(token))
        .bind(kind.as_str())
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert ledger entry")?;
    Ok(())
}

/// Whether a session token is still live in the ledger. Absent, revoked,
/// and expired entries all answer `false`.
pub(super) async fn is_token_active(pool: &PgPool, token: &str) -> Result<bool> {
    let query = r"
        SELECT EXISTS (
            SELECT 1 FROM auth_tokens
            WHERE token_hash = $1 AND NOT revoked AND expires_at > NOW()
        ) AS active
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_ledger_token(token))
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check ledger entry")?;
    Ok(row.get("active"))
}

/// Revoke every live ledger entry for one account. Idempotent: already
/// revoked entries are untouched, and the call succeeds with zero rows
/// when nothing was live.
pub(super) async fn revoke_all_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = r"
        UPDATE auth_tokens
        SET revoked = TRUE
        WHERE user_id = $1 AND NOT revoked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to revoke ledger entries")?;
    Ok(result.rows_affected())
}

/// Queue an email for the outbox worker.
pub(super) async fn enqueue_email<'e, E>(
    executor: E,
    to_email: &str,
    template: &str,
    payload_json: &serde_json::Value,
) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let payload_text =
        serde_json::to_string(payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

/// Drop ledger entries past their expiry. Expired entries already answer
/// inactive; this only reclaims space.
pub(super) async fn delete_expired_tokens(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM auth_tokens WHERE expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired ledger entries")?;
    Ok(result.rows_affected())
}

/// Background task that periodically garbage-collects expired ledger rows.
pub fn spawn_ledger_sweeper(pool: PgPool, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match delete_expired_tokens(&pool).await {
                Ok(0) => {}
                Ok(count) => tracing::debug!("swept {count} expired ledger entries"),
                Err(err) => warn!("ledger sweep failed: {err:#}"),
            }
        }
    });
}
