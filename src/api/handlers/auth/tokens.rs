//! Token issuance and verification.
//!
//! Four bearer-token kinds, each signed with its own HS256 secret: `access`
//! and `refresh` carry session claims and are tracked in the revocation
//! ledger; `email-verify` and `password-reset` are single-purpose and rely
//! on signature + embedded expiry alone. The distinct secrets plus a `kind`
//! claim prevent a token of one purpose from ever being accepted where
//! another is expected.
//!
//! Expiry is computed and checked against an injected [`Clock`] so
//! verification is deterministic under test.

use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::storage::Role;

/// Wall-clock source for expiry computation; injectable for tests.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Clone, Copy, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerify,
    PasswordReset,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::EmailVerify => "email-verify",
            Self::PasswordReset => "password-reset",
        }
    }
}

/// Claims carried by access and refresh tokens. The `jti` makes every
/// issued token unique even when two are signed in the same second, so
/// ledger hashes never collide.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by single-purpose (email-verify, password-reset) tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionClaims {
    pub sub: Uuid,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// Bad signature, malformed token, wrong claim shape, or wrong kind.
    Invalid,
    /// Signature valid but the token is past its expiry.
    Expired,
}

/// Signing secrets and TTLs per token kind.
pub struct TokenConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    verify_secret: SecretString,
    reset_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    verify_ttl_seconds: i64,
    reset_ttl_seconds: i64,
}

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFY_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;

impl TokenConfig {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        verify_secret: SecretString,
        reset_secret: SecretString,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            verify_secret,
            reset_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            verify_ttl_seconds: DEFAULT_VERIFY_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

/// Issues and verifies all four token kinds.
pub struct TokenSigner {
    access: KindKeys,
    refresh: KindKeys,
    verify: KindKeys,
    reset: KindKeys,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    #[must_use]
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let keys = |secret: &SecretString, ttl_seconds: i64| KindKeys {
            encoding: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            ttl_seconds,
        };
        Self {
            access: keys(&config.access_secret, config.access_ttl_seconds),
            refresh: keys(&config.refresh_secret, config.refresh_ttl_seconds),
            verify: keys(&config.verify_secret, config.verify_ttl_seconds),
            reset: keys(&config.reset_secret, config.reset_ttl_seconds),
            clock,
        }
    }

    fn kind_keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::EmailVerify => &self.verify,
            TokenKind::PasswordReset => &self.reset,
        }
    }

    #[must_use]
    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    #[must_use]
    pub fn ttl_seconds(&self, kind: TokenKind) -> i64 {
        self.kind_keys(kind).ttl_seconds
    }

    /// Sign an access or refresh token for the given identity.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_session(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String> {
        let keys = self.kind_keys(kind);
        let iat = self.clock.now_unix();
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            kind,
            jti: Uuid::new_v4(),
            iat,
            exp: iat.saturating_add(keys.ttl_seconds),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .context("failed to sign session token")
    }

    /// Sign a single-purpose (email-verify or password-reset) token.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_action(&self, kind: TokenKind, user_id: Uuid) -> Result<String> {
        let keys = self.kind_keys(kind);
        let iat = self.clock.now_unix();
        let claims = ActionClaims {
            sub: user_id,
            kind,
            iat,
            exp: iat.saturating_add(keys.ttl_seconds),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .context("failed to sign action token")
    }

    /// Issue a fresh access/refresh pair for one identity.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_pair(&self, user_id: Uuid, email: &str, role: Role) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_session(TokenKind::Access, user_id, email, role)?,
            refresh_token: self.issue_session(TokenKind::Refresh, user_id, email, role)?,
        })
    }

    /// Verify an access or refresh token against its kind's secret.
    ///
    /// Signature, claim shape, kind, and expiry are all checked; callers
    /// must additionally consult the revocation ledger.
    ///
    /// # Errors
    /// Returns `Invalid` on any signature/shape/kind mismatch and
    /// `Expired` when only the expiry check fails.
    pub fn verify_session(&self, kind: TokenKind, token: &str) -> Result<SessionClaims, VerifyError> {
        let claims: SessionClaims = self.decode(kind, token)?;
        if claims.kind != kind {
            return Err(VerifyError::Invalid);
        }
        if claims.exp <= self.clock.now_unix() {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }

    /// Verify a single-purpose token against its kind's secret.
    ///
    /// # Errors
    /// Returns `Invalid` on any signature/shape/kind mismatch and
    /// `Expired` when only the expiry check fails.
    pub fn verify_action(&self, kind: TokenKind, token: &str) -> Result<ActionClaims, VerifyError> {
        let claims: ActionClaims = self.decode(kind, token)?;
        if claims.kind != kind {
            return Err(VerifyError::Invalid);
        }
        if claims.exp <= self.clock.now_unix() {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<T, VerifyError> {
        let keys = self.kind_keys(kind);
        // Expiry is validated explicitly against the injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<T>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| VerifyError::Invalid)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed, manually advanced clock for deterministic expiry tests.
    pub struct FixedClock(AtomicI64);

    impl FixedClock {
        pub fn new(now: i64) -> Self {
            Self(AtomicI64::new(now))
        }

        pub fn advance(&self, seconds: i64) {
            self.0.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
