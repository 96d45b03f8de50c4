//! Authentication and session integrity: registration, login, token
//! rotation, email verification, password reset, and logout.

pub mod defaults;
pub mod error;
pub mod lockout;
pub mod login;
pub mod password;
pub mod rate_limit;
pub mod refresh;
pub mod register;
pub mod reset;
pub mod session;
pub mod state;
pub mod storage;
pub mod tokens;
pub mod types;
mod utils;
pub mod verification;

pub use state::{AuthConfig, AuthState};
pub use storage::{spawn_ledger_sweeper, Role};
pub use tokens::{SystemClock, TokenConfig, TokenSigner};

#[cfg(test)]
pub(crate) mod test_support {
    use super::defaults::NoopDefaults;
    use super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::state::{AuthConfig, AuthState};
    use super::tokens::{SystemClock, TokenConfig, TokenSigner};
    use anyhow::Result;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::sync::Arc;

    /// Pool that never connects; handler tests only exercise paths that
    /// return before touching the database.
    pub(crate) fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    pub(crate) fn test_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://konto.dev".to_string());
        let token_config = TokenConfig::new(
            SecretString::from("access-secret"),
            SecretString::from("refresh-secret"),
            SecretString::from("verify-secret"),
            SecretString::from("reset-secret"),
        );
        let signer = TokenSigner::new(token_config, Arc::new(SystemClock));
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(config, signer, limiter, Arc::new(NoopDefaults)))
    }
}
