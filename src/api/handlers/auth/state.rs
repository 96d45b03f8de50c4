//! Auth configuration and shared handler state.

use std::sync::Arc;

use super::defaults::ProvisionDefaults;
use super::lockout::{LockoutPolicy, DEFAULT_LOCKOUT_THRESHOLD};
use super::rate_limit::RateLimiter;
use super::tokens::TokenSigner;

const DEFAULT_LEDGER_SWEEP_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    lockout_threshold: i32,
    lockout_enabled: bool,
    ledger_sweep_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_enabled: true,
            ledger_sweep_seconds: DEFAULT_LEDGER_SWEEP_SECONDS,
        }
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: i32) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_enabled(mut self, enabled: bool) -> Self {
        self.lockout_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_ledger_sweep_seconds(mut self, seconds: u64) -> Self {
        self.ledger_sweep_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.lockout_threshold, self.lockout_enabled)
    }

    #[must_use]
    pub fn ledger_sweep_seconds(&self) -> u64 {
        self.ledger_sweep_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    signer: TokenSigner,
    rate_limiter: Arc<dyn RateLimiter>,
    defaults: Arc<dyn ProvisionDefaults>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        rate_limiter: Arc<dyn RateLimiter>,
        defaults: Arc<dyn ProvisionDefaults>,
    ) -> Self {
        Self {
            config,
            signer,
            rate_limiter,
            defaults,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn defaults(&self) -> &dyn ProvisionDefaults {
        self.defaults.as_ref()
    }

    pub(super) fn lockout_policy(&self) -> LockoutPolicy {
        self.config.lockout_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::super::defaults::NoopDefaults;
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::tokens::{test_support::FixedClock, TokenConfig, TokenSigner};
    use super::{AuthConfig, AuthState};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn token_config() -> TokenConfig {
        TokenConfig::new(
            SecretString::from("access-secret"),
            SecretString::from("refresh-secret"),
            SecretString::from("verify-secret"),
            SecretString::from("reset-secret"),
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://konto.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://konto.dev");
        assert_eq!(config.lockout_policy().threshold(), 5);
        assert!(config.lockout_policy().enabled());
        assert_eq!(
            config.ledger_sweep_seconds(),
            super::DEFAULT_LEDGER_SWEEP_SECONDS
        );

        let config = config
            .with_lockout_threshold(3)
            .with_lockout_enabled(false)
            .with_ledger_sweep_seconds(60);

        assert_eq!(config.lockout_policy().threshold(), 3);
        assert!(!config.lockout_policy().enabled());
        assert_eq!(config.ledger_sweep_seconds(), 60);
    }

    #[test]
    fn auth_state_constructs_with_noop_seams() {
        let config = AuthConfig::new("https://konto.dev".to_string());
        let signer = TokenSigner::new(token_config(), Arc::new(FixedClock::new(1_000)));
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(config, signer, limiter, Arc::new(NoopDefaults));

        assert_eq!(state.config().frontend_base_url(), "https://konto.dev");
        assert_eq!(state.lockout_policy().threshold(), 5);
    }
}
