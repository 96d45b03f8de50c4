//! # Konto (User Accounts & Authentication)
//!
//! `konto` is a user-account platform: registration, credential-based
//! authentication, token issuance and rotation, and account lifecycle
//! management over HTTP.
//!
//! ## Tokens
//!
//! Four bearer-token kinds are issued, each signed with its own secret:
//! short-lived **access** tokens, rotating **refresh** tokens, and
//! single-purpose **email-verify** / **password-reset** tokens. Access and
//! refresh tokens are additionally tracked in a server-side revocation
//! ledger; a token absent from the ledger is treated as revoked even when
//! its signature is valid.
//!
//! ## Lockout
//!
//! Five consecutive failed logins lock an account. A locked account rejects
//! logins (even with the correct password) until a successful password
//! reset clears the lock and the failure counter.
//!
//! ## Enumeration resistance
//!
//! Login failures for unknown accounts and wrong passwords return the same
//! generic message. Password-reset requests for unknown emails are accepted
//! silently rather than revealing whether an account exists.

pub mod api;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
