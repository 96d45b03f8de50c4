use crate::{
    api,
    api::handlers::auth::{AuthConfig, TokenConfig},
    cli::commands::auth,
};
use anyhow::Result;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: auth::Options,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth = args.auth;

    let token_config = TokenConfig::new(
        auth.access_secret,
        auth.refresh_secret,
        auth.verify_secret,
        auth.reset_secret,
    )
    .with_access_ttl_seconds(auth.access_ttl_seconds)
    .with_refresh_ttl_seconds(auth.refresh_ttl_seconds)
    .with_verify_ttl_seconds(auth.verify_ttl_seconds)
    .with_reset_ttl_seconds(auth.reset_ttl_seconds);

    let auth_config = AuthConfig::new(auth.frontend_base_url)
        .with_lockout_threshold(auth.lockout_threshold)
        .with_lockout_enabled(auth.lockout_enabled)
        .with_ledger_sweep_seconds(auth.ledger_sweep_seconds);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(auth.email_outbox.poll_seconds)
        .with_batch_size(auth.email_outbox.batch_size)
        .with_max_attempts(auth.email_outbox.max_attempts)
        .with_backoff_base_seconds(auth.email_outbox.backoff_base_seconds)
        .with_backoff_max_seconds(auth.email_outbox.backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, token_config, email_config).await
}
