use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

/// Parsed auth configuration arguments.
pub struct Options {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub verify_secret: SecretString,
    pub reset_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub verify_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub lockout_threshold: i32,
    pub lockout_enabled: bool,
    pub frontend_base_url: String,
    pub ledger_sweep_seconds: u64,
    pub email_outbox: OutboxOptions,
}

pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |name: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(name)
                .cloned()
                .map(SecretString::from)
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            access_secret: secret("access-secret")?,
            refresh_secret: secret("refresh-secret")?,
            verify_secret: secret("verify-secret")?,
            reset_secret: secret("reset-secret")?,
            access_ttl_seconds: matches
                .get_one::<i64>("access-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>("refresh-ttl-seconds")
                .copied()
                .unwrap_or(604_800),
            verify_ttl_seconds: matches
                .get_one::<i64>("verify-ttl-seconds")
                .copied()
                .unwrap_or(86_400),
            reset_ttl_seconds: matches
                .get_one::<i64>("reset-ttl-seconds")
                .copied()
                .unwrap_or(3600),
            lockout_threshold: matches
                .get_one::<i32>("lockout-threshold")
                .copied()
                .unwrap_or(5),
            lockout_enabled: matches
                .get_one::<bool>("lockout-enabled")
                .copied()
                .unwrap_or(true),
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .unwrap_or_else(|| "https://konto.dev".to_string()),
            ledger_sweep_seconds: matches
                .get_one::<u64>("ledger-sweep-seconds")
                .copied()
                .unwrap_or(300),
            email_outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_ttl_args(command);
    let command = with_lockout_args(command);
    with_outbox_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-secret")
                .long("access-secret")
                .help("Signing secret for access tokens")
                .env("KONTO_ACCESS_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("refresh-secret")
                .long("refresh-secret")
                .help("Signing secret for refresh tokens")
                .env("KONTO_REFRESH_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("verify-secret")
                .long("verify-secret")
                .help("Signing secret for email-verification tokens")
                .env("KONTO_VERIFY_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("reset-secret")
                .long("reset-secret")
                .help("Signing secret for password-reset tokens")
                .env("KONTO_RESET_SECRET")
                .required(true),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("KONTO_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("KONTO_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verify-ttl-seconds")
                .long("verify-ttl-seconds")
                .help("Email-verification token TTL in seconds")
                .env("KONTO_VERIFY_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-ttl-seconds")
                .long("reset-ttl-seconds")
                .help("Password-reset token TTL in seconds")
                .env("KONTO_RESET_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("lockout-threshold")
                .long("lockout-threshold")
                .help("Consecutive failed logins before an account is locked")
                .env("KONTO_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("lockout-enabled")
                .long("lockout-enabled")
                .help("Enable account lockout after repeated failed logins")
                .env("KONTO_LOCKOUT_ENABLED")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for verification and reset links")
                .env("KONTO_FRONTEND_BASE_URL")
                .default_value("https://konto.dev"),
        )
        .arg(
            Arg::new("ledger-sweep-seconds")
                .long("ledger-sweep-seconds")
                .help("Interval for sweeping expired token-ledger rows")
                .env("KONTO_LEDGER_SWEEP_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("KONTO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("KONTO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("KONTO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::Options;
    use secrecy::ExposeSecret;

    #[test]
    fn parse_defaults_and_secrets() {
        temp_env::with_vars(
            [
                ("KONTO_ACCESS_SECRET", None::<&str>),
                ("KONTO_REFRESH_SECRET", None),
                ("KONTO_VERIFY_SECRET", None),
                ("KONTO_RESET_SECRET", None),
                ("KONTO_LOCKOUT_THRESHOLD", None),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "konto",
                    "--dsn",
                    "postgres://localhost/konto",
                    "--access-secret",
                    "a",
                    "--refresh-secret",
                    "r",
                    "--verify-secret",
                    "v",
                    "--reset-secret",
                    "s",
                ]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.access_secret.expose_secret(), "a");
                assert_eq!(options.access_ttl_seconds, 900);
                assert_eq!(options.refresh_ttl_seconds, 604_800);
                assert_eq!(options.verify_ttl_seconds, 86_400);
                assert_eq!(options.reset_ttl_seconds, 3600);
                assert_eq!(options.lockout_threshold, 5);
                assert!(options.lockout_enabled);
                assert_eq!(options.email_outbox.batch_size, 10);
            },
        );
    }

    #[test]
    fn parse_missing_secret_fails() {
        temp_env::with_vars([("KONTO_RESET_SECRET", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let result = command.try_get_matches_from(vec![
                "konto",
                "--dsn",
                "postgres://localhost/konto",
                "--access-secret",
                "a",
                "--refresh-secret",
                "r",
                "--verify-secret",
                "v",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn parse_lockout_toggle() {
        let command = crate::cli::commands::new();
        let matches = command.get_matches_from(vec![
            "konto",
            "--dsn",
            "postgres://localhost/konto",
            "--access-secret",
            "a",
            "--refresh-secret",
            "r",
            "--verify-secret",
            "v",
            "--reset-secret",
            "s",
            "--lockout-enabled",
            "false",
            "--lockout-threshold",
            "3",
        ]);
        let options = Options::parse(&matches).expect("options");
        assert!(!options.lockout_enabled);
        assert_eq!(options.lockout_threshold, 3);
    }
}
