//! Transactional email outbox.
//!
//! Auth flows never talk to a mail provider directly: they insert a row in
//! `email_outbox` inside whatever transaction they are already running, so
//! "account exists but its verification mail was lost" cannot happen. A
//! background task polls the table, claims a batch with
//! `FOR UPDATE SKIP LOCKED` (safe with multiple replicas), and hands each
//! row to an [`EmailSender`]. Failures are retried with exponential backoff
//! plus jitter until `max_attempts`, then parked as `failed`.
//!
//! Templates in use: `verify_email`, `password_reset`, `account_locked`.
//! The default [`LogEmailSender`] logs instead of delivering, which is all
//! local development needs.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery abstraction; implementations decide the transport.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender: logs the message and reports success.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Defaults: 5s poll, 10 rows per batch, 5 attempts, 5s..5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp degenerate values so a misconfigured worker polls instead of
    /// spinning or never retrying.
    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_base = self.backoff_base.max(Duration::from_secs(1));
        Self {
            poll_interval: self.poll_interval.max(Duration::from_secs(1)),
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        loop {
            if let Err(err) = drain_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err:#}");
            }
            sleep(config.poll_interval()).await;
        }
    })
}

struct PendingRow {
    id: Uuid,
    attempts: u32,
    message: EmailMessage,
}

async fn drain_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let rows = claim_pending(&mut tx, config.batch_size()).await?;
    let count = rows.len();

    for row in rows {
        match sender.send(&row.message) {
            Ok(()) => mark_sent(&mut tx, &row).await?,
            Err(err) => mark_retry(&mut tx, &row, &err, config).await?,
        }
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;
    Ok(count)
}

/// Lock a batch of due rows. `SKIP LOCKED` lets concurrent workers pick
/// disjoint batches without double-sending.
async fn claim_pending(
    tx: &mut Transaction<'_, Postgres>,
    batch_size: usize,
) -> Result<Vec<PendingRow>> {
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(batch_size).unwrap_or(1))
        .fetch_all(&mut **tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    Ok(rows
        .into_iter()
        .map(|row| PendingRow {
            id: row.get("id"),
            attempts: u32::try_from(row.get::<i32, _>("attempts")).unwrap_or(0),
            message: EmailMessage {
                to_email: row.get("to_email"),
                template: row.get("template"),
                payload_json: row.get("payload_json"),
            },
        })
        .collect())
}

async fn mark_sent(tx: &mut Transaction<'_, Postgres>, row: &PendingRow) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sent',
            attempts = $2,
            last_error = NULL,
            sent_at = NOW(),
            next_attempt_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(row.id)
        .bind(attempts_column(row.attempts))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox status to sent")?;
    Ok(())
}

async fn mark_retry(
    tx: &mut Transaction<'_, Postgres>,
    row: &PendingRow,
    err: &anyhow::Error,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let attempt = row.attempts.saturating_add(1);

    if attempt >= config.max_attempts() {
        let query = r"
            UPDATE email_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3,
                next_attempt_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(row.id)
            .bind(attempts_column(row.attempts))
            .bind(err.to_string())
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to update outbox status to failed")?;
        return Ok(());
    }

    let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE email_outbox
        SET status = 'pending',
            attempts = $2,
            last_error = $3,
            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(row.id)
        .bind(attempts_column(row.attempts))
        .bind(err.to_string())
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox retry schedule")?;
    Ok(())
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts.saturating_add(1)).unwrap_or(i32::MAX)
}

/// Exponential backoff with jitter: full delay doubles per attempt up to
/// `max`, then the scheduled wait is drawn from [delay/2, delay].
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let doublings = attempt.saturating_sub(1).min(31);
    let full = base
        .checked_mul(1u32 << doublings)
        .map_or(max, |delay| delay.min(max));
    let full_ms = u64::try_from(full.as_millis()).unwrap_or(u64::MAX);
    if full_ms < 2 {
        return full;
    }
    let half = full_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
