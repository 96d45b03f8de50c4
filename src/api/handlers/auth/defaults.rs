//! Default record provisioning for new accounts.
//!
//! Registration only ever creates satellite rows through this narrow seam,
//! so tests can swap in a no-op and the signup transaction stays the single
//! place that knows what a fresh account looks like.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::storage::insert_default_records;

#[async_trait]
pub trait ProvisionDefaults: Send + Sync {
    /// Create the default satellite rows for a freshly inserted account,
    /// inside the signup transaction.
    async fn provision(&self, tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<()>;
}

/// Production provisioner: profile, settings, and achievements rows.
#[derive(Clone, Debug)]
pub struct PgDefaults;

#[async_trait]
impl ProvisionDefaults for PgDefaults {
    async fn provision(&self, tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<()> {
        insert_default_records(tx, user_id).await
    }
}

#[derive(Clone, Debug)]
pub struct NoopDefaults;

#[async_trait]
impl ProvisionDefaults for NoopDefaults {
    async fn provision(&self, _tx: &mut Transaction<'_, Postgres>, _user_id: Uuid) -> Result<()> {
        Ok(())
    }
}
