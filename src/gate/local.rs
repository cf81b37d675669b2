use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{validate_order, GateError, SessionGate};
use crate::feed::FeedRecord;
use crate::storage::Database;

/// Session gate over the local SQLite store.
///
/// Plays the server's part: checks the secret on every call, then reads or
/// writes `storage::Database`. Records are stored as given.
pub struct LocalGate {
    db: Database,
    secret: SecretString,
}

impl LocalGate {
    pub fn new(db: Database, secret: SecretString) -> Self {
        Self { db, secret }
    }

    fn authorize(&self, secret: &SecretString) -> Result<(), GateError> {
        let expected = self.secret.expose_secret().as_bytes();
        let given = secret.expose_secret().as_bytes();

        // Constant time over the compared bytes.
        let same_len = expected.len() == given.len();
        let diff = expected
            .iter()
            .zip(given.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if same_len && diff == 0 && !expected.is_empty() {
            Ok(())
        } else {
            tracing::warn!("Rejected gate call with a bad admin secret");
            Err(GateError::Unauthorized)
        }
    }
}

#[async_trait]
impl SessionGate for LocalGate {
    async fn list(&self, secret: &SecretString) -> Result<Vec<FeedRecord>, GateError> {
        self.authorize(secret)?;
        self.db.list_feeds().await.map_err(GateError::storage)
    }

    async fn upsert(&self, record: &FeedRecord, secret: &SecretString) -> Result<(), GateError> {
        self.authorize(secret)?;
        if record.id.trim().is_empty() || record.url.trim().is_empty() {
            return Err(GateError::Validation("id and url are required".into()));
        }
        self.db.upsert_feed(record).await.map_err(GateError::storage)
    }

    async fn remove(&self, id: &str, secret: &SecretString) -> Result<(), GateError> {
        self.authorize(secret)?;
        let removed = self.db.remove_feed(id).await.map_err(GateError::storage)?;
        if !removed {
            tracing::debug!(id, "Remove requested for unknown feed");
        }
        Ok(())
    }

    async fn reorder(&self, ids: &[String], secret: &SecretString) -> Result<(), GateError> {
        self.authorize(secret)?;
        validate_order(ids)?;
        self.db.reorder_feeds(ids).await.map_err(GateError::storage)
    }
}
