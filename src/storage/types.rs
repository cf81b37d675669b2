use thiserror::Error;

use crate::feed::FeedRecord;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The feed database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) surface as
/// these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Row Types
// ============================================================================

/// Row shape of the `feeds` table as read by `list_feeds`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: String,
    pub url: String,
    pub category: Option<String>,
    pub custom_title: Option<String>,
    pub is_sub: bool,
}

impl FeedDbRow {
    pub(crate) fn into_record(self) -> FeedRecord {
        FeedRecord {
            id: self.id,
            url: self.url,
            category: self.category,
            custom_title: self.custom_title,
            is_sub: self.is_sub,
        }
    }
}
