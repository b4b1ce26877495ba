//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/fleet-manager.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A stored value could not be turned back into a domain type.
    #[error("invalid {column} in stored row: {message}")]
    Decode {
        column: &'static str,
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn decode(column: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            column,
            message: message.to_string(),
        }
    }
}
