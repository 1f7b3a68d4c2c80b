/// Errors that can occur while running a query or storing its results.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
  /// The database rejected or failed the query.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to serialize rows: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The backend does not support a requested option.
  #[error("unsupported: {0}")]
  Unsupported(String),

  #[error("result not found: {0}")]
  NotFound(String),
}
