use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::QueryError;
use crate::results::ResultStore;
use crate::{FetchMode, QueryData, QueryOutput, QueryRequest, QueryRunner};

/// SQLite-based query runner.
///
/// Rows are converted to JSON objects keyed by column name. SQLite has no
/// legacy dialect, so requests with `legacy_sql` set are rejected.
pub struct SqliteQueryRunner {
  pool: SqlitePool,
  results: Option<Arc<dyn ResultStore>>,
}

impl SqliteQueryRunner {
  /// Create a runner with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self {
      pool,
      results: None,
    }
  }

  /// Set the store used for [`FetchMode::Store`] queries.
  pub fn with_result_store(mut self, results: Arc<dyn ResultStore>) -> Self {
    self.results = Some(results);
    self
  }

  async fn store_rows(&self, rows: &[serde_json::Value]) -> Result<String, QueryError> {
    let results = self
      .results
      .as_ref()
      .ok_or_else(|| QueryError::Unsupported("store fetch mode without a result store".into()))?;

    let key = format!("{}.jsonl", uuid::Uuid::new_v4());
    results.put(&key, rows).await
  }
}

#[async_trait]
impl QueryRunner for SqliteQueryRunner {
  async fn run(&self, request: &QueryRequest) -> Result<QueryOutput, QueryError> {
    if request.legacy_sql {
      return Err(QueryError::Unsupported(
        "legacy SQL dialect is not available for SQLite".into(),
      ));
    }

    let rows = sqlx::query(&request.sql).fetch_all(&self.pool).await?;
    let size = rows.len() as u64;
    debug!(size, fetch_mode = ?request.fetch_mode, "query completed");

    let data = match request.fetch_mode {
      FetchMode::None => QueryData::None,
      FetchMode::FetchOne => QueryData::Row(rows.first().map(row_to_json).transpose()?),
      FetchMode::FetchAll => QueryData::Rows(rows.iter().map(row_to_json).collect::<Result<_, _>>()?),
      // Nothing to store; no empty result files.
      FetchMode::Store if rows.is_empty() => QueryData::None,
      FetchMode::Store => {
        let rows = rows
          .iter()
          .map(row_to_json)
          .collect::<Result<Vec<_>, _>>()?;
        QueryData::Stored {
          uri: self.store_rows(&rows).await?,
        }
      }
    };

    Ok(QueryOutput { size, data })
  }
}

/// Convert a row into a JSON object using each value's storage class.
fn row_to_json(row: &SqliteRow) -> Result<serde_json::Value, QueryError> {
  let mut object = serde_json::Map::with_capacity(row.columns().len());

  for column in row.columns() {
    let index = column.ordinal();
    let raw = row.try_get_raw(index)?;

    let value = if raw.is_null() {
      serde_json::Value::Null
    } else {
      let storage = raw.type_info().name().to_string();
      match storage.as_str() {
        "INTEGER" | "BOOLEAN" => serde_json::Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => serde_json::Value::from(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => serde_json::Value::from(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => serde_json::Value::from(row.try_get_unchecked::<String, _>(index)?),
      }
    };

    object.insert(column.name().to_string(), value);
  }

  Ok(serde_json::Value::Object(object))
}
