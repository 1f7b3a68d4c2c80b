//! Fuschia Query
//!
//! Query execution for polling triggers. The trigger runtime depends only on
//! the [`QueryRunner`] trait; [`SqliteQueryRunner`] is the bundled
//! implementation.
//!
//! When a query runs in [`FetchMode::Store`], rows are not returned inline but
//! written to a [`ResultStore`] and referenced by URI.

mod error;
mod results;
mod sqlite;

pub use error::QueryError;
pub use fuschia_trigger_config::FetchMode;
pub use results::{FsResultStore, ResultStore};
pub use sqlite::SqliteQueryRunner;

use async_trait::async_trait;

/// A query to run once.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
  pub sql: String,
  /// Use the legacy SQL dialect, for backends that have one.
  pub legacy_sql: bool,
  pub fetch_mode: FetchMode,
}

/// Row data returned by a query, shaped by the fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
  /// [`FetchMode::None`]: only the count is reported.
  None,
  /// [`FetchMode::Store`]: rows were written to a result store.
  Stored { uri: String },
  /// [`FetchMode::FetchAll`]: every row, each a JSON object keyed by column.
  Rows(Vec<serde_json::Value>),
  /// [`FetchMode::FetchOne`]: the first row, if any.
  Row(Option<serde_json::Value>),
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
  /// Number of rows the query returned.
  pub size: u64,
  pub data: QueryData,
}

/// Runs queries against an external store.
#[async_trait]
pub trait QueryRunner: Send + Sync {
  async fn run(&self, request: &QueryRequest) -> Result<QueryOutput, QueryError>;
}
