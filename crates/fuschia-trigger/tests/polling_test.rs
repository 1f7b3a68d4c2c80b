//! Integration tests for PollingTrigger.

use std::sync::Arc;

use async_trait::async_trait;
use fuschia_query::{
  FetchMode, FsResultStore, QueryData, QueryError, QueryOutput, QueryRequest, QueryRunner,
  SqliteQueryRunner,
};
use fuschia_trigger::{PollingTrigger, TriggerError, TriggerEvent};
use fuschia_trigger_config::PollingTriggerDef;
use parking_lot::Mutex;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

/// Runner returning `rows` rows for every request, honouring the fetch mode.
struct MockRunner {
  rows: u64,
  requests: Mutex<Vec<QueryRequest>>,
}

impl MockRunner {
  fn new(rows: u64) -> Self {
    Self {
      rows,
      requests: Mutex::new(Vec::new()),
    }
  }
}

#[async_trait]
impl QueryRunner for MockRunner {
  async fn run(&self, request: &QueryRequest) -> Result<QueryOutput, QueryError> {
    self.requests.lock().push(request.clone());

    let rows: Vec<_> = (0..self.rows).map(|id| json!({"id": id})).collect();
    let data = match request.fetch_mode {
      FetchMode::None => QueryData::None,
      FetchMode::FetchAll => QueryData::Rows(rows),
      FetchMode::FetchOne => QueryData::Row(rows.into_iter().next()),
      FetchMode::Store => QueryData::Stored {
        uri: "file:///results/mock.jsonl".to_string(),
      },
    };

    Ok(QueryOutput {
      size: self.rows,
      data,
    })
  }
}

struct FailingRunner;

#[async_trait]
impl QueryRunner for FailingRunner {
  async fn run(&self, _request: &QueryRequest) -> Result<QueryOutput, QueryError> {
    Err(QueryError::NotFound("table 'orders'".to_string()))
  }
}

fn def() -> PollingTriggerDef {
  PollingTriggerDef::new("new-orders", "SELECT * FROM orders")
}

#[tokio::test]
async fn test_no_rows_emits_nothing() {
  let runner = Arc::new(MockRunner::new(0));
  let trigger = PollingTrigger::new(def(), runner.clone());

  let result = trigger.evaluate().await.unwrap();

  assert!(result.is_none());
  assert_eq!(runner.requests.lock().len(), 1);
}

#[tokio::test]
async fn test_rows_fetched_with_fetch_type() {
  let runner = Arc::new(MockRunner::new(10));
  let mut def = def();
  def.fetch_type = Some(FetchMode::FetchAll);
  let trigger = PollingTrigger::new(def, runner);

  let result = trigger.evaluate().await.unwrap().expect("expected a result");

  assert_eq!(result.size, 10);
  assert_eq!(result.fetch_mode, FetchMode::FetchAll);
  match &result.data {
    QueryData::Rows(rows) => assert_eq!(rows.len(), 10),
    other => panic!("expected rows, got {:?}", other),
  }

  let event = TriggerEvent::from_poll(trigger.trigger_id(), &result);
  assert_eq!(event.trigger_id, "new-orders");
  assert_eq!(event.payload["size"], 10);
  assert_eq!(event.payload["rows"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_legacy_flags_reach_runner() {
  let runner = Arc::new(MockRunner::new(3));
  let mut def = def();
  def.store = true;
  def.fetch_one = true;
  def.legacy_sql = true;
  let trigger = PollingTrigger::new(def, runner.clone());

  let result = trigger.evaluate().await.unwrap().unwrap();

  assert_eq!(result.fetch_mode, FetchMode::FetchOne);
  assert_eq!(result.data, QueryData::Row(Some(json!({"id": 0}))));

  let requests = runner.requests.lock();
  assert_eq!(requests[0].fetch_mode, FetchMode::FetchOne);
  assert!(requests[0].legacy_sql);
}

#[tokio::test]
async fn test_query_failure_is_poll_error() {
  let trigger = PollingTrigger::new(def(), Arc::new(FailingRunner));

  let err = trigger.evaluate().await.unwrap_err();

  assert!(matches!(
    err,
    TriggerError::Poll {
      ref trigger_id,
      source: QueryError::NotFound(_),
    } if trigger_id == "new-orders"
  ));
}

#[tokio::test]
async fn test_sqlite_end_to_end() {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT)")
    .execute(&pool)
    .await
    .unwrap();

  let temp_dir = tempfile::tempdir().unwrap();
  let runner = SqliteQueryRunner::new(pool.clone())
    .with_result_store(Arc::new(FsResultStore::new(temp_dir.path())));

  let mut def = PollingTriggerDef::new("pending", "SELECT id FROM orders WHERE status = 'pending'");
  def.fetch_type = Some(FetchMode::Store);
  let trigger = PollingTrigger::new(def, Arc::new(runner));

  for _ in 0..3 {
    assert!(trigger.evaluate().await.unwrap().is_none());
  }
  assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

  sqlx::query("INSERT INTO orders (id, status) VALUES (1, 'pending'), (2, 'shipped'), (3, 'pending')")
    .execute(&pool)
    .await
    .unwrap();

  let result = trigger.evaluate().await.unwrap().unwrap();
  assert_eq!(result.size, 2);

  let QueryData::Stored { uri } = &result.data else {
    panic!("expected stored rows, got {:?}", result.data);
  };
  let path = uri.strip_prefix("file://").unwrap();
  let contents = std::fs::read_to_string(path).unwrap();
  assert_eq!(contents.lines().count(), 2);
  assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}
