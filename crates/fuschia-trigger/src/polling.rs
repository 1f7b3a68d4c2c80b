use std::sync::Arc;

use fuschia_query::{FetchMode, QueryData, QueryRequest, QueryRunner};
use fuschia_trigger_config::PollingTriggerDef;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::error::TriggerError;

#[derive(Debug, Clone, Copy)]
enum LegacyFlag {
  FetchOne,
  Fetch,
  Store,
}

impl LegacyFlag {
  fn is_set(self, def: &PollingTriggerDef) -> bool {
    match self {
      LegacyFlag::FetchOne => def.fetch_one,
      LegacyFlag::Fetch => def.fetch,
      LegacyFlag::Store => def.store,
    }
  }
}

/// Legacy switches in precedence order. The first one set wins.
const LEGACY_PRECEDENCE: [(LegacyFlag, FetchMode); 3] = [
  (LegacyFlag::FetchOne, FetchMode::FetchOne),
  (LegacyFlag::Fetch, FetchMode::FetchAll),
  (LegacyFlag::Store, FetchMode::Store),
];

/// Effective fetch mode of a polling definition.
///
/// An explicit `fetch_type` wins over the legacy switches.
pub fn resolve_fetch_mode(def: &PollingTriggerDef) -> FetchMode {
  if let Some(mode) = def.fetch_type {
    return mode;
  }

  LEGACY_PRECEDENCE
    .iter()
    .find(|(flag, _)| flag.is_set(def))
    .map(|(_, mode)| *mode)
    .unwrap_or(FetchMode::None)
}

/// Outcome of a poll that found rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
  pub size: u64,
  pub fetch_mode: FetchMode,
  pub data: QueryData,
}

impl PollResult {
  /// Payload handed to the execution: `size`, plus `rows`, `row` or `uri`
  /// depending on the fetch mode.
  pub fn to_payload(&self) -> Value {
    let mut payload = Map::new();
    payload.insert("size".to_string(), json!(self.size));

    match &self.data {
      QueryData::None => {}
      QueryData::Stored { uri } => {
        payload.insert("uri".to_string(), json!(uri));
      }
      QueryData::Rows(rows) => {
        payload.insert("rows".to_string(), Value::Array(rows.clone()));
      }
      QueryData::Row(row) => {
        payload.insert("row".to_string(), row.clone().unwrap_or(Value::Null));
      }
    }

    Value::Object(payload)
  }
}

/// Evaluates a query-based trigger once per tick. Scheduling is up to the
/// caller, see [`PollingTriggerDef::interval`].
pub struct PollingTrigger {
  def: PollingTriggerDef,
  runner: Arc<dyn QueryRunner>,
}

impl PollingTrigger {
  pub fn new(def: PollingTriggerDef, runner: Arc<dyn QueryRunner>) -> Self {
    Self { def, runner }
  }

  pub fn trigger_id(&self) -> &str {
    &self.def.trigger_id
  }

  pub fn definition(&self) -> &PollingTriggerDef {
    &self.def
  }

  /// Run the query once. Returns `None` when it found no rows.
  #[instrument(
    name = "polling_trigger_evaluate",
    skip(self),
    fields(trigger_id = %self.def.trigger_id)
  )]
  pub async fn evaluate(&self) -> Result<Option<PollResult>, TriggerError> {
    let fetch_mode = resolve_fetch_mode(&self.def);
    let request = QueryRequest {
      sql: self.def.sql.clone(),
      legacy_sql: self.def.legacy_sql,
      fetch_mode,
    };

    let output = self
      .runner
      .run(&request)
      .await
      .map_err(|source| TriggerError::Poll {
        trigger_id: self.def.trigger_id.clone(),
        source,
      })?;

    debug!(size = output.size, ?fetch_mode, "found rows");

    if output.size == 0 {
      return Ok(None);
    }

    Ok(Some(PollResult {
      size: output.size,
      fetch_mode,
      data: output.data,
    }))
  }
}
