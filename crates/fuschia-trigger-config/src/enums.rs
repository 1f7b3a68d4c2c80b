use serde::{Deserialize, Serialize};

/// How the raw payload of a Pub/Sub message is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeFormat {
  /// UTF-8 text.
  #[default]
  #[serde(rename = "string", alias = "plain_text")]
  PlainText,
  /// JSON document.
  #[serde(rename = "json", alias = "structured")]
  Structured,
  /// Bytes passed through untouched.
  #[serde(rename = "raw")]
  Raw,
}

/// What a polling query hands to the execution it creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
  /// Only the row count.
  #[default]
  None,
  /// Rows are written to the result store and referenced by URI.
  Store,
  /// All rows inline.
  #[serde(rename = "fetch", alias = "fetch_all")]
  FetchAll,
  /// First row inline.
  FetchOne,
}
