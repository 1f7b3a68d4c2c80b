use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::QueryError;

/// Storage for query results fetched in store mode.
#[async_trait]
pub trait ResultStore: Send + Sync {
  /// Store rows under `key` and return a URI referencing them.
  async fn put(&self, key: &str, rows: &[serde_json::Value]) -> Result<String, QueryError>;

  /// Read back rows stored under `key`.
  async fn get(&self, key: &str) -> Result<Vec<serde_json::Value>, QueryError>;
}

/// Filesystem-based result store.
///
/// Each result set is written to `{base_path}/{key}` as JSON lines, one row
/// per line. Parent directories are created automatically.
pub struct FsResultStore {
  base_path: PathBuf,
}

impl FsResultStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn key_to_path(&self, key: &str) -> PathBuf {
    self.base_path.join(key)
  }
}

#[async_trait]
impl ResultStore for FsResultStore {
  async fn put(&self, key: &str, rows: &[serde_json::Value]) -> Result<String, QueryError> {
    let path = self.key_to_path(key);

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(&path).await?;
    for row in rows {
      let mut line = serde_json::to_vec(row)?;
      line.push(b'\n');
      file.write_all(&line).await?;
    }
    file.flush().await?;

    Ok(format!("file://{}", path.display()))
  }

  async fn get(&self, key: &str) -> Result<Vec<serde_json::Value>, QueryError> {
    let path = self.key_to_path(key);
    let content = fs::read_to_string(&path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        QueryError::NotFound(key.to_string())
      } else {
        QueryError::Io(e)
      }
    })?;

    content
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| serde_json::from_str(line).map_err(QueryError::from))
      .collect()
  }
}
