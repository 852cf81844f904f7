//! Result store abstraction and the local CSV implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::ResultsConfig;
use crate::error::{Result, StoreError};
use crate::reader::read_rows;
use crate::types::ResultLogRow;
use crate::writer::{append_rows, clear_results};

/// Where benchmark results are persisted and read back from.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Appends rows in order; returns how many were written.
    async fn append_rows(&self, rows: &[ResultLogRow]) -> Result<usize>;

    /// Every row in the log, in file order.
    async fn read_all_rows(&self) -> Result<Vec<ResultLogRow>>;

    /// Removes every stored row.
    async fn clear(&self) -> Result<()>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// A results file on the local filesystem.
///
/// Appends are serialized through an async mutex and run on the blocking pool.
#[derive(Debug, Clone)]
pub struct CsvResultStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CsvResultStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &ResultsConfig) -> Self {
        Self::new(config.path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(path))
            .await
            .map_err(|e| StoreError::task(e.to_string()))?
    }
}

#[async_trait]
impl ResultStore for CsvResultStore {
    #[instrument(skip(self, rows), fields(path = %self.path.display(), rows = rows.len()))]
    async fn append_rows(&self, rows: &[ResultLogRow]) -> Result<usize> {
        let rows = rows.to_vec();
        self.blocking(move |path| append_rows(&path, &rows)).await
    }

    async fn read_all_rows(&self) -> Result<Vec<ResultLogRow>> {
        self.blocking(|path| read_rows(&path)).await
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(|path| clear_results(&path).map(|_| ())).await
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
