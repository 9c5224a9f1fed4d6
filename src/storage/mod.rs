pub mod credentials;
pub mod jsonl;
pub mod memory;

pub use credentials::Credentials;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// A stored document: its key plus the decoded body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt record at {path}:{line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("unsupported database URL: {0}")]
    UnsupportedUrl(String),

    #[error("store client is closed")]
    Closed,
}

/// Client for a document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Acquire a handle to the named collection
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError>;

    /// Release the client. Later operations fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// A named group of documents addressed by key
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// All documents, in the backend's iteration order
    async fn stream(&self) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document, replacing any existing one under `key`
    async fn set(&self, key: &str, data: Map<String, Value>) -> Result<(), StoreError>;
}

/// Open the store named by `database_url` for the given database id.
///
/// `memory://` selects the process-local store; `file:///dir` or a bare
/// path selects the JSON-lines store rooted at that directory.
pub async fn connect(
    database_url: &str,
    database_id: &str,
) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match Url::parse(database_url) {
        Ok(url) if url.scheme() == "memory" => Ok(Arc::new(MemoryStore::new())),
        Ok(url) if url.scheme() == "file" => {
            let root = url
                .to_file_path()
                .map_err(|_| StoreError::UnsupportedUrl(database_url.to_string()))?;
            Ok(Arc::new(JsonlStore::open(root.join(database_id)).await?))
        }
        Ok(url) => Err(StoreError::UnsupportedUrl(format!(
            "scheme '{}' in {}",
            url.scheme(),
            database_url
        ))),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let root = PathBuf::from(database_url);
            Ok(Arc::new(JsonlStore::open(root.join(database_id)).await?))
        }
        Err(e) => Err(StoreError::UnsupportedUrl(format!("{}: {}", database_url, e))),
    }
}
