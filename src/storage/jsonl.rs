use super::{Collection, Document, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Document store persisted as one append-only JSON-lines log per collection.
///
/// Each line is a [`Document`]. When a key appears more than once the last
/// line wins, and iteration follows the order keys were first written.
pub struct JsonlStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<JsonlCollection>>>,
    closed: Arc<AtomicBool>,
}

pub struct JsonlCollection {
    name: String,
    path: PathBuf,
    state: Mutex<CollectionState>,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct CollectionState {
    docs: Vec<Document>,
    index: HashMap<String, usize>,
}

impl CollectionState {
    fn upsert(&mut self, doc: Document) {
        match self.index.get(&doc.id) {
            Some(&pos) => self.docs[pos] = doc,
            None => {
                self.index.insert(doc.id.clone(), self.docs.len());
                self.docs.push(doc);
            }
        }
    }
}

impl JsonlStore {
    /// Open (creating if needed) the store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Opened JSONL document store");

        Ok(Self {
            root,
            collections: RwLock::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            let existing: Arc<dyn Collection> = existing.clone();
            return Ok(existing);
        }

        let path = self.root.join(format!("{}.jsonl", name));
        let state = load(&path).await?;
        debug!(collection = name, documents = state.docs.len(), "Loaded collection");

        let collection = Arc::new(JsonlCollection {
            name: name.to_string(),
            path,
            state: Mutex::new(state),
            closed: self.closed.clone(),
        });
        collections.insert(name.to_string(), collection.clone());

        let collection: Arc<dyn Collection> = collection;
        Ok(collection)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.collections.write().await.clear();
        Ok(())
    }
}

async fn load(path: &Path) -> Result<CollectionState, StoreError> {
    let mut state = CollectionState::default();

    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(state),
        Err(e) => return Err(e.into()),
    };

    // A tail without a newline is an interrupted append
    let complete = content.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1);
    let lines = std::str::from_utf8(&content[..complete])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    for (i, line) in lines.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
            reason: e.to_string(),
        })?;
        state.upsert(doc);
    }

    let tail = &content[complete..];
    if !tail.trim_ascii().is_empty() {
        match serde_json::from_slice::<Document>(tail) {
            Ok(doc) => {
                state.upsert(doc);
                let mut file = OpenOptions::new().append(true).open(path).await?;
                file.write_all(b"\n").await?;
                file.flush().await?;
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    dropped_bytes = tail.len(),
                    error = %e,
                    "Discarding incomplete trailing record"
                );
                let file = OpenOptions::new().write(true).open(path).await?;
                file.set_len(complete as u64).await?;
            }
        }
    }

    Ok(state)
}

impl JsonlCollection {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Collection for JsonlCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        Ok(self.state.lock().await.docs.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_open()?;
        let state = self.state.lock().await;
        Ok(state.index.get(key).map(|&pos| state.docs[pos].clone()))
    }

    async fn set(&self, key: &str, data: Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let doc = Document {
            id: key.to_string(),
            data,
        };
        let mut line = serde_json::to_string(&doc)?;
        line.push('\n');

        // Hold the lock across the append so the log and the index agree
        let mut state = self.state.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let len = file.metadata().await?.len();

        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(len).await {
                warn!(path = %self.path.display(), error = %rollback, "Failed to roll back partial write");
            }
            return Err(e.into());
        }

        state.upsert(doc);
        debug!(collection = %self.name, key, "Wrote document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("jsonl_store_{}", Uuid::new_v4()))
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn persists_across_reopen_with_last_write_winning() -> Result<(), anyhow::Error> {
        let root = temp_root();

        let store = JsonlStore::open(&root).await?;
        let col = store.collection("reviews").await?;
        col.set("r1", body(json!({"rating": 1}))).await?;
        col.set("r2", body(json!({"rating": 2}))).await?;
        col.set("r1", body(json!({"rating": 5}))).await?;
        store.close().await?;

        let reopened = JsonlStore::open(&root).await?;
        let col = reopened.collection("reviews").await?;
        let docs = col.stream().await?;
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
        assert_eq!(col.get("r1").await?.unwrap().data["rating"], json!(5));
        assert!(col.get("missing").await?.is_none());

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_line_fails_collection_load() -> Result<(), anyhow::Error> {
        let root = temp_root();
        fs::create_dir_all(&root).await?;
        fs::write(
            root.join("reviews.jsonl"),
            "{\"id\":\"r1\",\"data\":{}}\nnot json\n",
        )
        .await?;

        let store = JsonlStore::open(&root).await?;
        match store.collection("reviews").await {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("corrupt log loaded"),
        }

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn truncated_tail_is_dropped_on_load() -> Result<(), anyhow::Error> {
        let root = temp_root();
        fs::create_dir_all(&root).await?;
        let path = root.join("reviews.jsonl");
        fs::write(&path, "{\"id\":\"r1\",\"data\":{}}\n{\"id\":\"r2\",\"da").await?;

        let store = JsonlStore::open(&root).await?;
        let col = store.collection("reviews").await?;
        let ids: Vec<String> = col.stream().await?.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["r1"]);

        col.set("r3", body(json!({"rating": 3}))).await?;
        store.close().await?;

        let reopened = JsonlStore::open(&root).await?;
        let col = reopened.collection("reviews").await?;
        let ids: Vec<String> = col.stream().await?.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["r1", "r3"]);
        assert!(fs::read_to_string(&path).await?.ends_with('\n'));

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn complete_tail_without_newline_is_kept() -> Result<(), anyhow::Error> {
        let root = temp_root();
        fs::create_dir_all(&root).await?;
        fs::write(root.join("reviews.jsonl"), "{\"id\":\"r1\",\"data\":{}}").await?;

        let store = JsonlStore::open(&root).await?;
        let col = store.collection("reviews").await?;
        col.set("r2", Map::new()).await?;
        store.close().await?;

        let reopened = JsonlStore::open(&root).await?;
        let ids: Vec<String> = reopened
            .collection("reviews")
            .await?
            .stream()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["r1", "r2"]);

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn closed_store_rejects_writes() -> Result<(), anyhow::Error> {
        let root = temp_root();
        let store = JsonlStore::open(&root).await?;
        let col = store.collection("reviews").await?;
        store.close().await?;

        assert!(matches!(col.set("r1", Map::new()).await, Err(StoreError::Closed)));
        assert!(!root.join("reviews.jsonl").exists());

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }
}
