use super::{Collection, Document, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Process-local document store. Collections keep first-insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    closed: Arc<AtomicBool>,
}

pub struct MemoryCollection {
    name: String,
    docs: RwLock<Vec<Document>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        let mut collections = self.collections.write().await;
        let collection: Arc<dyn Collection> = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    docs: RwLock::new(Vec::new()),
                    closed: self.closed.clone(),
                })
            })
            .clone();

        Ok(collection)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl MemoryCollection {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<Vec<Document>, StoreError> {
        self.ensure_open()?;
        Ok(self.docs.read().await.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_open()?;
        Ok(self.docs.read().await.iter().find(|d| d.id == key).cloned())
    }

    async fn set(&self, key: &str, data: Map<String, Value>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut docs = self.docs.write().await;
        match docs.iter_mut().find(|d| d.id == key) {
            Some(existing) => existing.data = data,
            None => docs.push(Document {
                id: key.to_string(),
                data,
            }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn set_get_and_stream_in_insertion_order() {
        let store = MemoryStore::new();
        let col = store.collection("reviews").await.unwrap();

        assert!(col.get("b").await.unwrap().is_none());
        col.set("b", body(json!({"n": 1}))).await.unwrap();
        col.set("a", body(json!({"n": 2}))).await.unwrap();
        col.set("b", body(json!({"n": 3}))).await.unwrap();

        let ids: Vec<String> = col.stream().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(col.get("b").await.unwrap().unwrap().data["n"], json!(3));
    }

    #[tokio::test]
    async fn handles_share_one_collection() {
        let store = MemoryStore::new();
        let first = store.collection("reviews").await.unwrap();
        let second = store.collection("reviews").await.unwrap();

        first.set("r1", body(json!({}))).await.unwrap();
        assert!(second.get("r1").await.unwrap().is_some());
        assert!(store.collection("other").await.unwrap().stream().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        let col = store.collection("reviews").await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(col.stream().await, Err(StoreError::Closed)));
        assert!(matches!(col.get("r1").await, Err(StoreError::Closed)));
        assert!(matches!(store.collection("reviews").await, Err(StoreError::Closed)));
    }
}
