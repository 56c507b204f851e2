use crate::history::collection::{ScanCollection, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{distr::Alphanumeric, Rng};
use scan_api::{CreatedDocument, NewScanDocument, ScanDocument};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct MemoryCollection {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    documents: Mutex<Vec<ScanDocument>>,
    updates: broadcast::Sender<Vec<ScanDocument>>,
    fetch_calls: AtomicUsize,
}

impl MemoryCollection {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(MemoryInner {
                documents: Mutex::new(Vec::new()),
                updates,
                fetch_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanCollection for MemoryCollection {
    async fn insert(&self, new: NewScanDocument) -> Result<CreatedDocument, StoreError> {
        let document = ScanDocument {
            id: new_document_id(),
            disease: new.disease,
            image_uri: new.image_uri,
            timestamp: Utc::now(),
        };
        let id = document.id.clone();

        let snapshot = {
            let mut documents = self.inner.documents.lock();
            documents.push(document);
            documents.clone()
        };
        let _ = self.inner.updates.send(snapshot);

        Ok(CreatedDocument { id })
    }

    async fn fetch_all(&self) -> Result<Vec<ScanDocument>, StoreError> {
        self.inner.fetch_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.documents.lock().clone())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut documents = self.inner.documents.lock();
            let before = documents.len();
            documents.retain(|document| document.id != id);
            if documents.len() == before {
                return Ok(());
            }
            documents.clone()
        };
        let _ = self.inner.updates.send(snapshot);

        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<Vec<ScanDocument>> {
        self.inner.updates.subscribe()
    }
}

// 20 alphanumeric characters, the shape the remote store assigns.
fn new_document_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_look_like_store_ids() {
        let id = new_document_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamp() {
        let collection = MemoryCollection::new();
        let created = collection
            .insert(NewScanDocument {
                disease: "Acne".to_string(),
                image_uri: "file:///scans/a.jpg".to_string(),
            })
            .await
            .unwrap();

        let documents = collection.fetch_all().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, created.id);
        assert_eq!(documents[0].disease, "Acne");
    }

    #[tokio::test]
    async fn every_change_publishes_the_whole_collection() {
        let collection = MemoryCollection::new();
        let mut watcher = collection.watch();

        let first = collection
            .insert(NewScanDocument {
                disease: "Acne".to_string(),
                image_uri: "file:///a.jpg".to_string(),
            })
            .await
            .unwrap();
        collection
            .insert(NewScanDocument {
                disease: "Eczema".to_string(),
                image_uri: "file:///b.jpg".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(watcher.recv().await.unwrap().len(), 1);
        assert_eq!(watcher.recv().await.unwrap().len(), 2);

        collection.remove(&first.id).await.unwrap();
        let snapshot = watcher.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].disease, "Eczema");
    }

    #[tokio::test]
    async fn removing_a_missing_id_is_not_an_error() {
        let collection = MemoryCollection::new();
        let mut watcher = collection.watch();

        collection.remove("never-existed").await.unwrap();

        // Nothing changed, so nothing was published.
        assert!(matches!(
            watcher.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn clones_share_one_collection() {
        let collection = MemoryCollection::new();
        let other_device = collection.clone();

        other_device
            .insert(NewScanDocument {
                disease: "Psoriasis".to_string(),
                image_uri: "file:///p.jpg".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(collection.fetch_all().await.unwrap().len(), 1);
    }
}
