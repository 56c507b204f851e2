use async_trait::async_trait;
use scan_api::{CreatedDocument, NewScanDocument, ScanDocument};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("History store unavailable: {0}")]
    Unavailable(String),
    #[error("History store error: {0}")]
    Other(String),
}

// The collection is shared with other devices writing as the same user;
// implementations must never assume exclusive ownership.
#[async_trait]
pub trait ScanCollection: Send + Sync + Clone + 'static {
    async fn insert(&self, new: NewScanDocument) -> Result<CreatedDocument, StoreError>;

    async fn fetch_all(&self) -> Result<Vec<ScanDocument>, StoreError>;

    // Removing an id that is already gone is a success; another writer may
    // have won the race.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    // Publishes the entire current collection after every observed change,
    // never a delta.
    fn watch(&self) -> broadcast::Receiver<Vec<ScanDocument>>;
}
