use crate::history::collection::{ScanCollection, StoreError};
use futures::Stream;
use parking_lot::Mutex;
use scan_api::{NewScanDocument, ScanDocument};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryList {
    pub records: Vec<ScanDocument>,
    pub from_cache: bool,
}

pub struct HistoryStore<C: ScanCollection> {
    inner: Arc<StoreInner<C>>,
}

impl<C: ScanCollection> Clone for HistoryStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct StoreInner<C> {
    collection: C,
    cache: Arc<Mutex<CachedSnapshot>>,
    updates: broadcast::Sender<Vec<ScanDocument>>,
    shutdown: broadcast::Sender<()>,
}

impl<C> Drop for StoreInner<C> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

#[derive(Default)]
struct CachedSnapshot {
    records: Vec<ScanDocument>,
    // An empty unprimed cache means "never looked", not "the history is empty".
    primed: bool,
}

impl<C: ScanCollection> HistoryStore<C> {
    pub fn new(collection: C) -> Self {
        let cache = Arc::new(Mutex::new(CachedSnapshot::default()));
        let (updates, _) = broadcast::channel(16);
        let (shutdown, _) = broadcast::channel(1);

        spawn_relay(
            collection.watch(),
            cache.clone(),
            updates.clone(),
            shutdown.subscribe(),
        );

        Self {
            inner: Arc::new(StoreInner {
                collection,
                cache,
                updates,
                shutdown,
            }),
        }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, disease: &str, image_uri: &str) -> Result<String, StoreError> {
        let created = self
            .inner
            .collection
            .insert(NewScanDocument {
                disease: disease.to_string(),
                image_uri: image_uri.to_string(),
            })
            .await?;

        tracing::info!(id = %created.id, "scan saved to history");
        Ok(created.id)
    }

    pub async fn list_all(&self) -> Result<HistoryList, StoreError> {
        {
            let cache = self.inner.cache.lock();
            if !cache.records.is_empty() {
                return Ok(HistoryList {
                    records: cache.records.clone(),
                    from_cache: true,
                });
            }
        }

        let records = self.inner.collection.fetch_all().await?;
        {
            let mut cache = self.inner.cache.lock();
            // Do not clobber a snapshot the relay delivered while the fetch
            // was in flight.
            if !cache.primed {
                cache.records = records.clone();
                cache.primed = true;
            }
        }

        Ok(HistoryList {
            records,
            from_cache: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.collection.remove(id).await
    }

    pub fn subscribe(&self) -> HistorySubscription {
        // Attach before reading the cache; a snapshot landing in between is
        // then seen on the channel instead of going missing. A duplicate
        // around the attach is harmless, each one is the full state.
        let updates = self.inner.updates.subscribe();
        let initial = {
            let cache = self.inner.cache.lock();
            cache.primed.then(|| cache.records.clone())
        };

        HistorySubscription { initial, updates }
    }
}

pub struct HistorySubscription {
    initial: Option<Vec<ScanDocument>>,
    updates: broadcast::Receiver<Vec<ScanDocument>>,
}

impl HistorySubscription {
    pub async fn next_snapshot(&mut self) -> Option<Vec<ScanDocument>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.updates.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // A consumer that falls behind skips straight to newer
                // snapshots; intermediate states are superseded, not queued.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "history subscriber lagged, catching up");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<ScanDocument>> {
        tokio_stream::iter(self.initial.into_iter())
            .chain(BroadcastStream::new(self.updates).filter_map(|item| item.ok()))
    }
}

fn spawn_relay(
    mut changes: broadcast::Receiver<Vec<ScanDocument>>,
    cache: Arc<Mutex<CachedSnapshot>>,
    updates: broadcast::Sender<Vec<ScanDocument>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(snapshot) => {
                        // Cache first, then publish; subscribe() leans on that order.
                        let changed = {
                            let mut cache = cache.lock();
                            let changed = !cache.primed || cache.records != snapshot;
                            cache.records = snapshot.clone();
                            cache.primed = true;
                            changed
                        };
                        // A re-publish of identical state is not an event for subscribers.
                        if changed {
                            let _ = updates.send(snapshot);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "history relay lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        tracing::debug!("history relay stopped");
    });
}
