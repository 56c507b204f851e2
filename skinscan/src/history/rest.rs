use crate::config::HistoryConfig;
use crate::history::collection::{ScanCollection, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use scan_api::{CreatedDocument, NewScanDocument, ScanDocument};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::instrument;

// The server has no push channel; a background poller re-reads the
// collection so writes made by other devices are still observed.
#[derive(Clone)]
pub struct RestCollection {
    inner: Arc<RestInner>,
}

struct RestInner {
    client: reqwest::Client,
    documents_url: String,
    updates: broadcast::Sender<Vec<ScanDocument>>,
    last_published: Arc<Mutex<Option<Vec<ScanDocument>>>>,
    shutdown: broadcast::Sender<()>,
}

impl Drop for RestInner {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

impl RestCollection {
    pub fn new(config: &HistoryConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.get_request_timeout())
            .build()
            .map_err(|e| StoreError::Other(e.to_string()))?;

        let documents_url = format!(
            "{}/collections/{}/documents",
            config.get_address(),
            config.collection
        );
        let (updates, _) = broadcast::channel(16);
        let (shutdown, _) = broadcast::channel(1);
        let last_published = Arc::new(Mutex::new(None));

        spawn_poller(
            client.clone(),
            documents_url.clone(),
            updates.clone(),
            last_published.clone(),
            config.get_poll_interval(),
            shutdown.subscribe(),
        );

        Ok(Self {
            inner: Arc::new(RestInner {
                client,
                documents_url,
                updates,
                last_published,
                shutdown,
            }),
        })
    }

    // Lets watchers see a local write before the next poll tick; failures
    // are left to the poller to repair.
    async fn refresh(&self) {
        match fetch_documents(&self.inner.client, &self.inner.documents_url).await {
            Ok(snapshot) => {
                publish_if_changed(&self.inner.updates, &self.inner.last_published, snapshot)
            }
            Err(err) => tracing::debug!(error = %err, "post-write refresh failed"),
        }
    }
}

#[async_trait]
impl ScanCollection for RestCollection {
    #[instrument(skip(self, new), fields(disease = %new.disease))]
    async fn insert(&self, new: NewScanDocument) -> Result<CreatedDocument, StoreError> {
        let response = self
            .inner
            .client
            .post(&self.inner.documents_url)
            .json(&new)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let created = response
            .json::<CreatedDocument>()
            .await
            .map_err(|e| StoreError::Other(format!("malformed create response: {e}")))?;

        self.refresh().await;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<ScanDocument>, StoreError> {
        fetch_documents(&self.inner.client, &self.inner.documents_url).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{id}", self.inner.documents_url);
        let response = self
            .inner
            .client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::NOT_FOUND {
            check_status(response).await?;
        }

        self.refresh().await;
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<Vec<ScanDocument>> {
        self.inner.updates.subscribe()
    }
}

fn spawn_poller(
    client: reqwest::Client,
    documents_url: String,
    updates: broadcast::Sender<Vec<ScanDocument>>,
    last_published: Arc<Mutex<Option<Vec<ScanDocument>>>>,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = fetch_documents(&client, &documents_url) => {
                    match result {
                        Ok(snapshot) => publish_if_changed(&updates, &last_published, snapshot),
                        Err(err) => tracing::debug!(error = %err, "history poll failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("History polling received shutdown signal");
                    break;
                }
            }

            sleep(poll_interval).await;
        }
        tracing::info!("History polling stopped");
    });
}

async fn fetch_documents(
    client: &reqwest::Client,
    documents_url: &str,
) -> Result<Vec<ScanDocument>, StoreError> {
    let response = client
        .get(documents_url)
        .send()
        .await
        .map_err(transport_error)?;
    let response = check_status(response).await?;

    response
        .json::<Vec<ScanDocument>>()
        .await
        .map_err(|e| StoreError::Other(format!("malformed document list: {e}")))
}

fn publish_if_changed(
    updates: &broadcast::Sender<Vec<ScanDocument>>,
    last_published: &Mutex<Option<Vec<ScanDocument>>>,
    snapshot: Vec<ScanDocument>,
) {
    let mut last = last_published.lock();
    if last.as_ref() == Some(&snapshot) {
        return;
    }
    *last = Some(snapshot.clone());
    let _ = updates.send(snapshot);
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        s if s.is_server_error() => StoreError::Unavailable(message),
        _ => StoreError::Other(message),
    })
}
