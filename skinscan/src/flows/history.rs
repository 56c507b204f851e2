use crate::history::{HistoryList, HistoryStore, HistorySubscription, ScanCollection, StoreError};
use scan_api::ScanDocument;

pub struct HistoryFlow<C: ScanCollection> {
    history: HistoryStore<C>,
    records: Vec<ScanDocument>,
    from_cache: bool,
    live: bool,
    pending_delete: Option<String>,
}

impl<C: ScanCollection> HistoryFlow<C> {
    pub fn new(history: HistoryStore<C>) -> Self {
        Self {
            history,
            records: Vec::new(),
            from_cache: false,
            live: false,
            pending_delete: None,
        }
    }

    pub fn records(&self) -> &[ScanDocument] {
        &self.records
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache && !self.live
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    // Subscription first, then the listing, so no change lands unseen in
    // between.
    pub async fn mount(&mut self) -> Result<HistorySubscription, StoreError> {
        let subscription = self.history.subscribe();
        let listing = self.history.list_all().await?;
        self.apply_list(listing);
        Ok(subscription)
    }

    // A live snapshot wins for good; a listing that resolves afterwards is
    // discarded.
    pub fn apply_list(&mut self, listing: HistoryList) {
        if self.live {
            return;
        }
        self.from_cache = listing.from_cache;
        self.records = listing.records;
    }

    pub fn apply_snapshot(&mut self, snapshot: Vec<ScanDocument>) {
        self.live = true;
        self.records = snapshot;
    }

    pub fn request_delete(&mut self, id: &str) -> bool {
        if self.records.iter().any(|record| record.id == id) {
            self.pending_delete = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    // Win or lose, the visible list only changes on the next snapshot.
    pub async fn confirm_delete(&mut self) -> Result<(), StoreError> {
        match self.pending_delete.take() {
            Some(id) => self.history.delete(&id).await,
            None => Ok(()),
        }
    }
}
