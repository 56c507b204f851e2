mod collection;
mod memory;
mod rest;
mod store;

pub use collection::{ScanCollection, StoreError};
pub use memory::MemoryCollection;
pub use rest::RestCollection;
pub use store::{HistoryList, HistoryStore, HistorySubscription};
