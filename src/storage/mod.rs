//! Local storage for completed process lifespans.

mod history;
mod lock;

pub use history::{HistorySnapshot, HistoryStore, StoreError, FORMAT_VERSION};
