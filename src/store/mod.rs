//! Image persistence and retention.
//!
//! This module pairs the durable store (where image bytes live) with
//! the history ring (which of them are retained). The pipeline owns
//! keeping the two consistent.

mod durable;
mod ring;

pub use durable::{DurableStore, FlashStore, StoreError, StoredEntry};
pub use ring::{HistoryRing, StoredImage};
