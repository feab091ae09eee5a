//! Latest-image pointer.
//!
//! Single writer (the capture context), any number of wait-free
//! readers (HTTP handlers). The pointer only ever moves onto an image
//! that has been durably written, so readers can always trust it.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Shared pointer to the most recently stored image path.
#[derive(Debug, Default)]
pub struct LatestImage {
    inner: ArcSwapOption<String>,
}

impl LatestImage {
    /// Creates a pointer with no image published yet.
    pub fn empty() -> Self {
        Self {
            inner: ArcSwapOption::empty(),
        }
    }

    /// Points readers at a newly stored image.
    pub fn publish(&self, path: String) {
        self.inner.store(Some(Arc::new(path)));
    }

    /// Returns the current image path, if any image exists yet.
    pub fn get(&self) -> Option<Arc<String>> {
        self.inner.load_full()
    }

    /// Returns true if at least one image has been published.
    pub fn is_set(&self) -> bool {
        self.inner.load().is_some()
    }
}
