//! Bounded image history.
//!
//! A fixed-capacity FIFO over stored images. The ring never allocates
//! after construction and never grows past its capacity: once full,
//! each insert displaces the oldest entry and hands it back to the
//! caller, who owns deleting the backing file.

use std::num::NonZeroUsize;

/// One retained image: its store-relative path plus capture metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    path: String,
    sequence: u64,
}

impl StoredImage {
    /// Creates a new entry for a durably written image.
    pub fn new(path: impl Into<String>, sequence: u64) -> Self {
        Self {
            path: path.into(),
            sequence,
        }
    }

    /// Returns the store-relative path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the capture sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Fixed-capacity FIFO of the most recent stored images.
#[derive(Debug)]
pub struct HistoryRing {
    slots: Box<[Option<StoredImage>]>,
    /// Next slot to write.
    head: usize,
    len: usize,
}

impl HistoryRing {
    /// Creates an empty ring with the given capacity.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: vec![None; capacity.get()].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Inserts the newest image, returning the displaced oldest entry
    /// once the ring is full.
    pub fn push(&mut self, image: StoredImage) -> Option<StoredImage> {
        let displaced = self.slots[self.head].replace(image);
        self.head = (self.head + 1) % self.slots.len();
        if displaced.is_none() {
            self.len += 1;
        }
        displaced
    }

    /// Returns the number of retained images.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been retained yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the next push will displace the oldest entry.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the oldest retained image.
    pub fn oldest(&self) -> Option<&StoredImage> {
        if self.len == 0 {
            return None;
        }
        let index = if self.is_full() { self.head } else { 0 };
        self.slots[index].as_ref()
    }

    /// Returns the most recently pushed image.
    pub fn newest(&self) -> Option<&StoredImage> {
        if self.len == 0 {
            return None;
        }
        let cap = self.slots.len();
        self.slots[(self.head + cap - 1) % cap].as_ref()
    }

    /// Iterates retained images from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &StoredImage> {
        let cap = self.slots.len();
        let start = if self.is_full() { self.head } else { 0 };
        (0..self.len).filter_map(move |i| self.slots[(start + i) % cap].as_ref())
    }

    /// Returns true if an image with the given path is retained.
    pub fn contains_path(&self, path: &str) -> bool {
        self.iter().any(|image| image.path() == path)
    }
}
