//! Shared memory region handed from the host to the execution context.
//!
//! The region is a flat array of 32-bit atomic words. Which word means what
//! is decided by a [`BufferLayout`](crate::BufferLayout) that travels next to
//! the region in the INIT message, so both sides index it the same way.

use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Reference-counted array of atomic words shared across the isolation boundary.
///
/// Cloning is cheap and yields another handle to the same memory.
#[derive(Clone)]
pub struct SharedRegion {
    words: Arc<[AtomicU32]>,
}

impl SharedRegion {
    /// Allocate a zeroed region of `len` words.
    pub fn new(len: usize) -> Self {
        let words: Vec<AtomicU32> = (0..len).map(|_| AtomicU32::new(0)).collect();
        Self {
            words: words.into(),
        }
    }

    /// Number of words in the region.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at `index`, or `None` past the end of the region.
    #[inline]
    pub fn word(&self, index: usize) -> Option<&AtomicU32> {
        self.words.get(index)
    }

    /// Whether two handles point at the same memory.
    pub fn same_region(&self, other: &SharedRegion) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }

    /// Zero every word. Only safe to call while no other context is using the region.
    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::SeqCst);
        }
    }
}

/// Panics when `index` is past the end; callers validate their layout first.
impl Index<usize> for SharedRegion {
    type Output = AtomicU32;

    #[inline]
    fn index(&self, index: usize) -> &AtomicU32 {
        &self.words[index]
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("words", &self.words.len())
            .field("handles", &Arc::strong_count(&self.words))
            .finish()
    }
}
