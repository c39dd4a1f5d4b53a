//! Lock-free single-producer / single-consumer ring of character codes.
//!
//! The ring lives entirely inside a [`SharedRegion`]: two cursor words, an
//! interrupt flag and `size` data slots, placed according to a
//! [`BufferLayout`]. The host owns the [`Producer`] and the execution context
//! owns the [`Consumer`]. Only the producer stores to `tail`, only the
//! consumer stores to `head` (apart from [`Producer::reset`], which runs while
//! the consumer is idle between runs).
//!
//! One slot is always left free, so `head == tail` means empty and
//! `(tail + 1) % size == head` means full.

use runbox_common::{BufferLayout, LayoutError, SharedRegion};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Code written by the producer to force a blocked reader awake.
/// Not a Unicode scalar value, so it never collides with typed input.
pub const INTERRUPT_SENTINEL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("input ring is full ({capacity} slots)")]
pub struct RingFull {
    pub capacity: usize,
}

/// A decoded slot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Char(char),
    Interrupt,
}

impl Slot {
    pub fn from_code(code: u32) -> Self {
        if code == INTERRUPT_SENTINEL {
            Slot::Interrupt
        } else {
            Slot::Char(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
        }
    }
}

/// Shared view of a ring. Both handles wrap one of these.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    region: SharedRegion,
    layout: BufferLayout,
}

impl RingBuffer {
    /// Allocate a fresh region with the standard layout.
    pub fn allocate(capacity: u32) -> Result<Self, LayoutError> {
        let layout = BufferLayout::standard(capacity);
        let region = SharedRegion::new(layout.region_len() as usize);
        Self::attach(region, layout)
    }

    /// View an existing region through `layout`, validating it first.
    pub fn attach(region: SharedRegion, layout: BufferLayout) -> Result<Self, LayoutError> {
        layout.validate(region.len())?;
        Ok(Self { region, layout })
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size as usize
    }

    #[inline]
    pub(crate) fn head_word(&self) -> &AtomicU32 {
        &self.region[self.layout.head_index as usize]
    }

    #[inline]
    pub(crate) fn tail_word(&self) -> &AtomicU32 {
        &self.region[self.layout.tail_index as usize]
    }

    #[inline]
    fn interrupt_word(&self) -> &AtomicU32 {
        &self.region[self.layout.interrupt_index as usize]
    }

    #[inline]
    fn slot(&self, position: u32) -> &AtomicU32 {
        let offset = self.layout.data_offset + position % self.layout.size;
        &self.region[offset as usize]
    }

    // Cursors are reduced modulo the size on every load so a corrupt peer can
    // never push an index out of the data area.

    #[inline]
    pub fn head(&self) -> u32 {
        self.head_word().load(Ordering::SeqCst) % self.layout.size
    }

    #[inline]
    pub fn tail(&self) -> u32 {
        self.tail_word().load(Ordering::SeqCst) % self.layout.size
    }

    #[inline]
    fn advance(&self, position: u32) -> u32 {
        (position + 1) % self.layout.size
    }

    /// Number of unread slots.
    pub fn len(&self) -> usize {
        let size = self.layout.size;
        ((self.tail() + size - self.head()) % size) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head() == self.tail()
    }

    pub fn is_full(&self) -> bool {
        self.advance(self.tail()) == self.head()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt_word().load(Ordering::SeqCst) != 0
    }
}

/// Writing end, held by the host's input feeder.
#[derive(Debug)]
pub struct Producer {
    ring: RingBuffer,
}

impl Producer {
    pub fn new(ring: RingBuffer) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Push one code and wake the consumer. Never blocks.
    pub fn write(&mut self, code: u32) -> Result<(), RingFull> {
        let tail = self.ring.tail();
        let next = self.ring.advance(tail);
        if next == self.ring.head() {
            return Err(RingFull {
                capacity: self.ring.capacity(),
            });
        }

        self.ring.slot(tail).store(code, Ordering::Relaxed);
        self.ring.tail_word().store(next, Ordering::SeqCst);
        atomic_wait::wake_one(self.ring.tail_word());
        Ok(())
    }

    pub fn write_char(&mut self, c: char) -> Result<(), RingFull> {
        self.write(c as u32)
    }

    /// Forced wake: raise the interrupt flag, push the sentinel if there is
    /// room, and wake every waiter. Returns whether the sentinel was queued.
    ///
    /// The flag is raised before the sentinel is written, so a reader that
    /// finds a full ring still sees the interrupt on its next check.
    pub fn interrupt(&mut self) -> bool {
        self.ring.interrupt_word().store(1, Ordering::SeqCst);
        let queued = self.write(INTERRUPT_SENTINEL).is_ok();
        atomic_wait::wake_all(self.ring.tail_word());
        queued
    }

    /// Zero both cursors and the interrupt flag.
    ///
    /// Must only be called while the consumer is not reading, i.e. between
    /// runs.
    pub fn reset(&mut self) {
        self.ring.interrupt_word().store(0, Ordering::SeqCst);
        self.ring.head_word().store(0, Ordering::SeqCst);
        self.ring.tail_word().store(0, Ordering::SeqCst);
    }
}

/// Reading end, held by the execution context.
#[derive(Debug)]
pub struct Consumer {
    ring: RingBuffer,
}

impl Consumer {
    pub fn new(ring: RingBuffer) -> Self {
        Self { ring }
    }

    /// Attach to a region received in INIT.
    pub fn attach(region: SharedRegion, layout: BufferLayout) -> Result<Self, LayoutError> {
        RingBuffer::attach(region, layout).map(Self::new)
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Pop one code if any is available. Never blocks.
    pub fn try_read(&mut self) -> Option<u32> {
        let head = self.ring.head();
        if head == self.ring.tail() {
            return None;
        }

        let code = self.ring.slot(head).load(Ordering::Relaxed);
        self.ring
            .head_word()
            .store(self.ring.advance(head), Ordering::SeqCst);
        Some(code)
    }
}
