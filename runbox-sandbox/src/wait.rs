//! Blocking stdin reads on top of the lock-free ring.
//!
//! The execution context parks in `atomic_wait::wait` on the ring's tail
//! word. Any producer write changes the tail and wakes it; an interrupt
//! raises the flag, writes the sentinel (which also changes the tail) and
//! wakes every waiter. There is no polling on the reading side.

use crate::ring::{Consumer, RingBuffer, Slot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

const RELEASE_RETRY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StdinError {
    #[error("stdin read interrupted")]
    Interrupted,
    #[error("stdin reader released")]
    Released,
}

/// Block until the tail word no longer holds `expected_tail`.
///
/// Returns immediately if it already differs. Spurious wakes go back to sleep.
pub fn wait_for_data(ring: &RingBuffer, expected_tail: u32) {
    let tail = ring.tail_word();
    while tail.load(Ordering::SeqCst) == expected_tail {
        atomic_wait::wait(tail, expected_tail);
    }
}

/// The interpreter's view of stdin for one run.
pub struct StdinReader<'a> {
    consumer: &'a mut Consumer,
    released: Arc<AtomicBool>,
    on_block: Option<Box<dyn FnMut() + Send + 'a>>,
}

impl<'a> StdinReader<'a> {
    pub fn new(consumer: &'a mut Consumer) -> Self {
        Self {
            consumer,
            released: Arc::new(AtomicBool::new(false)),
            on_block: None,
        }
    }

    /// Called once per read that finds the ring empty, before parking.
    pub fn on_block(mut self, hook: impl FnMut() + Send + 'a) -> Self {
        self.on_block = Some(Box::new(hook));
        self
    }

    /// Stop announcing blocked reads, for runtimes whose reads are not the
    /// program's own.
    pub fn clear_block_hook(&mut self) {
        self.on_block = None;
    }

    pub fn release_handle(&self) -> StdinRelease {
        StdinRelease {
            released: Arc::clone(&self.released),
            ring: self.consumer.ring().clone(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.consumer.ring().is_interrupted()
    }

    /// Read one character, blocking while the ring is empty.
    pub fn read_char(&mut self) -> Result<char, StdinError> {
        let mut announced = false;
        loop {
            if self.consumer.ring().is_interrupted() {
                return Err(StdinError::Interrupted);
            }
            if self.released.load(Ordering::SeqCst) {
                return Err(StdinError::Released);
            }

            if let Some(code) = self.consumer.try_read() {
                return match Slot::from_code(code) {
                    Slot::Char(c) => Ok(c),
                    Slot::Interrupt => Err(StdinError::Interrupted),
                };
            }

            let ring = self.consumer.ring();
            let snapshot = ring.tail_word().load(Ordering::SeqCst);
            if ring.head() != snapshot % ring.capacity() as u32 {
                continue;
            }

            if !announced {
                announced = true;
                if let Some(hook) = self.on_block.as_mut() {
                    hook();
                }
            }

            // One park per pass: a release wakes without moving the tail, so
            // the flags above must be rechecked after every wake.
            trace!(tail = snapshot, "stdin empty, waiting");
            atomic_wait::wait(ring.tail_word(), snapshot);
        }
    }

    /// Read up to and including the next `'\n'`.
    pub fn read_line(&mut self) -> Result<String, StdinError> {
        let mut line = String::new();
        loop {
            let c = self.read_char()?;
            line.push(c);
            if c == '\n' {
                return Ok(line);
            }
        }
    }
}

/// Retires a [`StdinReader`] parked on another thread of the execution
/// context. The host never uses this; it interrupts through the ring.
#[derive(Clone)]
pub struct StdinRelease {
    released: Arc<AtomicBool>,
    ring: RingBuffer,
}

impl StdinRelease {
    /// Mark the reader released and keep waking it until `finished` reports
    /// that the reading thread has exited.
    ///
    /// A single wake can land between the reader's flag check and its park,
    /// so the wake is repeated.
    pub fn release_until(&self, mut finished: impl FnMut() -> bool) {
        self.released.store(true, Ordering::SeqCst);
        while !finished() {
            atomic_wait::wake_all(self.ring.tail_word());
            thread::sleep(RELEASE_RETRY);
        }
    }
}
