//! Ring buffer layout inside a [`SharedRegion`](crate::SharedRegion).
//!
//! Region layout for [`BufferLayout::standard`] (all offsets in 32-bit words):
//!
//! ```text
//!   [0]        head       consumer writes, producer reads
//!   [1]        tail       producer writes, consumer reads and waits on
//!   [2]        interrupt  producer raises, consumer observes
//!   [3]        reserved
//!   [4..4+N]   data       N character codes
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of slots in the stdin ring.
pub const DEFAULT_CAPACITY: u32 = 256;

/// Words reserved ahead of the data area in the standard layout.
pub const CONTROL_WORDS: u32 = 4;

/// Word offsets of the ring's control words and data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLayout {
    pub head_index: u32,
    pub tail_index: u32,
    pub interrupt_index: u32,
    pub data_offset: u32,
    /// Ring capacity in slots. One slot is always left free.
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("ring size {0} is too small (need at least 2 slots)")]
    TooSmall(u32),

    #[error("control words overlap (head={head}, tail={tail}, interrupt={interrupt})")]
    OverlappingControl { head: u32, tail: u32, interrupt: u32 },

    #[error("control word {index} lies inside the data area {start}..{end}")]
    ControlInData { index: u32, start: u64, end: u64 },

    #[error("layout needs {needed} words but the region has {available}")]
    OutOfBounds { needed: u64, available: usize },
}

impl BufferLayout {
    /// Canonical layout: control words first, data after them.
    pub fn standard(capacity: u32) -> Self {
        Self {
            head_index: 0,
            tail_index: 1,
            interrupt_index: 2,
            data_offset: CONTROL_WORDS,
            size: capacity,
        }
    }

    /// Words a region must have to hold this layout.
    pub fn region_len(&self) -> u64 {
        let control = [self.head_index, self.tail_index, self.interrupt_index]
            .into_iter()
            .map(|i| i as u64 + 1)
            .max()
            .unwrap_or(0);
        control.max(self.data_end())
    }

    fn data_end(&self) -> u64 {
        self.data_offset as u64 + self.size as u64
    }

    /// Check the layout against a region of `available` words.
    pub fn validate(&self, available: usize) -> Result<(), LayoutError> {
        if self.size < 2 {
            return Err(LayoutError::TooSmall(self.size));
        }

        let (head, tail, interrupt) = (self.head_index, self.tail_index, self.interrupt_index);
        if head == tail || head == interrupt || tail == interrupt {
            return Err(LayoutError::OverlappingControl {
                head,
                tail,
                interrupt,
            });
        }

        let start = self.data_offset as u64;
        let end = self.data_end();
        for index in [head, tail, interrupt] {
            if (start..end).contains(&(index as u64)) {
                return Err(LayoutError::ControlInData { index, start, end });
            }
        }

        let needed = self.region_len();
        if needed > available as u64 {
            return Err(LayoutError::OutOfBounds { needed, available });
        }

        Ok(())
    }
}

impl Default for BufferLayout {
    fn default() -> Self {
        Self::standard(DEFAULT_CAPACITY)
    }
}
