//! Output buffer that releases marked records in input order
//!
//! Records enter in ordinal order but are resolved out of order, as their groups
//! finalize. Only the resolved prefix of the buffer is released.
//!
//! ```
//! use mcmarkdup::output::OutputBuffer;
//!
//! let mut buffer: OutputBuffer<&str> = OutputBuffer::new();
//! buffer.push_pending(0, "first");
//! buffer.push_resolved(1, "second", false);
//!
//! assert!(buffer.pop().is_none());
//! buffer.resolve(0, true);
//! assert_eq!(buffer.pop().map(|m| (m.record, m.is_duplicate)), Some(("first", true)));
//! assert_eq!(buffer.pop().map(|m| (m.record, m.is_duplicate)), Some(("second", false)));
//! ```

use std::collections::VecDeque;

/// A record with its duplicate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marked<T> {
    pub record: T,
    pub is_duplicate: bool,
}

#[derive(Debug)]
struct Slot<T> {
    record: T,
    is_duplicate: Option<bool>,
}

/// Buffer of records waiting for their duplicate decision
#[derive(Debug)]
pub struct OutputBuffer<T> {
    slots: VecDeque<Slot<T>>,
    /// Ordinal of `slots[0]`
    base: u64,
}

impl<T> Default for OutputBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutputBuffer<T> {
    pub fn new() -> Self {
        Self { slots: VecDeque::new(), base: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn push(&mut self, ordinal: u64, record: T, is_duplicate: Option<bool>) {
        debug_assert_eq!(
            ordinal,
            self.base + self.slots.len() as u64,
            "records must enter the buffer in ordinal order"
        );
        self.slots.push_back(Slot { record, is_duplicate });
    }

    /// Adds a record whose decision is not known yet
    pub fn push_pending(&mut self, ordinal: u64, record: T) {
        self.push(ordinal, record, None);
    }

    /// Adds a record whose decision is already known
    pub fn push_resolved(&mut self, ordinal: u64, record: T, is_duplicate: bool) {
        self.push(ordinal, record, Some(is_duplicate));
    }

    /// Records the decision for a pending record; ordinals already released are ignored
    pub fn resolve(&mut self, ordinal: u64, is_duplicate: bool) {
        let Some(index) = ordinal.checked_sub(self.base) else {
            return;
        };
        if let Some(slot) = self.slots.get_mut(index as usize) {
            debug_assert!(slot.is_duplicate.is_none(), "ordinal {ordinal} resolved twice");
            slot.is_duplicate = Some(is_duplicate);
        }
    }

    /// Releases the oldest record if its decision is known
    pub fn pop(&mut self) -> Option<Marked<T>> {
        let is_duplicate = self.slots.front()?.is_duplicate?;
        let slot = self.slots.pop_front()?;
        self.base += 1;
        Some(Marked { record: slot.record, is_duplicate })
    }

    /// Whether every buffered record has been resolved
    pub fn is_fully_resolved(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_duplicate.is_some())
    }
}
