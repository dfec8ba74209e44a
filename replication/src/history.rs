//! Client-side per-item history of decoded, not yet applied updates.

use std::collections::VecDeque;

use crate::types::Tick;

/// One decoded update waiting for the client clock to reach its tick.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<U> {
    /// Host tick the update was produced at.
    pub tick: Tick,
    /// `Some` when the update announced the facet's existence state.
    pub existence: Option<bool>,
    /// Decoded field changes; `None` when the facet does not exist.
    pub update: Option<U>,
}

/// Errors that can occur when appending to a history queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Ticks must be non-decreasing.
    OutOfOrder { last_tick: Tick, new_tick: Tick },
    /// The queue already holds `capacity` entries.
    Full { capacity: usize },
}

/// A bounded FIFO of history entries in non-decreasing tick order.
///
/// Decode appends at the back; interpolation pops from the front.
#[derive(Debug, Clone)]
pub struct HistoryQueue<U> {
    entries: VecDeque<HistoryEntry<U>>,
    capacity: usize,
}

impl<U> HistoryQueue<U> {
    /// Creates an empty queue holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick of the newest buffered entry.
    #[must_use]
    pub fn last_tick(&self) -> Option<Tick> {
        self.entries.back().map(|entry| entry.tick)
    }

    /// Tick of the oldest buffered entry.
    #[must_use]
    pub fn front_tick(&self) -> Option<Tick> {
        self.entries.front().map(|entry| entry.tick)
    }

    /// Appends an entry.
    ///
    /// Entries sharing a tick are kept in arrival order.
    pub fn push(&mut self, entry: HistoryEntry<U>) -> Result<(), HistoryError> {
        if let Some(last) = self.last_tick() {
            if entry.tick < last {
                return Err(HistoryError::OutOfOrder {
                    last_tick: last,
                    new_tick: entry.tick,
                });
            }
        }
        if self.entries.len() >= self.capacity {
            return Err(HistoryError::Full {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Pops the front entry if the clock has reached its tick.
    ///
    /// Never skips ahead: a future-tick front entry blocks everything behind it.
    pub fn pop_due(&mut self, clock: Tick) -> Option<HistoryEntry<U>> {
        if self.front_tick()? <= clock {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry<U>> {
        self.entries.iter()
    }
}
