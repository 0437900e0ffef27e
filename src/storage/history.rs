/// Fixed-capacity reading history with a memoized smoothing cache
///
/// Readings live in a ring of `CAPACITY` slots addressed by `head` (next
/// write position) and `len`. Logical index 0 is always the oldest reading.
///
/// Next to the ring sit two cache arrays, one per quantity, holding the
/// centered moving average for each logical index. Every `push` and `clear`
/// shifts which reading a logical index refers to, so both arrays are reset
/// to "not computed" (`None`) on each of them. A slot is filled on its first
/// read and reused until the next reset.
use std::cell::Cell;

use crate::error::HistoryError;
use crate::models::{Quantity, Reading};

/// Number of readings retained
pub const CAPACITY: usize = 300;
/// Default width of the smoothing window, in readings
pub const SMOOTHING_WINDOW: usize = 5;

pub struct History {
    buffer: [Reading; CAPACITY],
    head: usize,
    len: usize,
    temp_cache: [Cell<Option<f32>>; CAPACITY],
    press_cache: [Cell<Option<f32>>; CAPACITY],
}

impl History {
    pub fn new() -> Self {
        History {
            buffer: [Reading::default(); CAPACITY],
            head: 0,
            len: 0,
            temp_cache: std::array::from_fn(|_| Cell::new(None)),
            press_cache: std::array::from_fn(|_| Cell::new(None)),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Append a reading, evicting the oldest one once full
    pub fn push(&mut self, reading: Reading) {
        self.buffer[self.head] = reading;
        self.head = (self.head + 1) % CAPACITY;
        if self.len < CAPACITY {
            self.len += 1;
        }
        self.invalidate();
    }

    /// Drop every reading
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.invalidate();
    }

    /// Reading at a logical index, 0 being the oldest
    pub fn get(&self, index: usize) -> Result<&Reading, HistoryError> {
        if self.len == 0 {
            return Err(HistoryError::Empty);
        }
        if index >= self.len {
            return Err(HistoryError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok(&self.buffer[self.physical(index)])
    }

    /// Most recent reading, if any
    pub fn latest(&self) -> Option<&Reading> {
        self.len.checked_sub(1).map(|i| &self.buffer[self.physical(i)])
    }

    /// Iterate readings oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        (0..self.len).map(move |i| &self.buffer[self.physical(i)])
    }

    /// Centered moving average over `SMOOTHING_WINDOW` readings, memoized
    pub fn smoothed(&self, quantity: Quantity, index: usize) -> Result<f32, HistoryError> {
        self.smoothed_with_window(quantity, index, SMOOTHING_WINDOW)
    }

    /// Centered moving average over up to `window` readings around `index`,
    /// clamped at both ends of the history.
    ///
    /// Only the default window width is memoized; other widths are computed
    /// on every call.
    pub fn smoothed_with_window(
        &self,
        quantity: Quantity,
        index: usize,
        window: usize,
    ) -> Result<f32, HistoryError> {
        self.get(index)?;

        if window != SMOOTHING_WINDOW {
            return Ok(self.average_around(quantity, index, window));
        }

        let slot = &self.cache(quantity)[index];
        if let Some(value) = slot.get() {
            return Ok(value);
        }
        let value = self.average_around(quantity, index, window);
        slot.set(Some(value));
        Ok(value)
    }

    /// Memoized smoothing value for a logical index, without computing it
    pub fn cached_smoothed(&self, quantity: Quantity, index: usize) -> Option<f32> {
        self.cache(quantity).get(index).and_then(Cell::get)
    }

    fn average_around(&self, quantity: Quantity, index: usize, window: usize) -> f32 {
        let half = window / 2;
        let start = index.saturating_sub(half);
        let end = (index + half).min(self.len - 1);

        let sum: f32 = (start..=end)
            .map(|i| self.buffer[self.physical(i)].value(quantity))
            .sum();
        sum / (end - start + 1) as f32
    }

    fn cache(&self, quantity: Quantity) -> &[Cell<Option<f32>>; CAPACITY] {
        match quantity {
            Quantity::Temperature => &self.temp_cache,
            Quantity::Pressure => &self.press_cache,
        }
    }

    fn invalidate(&mut self) {
        self.temp_cache.iter().for_each(|slot| slot.set(None));
        self.press_cache.iter().for_each(|slot| slot.set(None));
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + CAPACITY - self.len + index) % CAPACITY
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
