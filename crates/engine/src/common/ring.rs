//! Fixed-capacity circular queue.
//!
//! Backs the per-row free-column lists and issue-order queues. Storage is
//! allocated once at construction; pushes never reallocate.

/// Circular FIFO with a fixed capacity.
#[derive(Clone, Debug)]
pub struct Ring<T> {
    slots: Vec<T>,
    /// Index of the oldest element.
    head: usize,
    /// Index where the next element is written.
    tail: usize,
    count: usize,
}

impl<T: Copy + Default + PartialEq> Ring<T> {
    /// Creates an empty ring holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Creates a ring pre-filled from `items`, oldest first.
    ///
    /// Items beyond `capacity` are ignored.
    pub fn filled(capacity: usize, items: impl IntoIterator<Item = T>) -> Self {
        let mut ring = Self::new(capacity);
        for item in items {
            if !ring.push_back(item) {
                break;
            }
        }
        ring
    }

    /// Returns the capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of queued elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing is queued.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if no further element fits.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Appends at the tail. Returns false if the ring is full.
    pub fn push_back(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.slots[self.tail] = value;
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
        true
    }

    /// Removes and returns the oldest element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let value = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        Some(value)
    }

    /// Returns the oldest element without removing it.
    #[inline]
    pub fn front(&self) -> Option<T> {
        if self.count == 0 {
            None
        } else {
            Some(self.slots[self.head])
        }
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let cap = self.slots.len();
        (0..self.count).map(move |i| self.slots[(self.head + i) % cap])
    }

    /// Returns true if `value` is queued.
    pub fn contains(&self, value: T) -> bool {
        self.iter().any(|v| v == value)
    }

    /// Removes the first occurrence of `value`, keeping the order of the rest.
    ///
    /// Returns false if `value` is not queued.
    pub fn remove(&mut self, value: T) -> bool {
        let cap = self.slots.len();
        let Some(pos) = self.iter().position(|v| v == value) else {
            return false;
        };
        if pos == 0 {
            return self.pop_front().is_some();
        }
        // Shift the younger elements down over the hole.
        for i in pos..self.count - 1 {
            let dst = (self.head + i) % cap;
            let src = (self.head + i + 1) % cap;
            self.slots[dst] = self.slots[src];
        }
        self.tail = (self.tail + cap - 1) % cap;
        self.count -= 1;
        true
    }
}
