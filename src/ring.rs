//! Fixed-capacity circular queue used for every inter-stage channel.
//!
//! [`RingBuffer`] never allocates: its storage is an inline `[T; N]` array.
//! Pushing into a full buffer overwrites the oldest element, so a producer that
//! streams samples faster than the consumer drains them loses the oldest data
//! instead of blocking.
//!
//! Each buffer is owned by exactly one stage. Items cross stage boundaries by
//! copy, never by sharing the buffer. When a producer runs in interrupt
//! context, wrap the buffer as shown in [`crate::timer`] (feature `timer-isr`).
//!
//! ## Invariants
//!
//! - `0 <= count <= capacity`
//! - `is_empty() == (count == 0)`
//! - `is_full() == (count == capacity)`

use crate::error::{Error, Result};

/// A fixed-capacity circular queue of `N` elements of type `T`.
///
/// # Example
///
/// ```rust
/// use peregrine::ring::RingBuffer;
///
/// let mut ring: RingBuffer<u8, 2> = RingBuffer::new();
/// ring.push(1);
/// ring.push(2);
/// ring.push(3); // overwrites 1
/// assert_eq!(ring.pop(), Ok(2));
/// assert_eq!(ring.pop(), Ok(3));
/// assert!(ring.pop().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    buf: [T; N],
    /// Index of the next slot to write.
    head: usize,
    /// Index of the oldest element.
    tail: usize,
    count: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    /// Creates an empty buffer with every slot set to `T::default()`.
    pub fn new() -> Self {
        const { assert!(N > 0, "ring buffer capacity must be non-zero") };
        Self {
            buf: [T::default(); N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Appends `item`. When the buffer is full the oldest element is dropped.
    pub fn push(&mut self, item: T) {
        self.buf[self.head] = item;
        if self.count == N {
            self.tail = (self.tail + 1) % N;
        } else {
            self.count += 1;
        }
        self.head = (self.head + 1) % N;
    }

    /// Removes and returns the oldest element.
    ///
    /// # Errors
    /// [`Error::EmptyBuffer`] when there is nothing queued.
    pub fn pop(&mut self) -> Result<T> {
        if self.count == 0 {
            return Err(Error::EmptyBuffer);
        }
        let item = self.buf[self.tail];
        self.tail = (self.tail + 1) % N;
        self.count -= 1;
        Ok(item)
    }

    /// Returns the oldest element without removing it.
    ///
    /// # Errors
    /// [`Error::EmptyBuffer`] when there is nothing queued.
    pub fn peek(&self) -> Result<T> {
        if self.count == 0 {
            return Err(Error::EmptyBuffer);
        }
        Ok(self.buf[self.tail])
    }

    /// Drops up to `n` of the oldest elements.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.count);
        self.tail = (self.tail + n) % N;
        self.count -= n;
    }

    /// Iterates over the queued elements, oldest first, without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.count).map(move |i| self.buf[(self.tail + i) % N])
    }

    /// Number of queued elements.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of free slots before the next push overwrites.
    pub fn free(&self) -> usize {
        N - self.count
    }

    /// Fixed capacity `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// `true` when `count() == capacity()`.
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Empties the buffer.
    ///
    /// The head index is kept where it is so a DMA engine writing into the
    /// backing storage stays in step with the buffer.
    pub fn reset(&mut self) {
        self.tail = self.head;
        self.count = 0;
    }

    /// Direct access to the backing storage for a DMA engine.
    ///
    /// After the hardware has written into the storage, report the new write
    /// position with [`set_head`](Self::set_head).
    #[cfg(feature = "dma")]
    pub fn storage_mut(&mut self) -> &mut [T; N] {
        &mut self.buf
    }

    /// Moves the write position to `index` after an external writer filled the
    /// storage, and recomputes `count` from the head/tail distance.
    ///
    /// A head equal to the tail is read as a completely full buffer.
    ///
    /// # Errors
    /// [`Error::InvalidParameters`] if `index >= capacity()`.
    #[cfg(feature = "dma")]
    pub fn set_head(&mut self, index: usize) -> Result<()> {
        if index >= N {
            return Err(Error::InvalidParameters);
        }
        self.head = index;
        self.count = if self.head == self.tail {
            N
        } else if self.head > self.tail {
            self.head - self.tail
        } else {
            N + self.head - self.tail
        };
        Ok(())
    }
}
