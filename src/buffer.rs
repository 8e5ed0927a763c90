//! Fixed-capacity circular byte buffer with contiguous segment access
//! (spec.md §4.1).
//!
//! The teacher crate has no ring buffer of its own (MAVLink connections
//! read from whatever `std::io::Read` hands them); this is grounded
//! instead on the discontiguous-region technique in `circq` (the
//! `oxidecomputer-hubris` pack's single-purpose ring-buffer crate) and on
//! the field layout of the original's `UartRingBuffer` (`uart_dma.h`).
//! Unlike `circq`, capacity is owned (`Vec<u8>`) rather than borrowed,
//! since flows are built once at boot and live for the pipeline's
//! lifetime.

/// Single-writer/single-reader ring buffer (spec.md §3 invariant: "For any
/// active flow, its `inputBuffer` is not shared with another flow's input
/// side").
pub struct CircularBuffer {
    data: Vec<u8>,
    head: usize,
    tail: usize,
    len: usize,
}

impl CircularBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn free_space(&self) -> usize {
        self.data.len() - self.len
    }

    /// Writes as many bytes of `bytes` as fit; returns the number accepted
    /// (spec.md §4.1: "short-write allowed").
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let cap = self.data.len();
        if cap == 0 {
            return 0;
        }
        let n = bytes.len().min(self.free_space());
        for &b in &bytes[..n] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % cap;
        }
        self.len += n;
        n
    }

    /// Advances the read cursor by `n` bytes. `n` must be `<= available()`;
    /// callers that violate this get a saturated consume (defensive
    /// against a miscounted caller, never panics on the hot path).
    pub fn consume(&mut self, n: usize) {
        let cap = self.data.len();
        let n = n.min(self.len);
        if cap > 0 {
            self.tail = (self.tail + n) % cap;
        }
        self.len -= n;
    }

    /// Up to `n` contiguous bytes starting at the read cursor, stopping
    /// short at wrap (spec.md §4.1: "may be shorter at wrap"). Parsers
    /// that need the full available run across a wrap boundary should
    /// call [`Self::get_read_segments`] instead.
    pub fn get_contiguous_for_parser(&self, n: usize) -> &[u8] {
        let cap = self.data.len();
        if cap == 0 || self.len == 0 {
            return &[];
        }
        let want = n.min(self.len);
        let run_to_end = cap - self.tail;
        let take = want.min(run_to_end);
        &self.data[self.tail..self.tail + take]
    }

    /// The full available range as up to two contiguous segments
    /// (spec.md §4.1).
    pub fn get_read_segments(&self) -> (&[u8], &[u8]) {
        let cap = self.data.len();
        if cap == 0 || self.len == 0 {
            return (&[], &[]);
        }
        let run_to_end = (cap - self.tail).min(self.len);
        let first = &self.data[self.tail..self.tail + run_to_end];
        let remainder = self.len - run_to_end;
        let second = &self.data[..remainder];
        (first, second)
    }
}
