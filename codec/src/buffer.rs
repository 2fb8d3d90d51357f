//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Fixed capacity byte ring shared by both directions of a session.
//!
//! The ring tracks a read cursor, a write cursor and an occupancy count.
//! Cursor equality is ambiguous (empty or full), so the occupancy count is the
//! only source of truth for the empty and full states. All access goes through
//! contiguous spans: [`RingBuffer::readable`] yields the bytes from the read
//! cursor up to the physical end or the occupancy, whichever comes first, and
//! [`RingBuffer::writable`] yields the free bytes from the write cursor up to
//! the physical end or the remaining capacity.

/// Capacity of every session buffer.
pub const BUFFER_SIZE: usize = 4000;

/// Fixed capacity circular byte buffer.
#[derive(Clone)]
pub struct RingBuffer<const N: usize = BUFFER_SIZE> {
    data: [u8; N],
    read: usize,
    write: usize,
    len: usize,
}

impl<const N: usize> RingBuffer<N> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            data: [0; N],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of occupied bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when every byte of capacity is occupied.
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Free capacity in bytes, not necessarily contiguous.
    pub fn spare(&self) -> usize {
        N - self.len
    }

    /// Position of the next byte to drain.
    pub fn read_cursor(&self) -> usize {
        self.read
    }

    /// Position of the next byte to fill.
    pub fn write_cursor(&self) -> usize {
        self.write
    }

    /// Contiguous queued bytes starting at the read cursor.
    pub fn readable(&self) -> &[u8] {
        let count = self.len.min(N - self.read);
        &self.data[self.read..self.read + count]
    }

    /// Mutable view of [`RingBuffer::readable`], used by in-place filters.
    pub fn readable_mut(&mut self) -> &mut [u8] {
        let count = self.len.min(N - self.read);
        &mut self.data[self.read..self.read + count]
    }

    /// True when queued bytes continue past the physical end at the start of storage.
    pub fn is_wrapped(&self) -> bool {
        self.len > N - self.read
    }

    /// Contiguous free bytes starting at the write cursor.
    pub fn writable(&mut self) -> &mut [u8] {
        let count = (N - self.len).min(N - self.write);
        &mut self.data[self.write..self.write + count]
    }

    /// Marks `count` bytes written into [`RingBuffer::writable`] as queued.
    ///
    /// # Panics
    /// Panics if `count` exceeds the contiguous writable span.
    pub fn commit(&mut self, count: usize) {
        assert!(
            count <= (N - self.len).min(N - self.write),
            "commit of {count} bytes exceeds writable span"
        );
        self.len += count;
        self.write = (self.write + count) % N;
    }

    /// Drops `count` bytes from the front of [`RingBuffer::readable`].
    ///
    /// # Panics
    /// Panics if `count` exceeds the contiguous readable span.
    pub fn consume(&mut self, count: usize) {
        assert!(
            count <= self.len.min(N - self.read),
            "consume of {count} bytes exceeds readable span"
        );
        self.len -= count;
        self.read = (self.read + count) % N;
    }

    /// Rewinds both cursors to the start of storage when the buffer is empty,
    /// maximising the next contiguous read. Returns true if a reset happened.
    pub fn reset_if_empty(&mut self) -> bool {
        if self.len == 0 && (self.read != 0 || self.write != 0) {
            self.read = 0;
            self.write = 0;
            true
        } else {
            false
        }
    }

    /// Copies as much of `src` as fits, following the wrap. Returns the number of bytes queued.
    pub fn push_slice(&mut self, mut src: &[u8]) -> usize {
        let mut total = 0;
        while !src.is_empty() {
            let span = self.writable();
            if span.is_empty() {
                break;
            }
            let count = span.len().min(src.len());
            span[..count].copy_from_slice(&src[..count]);
            self.commit(count);
            total += count;
            src = &src[count..];
        }
        total
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("read", &self.read)
            .field("write", &self.write)
            .field("len", &self.len)
            .finish()
    }
}
