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

//! Inbound IAC removal
//!
//! [`IacFilter`] rewrites the readable span of the network to terminal ring in
//! place. Plain data is packed toward the end of the scanned region, Telnet
//! commands are dropped, `IAC IAC` becomes a literal `0xFF`, and `CR LF` or
//! `CR NUL` collapses to a bare `CR`. A complete NAWS subnegotiation is decoded
//! and handed to the caller's resize callback.
//!
//! The filter only ever looks at one contiguous span. A command whose tail has
//! not arrived yet is left untouched for the next call. When the tail is
//! missing because the command straddles the physical end of the ring, or the
//! ring is already full, the partial command is discarded instead, since it
//! can never become contiguous.

use crate::buffer::RingBuffer;
use crate::consts::{CR, IAC, LF, NUL, SB, SE, is_negotiation, is_two_byte_command, option};
use crate::naws::{NAWS_FRAME_LEN, WindowSize};
use tracing::trace;

/// Outcome of scanning one command that starts with `IAC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// More bytes are needed before the command can be classified.
    Incomplete,
    /// `IAC IAC`, a literal 0xFF.
    Literal,
    /// A command of the given length with no effect on the terminal.
    Skip(usize),
    /// A complete NAWS subnegotiation.
    Resize(WindowSize),
}

fn scan_command(seq: &[u8]) -> Command {
    debug_assert_eq!(seq.first(), Some(&IAC));
    let Some(&command) = seq.get(1) else {
        return Command::Incomplete;
    };
    match command {
        IAC => Command::Literal,
        SB => scan_subnegotiation(seq),
        cmd if is_two_byte_command(cmd) => Command::Skip(2),
        cmd if is_negotiation(cmd) => {
            if seq.len() < 3 {
                Command::Incomplete
            } else {
                Command::Skip(3)
            }
        }
        // Not a command; drop the pair.
        _ => Command::Skip(2),
    }
}

fn scan_subnegotiation(seq: &[u8]) -> Command {
    let Some(&option) = seq.get(2) else {
        return Command::Incomplete;
    };
    if option == option::NAWS {
        if seq.len() < NAWS_FRAME_LEN {
            return Command::Incomplete;
        }
        return match WindowSize::decode(&seq[3..7]) {
            Ok(size) => Command::Resize(size),
            Err(_) => Command::Skip(NAWS_FRAME_LEN),
        };
    }
    match seq[3..].windows(2).position(|pair| pair == &[IAC, SE]) {
        Some(offset) => Command::Skip(3 + offset + 2),
        None => Command::Incomplete,
    }
}

/// Stateful IAC removal filter for one session.
///
/// The filter remembers how many bytes at the head of the ring it has already
/// rewritten, so bytes left over after a short terminal write are never
/// interpreted a second time.
#[derive(Debug, Clone, Default)]
pub struct IacFilter {
    ready: usize,
}

impl IacFilter {
    /// Creates a filter with no pending output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of filtered bytes waiting at the head of the ring.
    pub fn ready(&self) -> usize {
        self.ready
    }

    /// Filters the readable span of `ring` in place.
    ///
    /// Returns the number of bytes at the start of `ring.readable()` that are
    /// now ready to be written verbatim to the terminal. Bytes belonging to
    /// stripped commands are consumed from the ring before returning; bytes
    /// that are ready are not, the caller consumes them as they are written
    /// and reports progress through [`IacFilter::advance`].
    pub fn filter<const N: usize, F>(&mut self, ring: &mut RingBuffer<N>, mut on_resize: F) -> usize
    where
        F: FnMut(WindowSize),
    {
        // The tail of an unfinished command can never join this span.
        let stuck = ring.is_wrapped() || ring.is_full();
        let span = ring.readable_mut();
        let end = span.len();
        let ready = self.ready.min(end);

        let mut src = ready;
        let mut dst = ready;
        while src < end {
            let byte = span[src];
            if byte != IAC {
                span[dst] = byte;
                dst += 1;
                src += 1;
                if byte == CR && src < end && (span[src] == LF || span[src] == NUL) {
                    src += 1;
                }
                continue;
            }
            match scan_command(&span[src..end]) {
                Command::Incomplete => {
                    if stuck {
                        trace!("discarding {} unterminated command bytes", end - src);
                        src = end;
                    }
                    break;
                }
                Command::Literal => {
                    span[dst] = IAC;
                    dst += 1;
                    src += 2;
                }
                Command::Skip(length) => {
                    trace!("ignoring IAC command 0x{:02X}", span[src + 1]);
                    src += length;
                }
                Command::Resize(size) => {
                    trace!("client window size {}", size);
                    on_resize(size);
                    src += NAWS_FRAME_LEN;
                }
            }
        }

        let removed = src - dst;
        if removed > 0 {
            span.copy_within(0..dst, removed);
            ring.consume(removed);
        }
        self.ready = dst;
        dst
    }

    /// Records that `written` filtered bytes left the ring.
    pub fn advance(&mut self, written: usize) {
        self.ready = self.ready.saturating_sub(written);
    }

    /// Forgets any pending filtered bytes.
    pub fn reset(&mut self) {
        self.ready = 0;
    }
}
