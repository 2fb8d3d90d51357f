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

//! Outbound IAC doubling
//!
//! Every literal `0xFF` leaving the terminal must reach the client as
//! `IAC IAC`. [`IacDoubler`] writes runs of ordinary bytes unmodified and emits
//! the doubled form for each `IAC`, stopping at the exact byte where the
//! destination stops accepting data, even in the middle of a doubled pair.

use crate::PartialWrite;
use crate::consts::IAC;
use std::io::{self, Write};

/// Writer side state of the doubling transform for one session.
#[derive(Debug, Clone, Default)]
pub struct IacDoubler {
    half_sent: bool,
}

impl IacDoubler {
    /// Creates a doubler with no escape in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the first byte of an `IAC IAC` pair went out but the second did not.
    pub fn is_mid_escape(&self) -> bool {
        self.half_sent
    }

    /// Writes `src` to `dst`, doubling each `IAC`.
    ///
    /// Returns the number of bytes of `src` that were completely transmitted,
    /// which is less than `src.len()` after a short write. An `IAC` counts as
    /// transmitted only once both bytes of its escape are out; if just the
    /// first one was accepted, the next call resumes with the second.
    ///
    /// # Errors
    /// On a failing write the error carries the count of source bytes already
    /// transmitted during this call, so `written == 0` means nothing was sent.
    pub fn write_escaped<W: Write>(&mut self, dst: &mut W, src: &[u8]) -> Result<usize, PartialWrite> {
        let mut consumed = 0;
        while consumed < src.len() {
            let rest = &src[consumed..];
            if rest[0] == IAC {
                let escape: &[u8] = if self.half_sent { &[IAC] } else { &[IAC, IAC] };
                let sent = write_once(dst, escape).map_err(|err| PartialWrite::new(consumed, err))?;
                if sent == escape.len() {
                    self.half_sent = false;
                    consumed += 1;
                    continue;
                }
                if sent > 0 {
                    self.half_sent = true;
                }
                return Ok(consumed);
            }

            let run = rest.iter().position(|&byte| byte == IAC).unwrap_or(rest.len());
            let sent = write_once(dst, &rest[..run]).map_err(|err| PartialWrite::new(consumed, err))?;
            consumed += sent;
            if sent < run {
                return Ok(consumed);
            }
        }
        Ok(consumed)
    }
}

/// A single write, retried only when interrupted by a signal.
fn write_once<W: Write>(dst: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match dst.write(buf) {
            Ok(0) if !buf.is_empty() => return Err(io::ErrorKind::WriteZero.into()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `budget` bytes in total, then reports `WouldBlock`.
    struct Choked {
        out: Vec<u8>,
        budget: usize,
    }

    impl Choked {
        fn new(budget: usize) -> Self {
            Self {
                out: Vec::new(),
                budget,
            }
        }
    }

    impl Write for Choked {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let count = buf.len().min(self.budget);
            self.out.extend_from_slice(&buf[..count]);
            self.budget -= count;
            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_bytes_are_unchanged() {
        let mut out = Vec::new();
        let written = IacDoubler::new().write_escaped(&mut out, b"plain text\r\n").unwrap();
        assert_eq!(written, 12);
        assert_eq!(out, b"plain text\r\n");
    }

    #[test]
    fn iac_is_doubled() {
        let mut out = Vec::new();
        let written = IacDoubler::new().write_escaped(&mut out, &[IAC, b'O', b'K', b'\n']).unwrap();
        assert_eq!(written, 4);
        assert_eq!(out, vec![IAC, IAC, b'O', b'K', b'\n']);
    }

    #[test]
    fn consecutive_iacs() {
        let mut out = Vec::new();
        let written = IacDoubler::new().write_escaped(&mut out, &[IAC, IAC]).unwrap();
        assert_eq!(written, 2);
        assert_eq!(out, vec![IAC; 4]);
    }

    #[test]
    fn short_write_in_plain_run() {
        let mut dst = Choked::new(3);
        let mut doubler = IacDoubler::new();
        let written = doubler.write_escaped(&mut dst, b"abcdef").unwrap();
        assert_eq!(written, 3);
        assert_eq!(dst.out, b"abc");
    }

    #[test]
    fn short_write_inside_escape_resumes_with_second_byte() {
        let src = [b'a', IAC, b'b'];
        let mut dst = Choked::new(2);
        let mut doubler = IacDoubler::new();

        // 'a' and the first IAC go out; the IAC is not yet consumed
        let written = doubler.write_escaped(&mut dst, &src).unwrap();
        assert_eq!(written, 1);
        assert!(doubler.is_mid_escape());

        dst.budget = 16;
        let written = doubler.write_escaped(&mut dst, &src[written..]).unwrap();
        assert_eq!(written, 2);
        assert!(!doubler.is_mid_escape());
        assert_eq!(dst.out, vec![b'a', IAC, IAC, b'b']);
    }

    #[test]
    fn would_block_reports_progress() {
        let mut dst = Choked::new(2);
        let mut doubler = IacDoubler::new();
        let written = doubler.write_escaped(&mut dst, b"ab").unwrap();
        assert_eq!(written, 2);

        let err = doubler.write_escaped(&mut dst, b"cd").unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(err.written, 0);
    }

    #[test]
    fn would_block_after_partial_progress() {
        let mut dst = Choked::new(2);
        let err = IacDoubler::new()
            .write_escaped(&mut dst, &[b'x', b'y', IAC, b'z'])
            .unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(err.written, 2);
        assert_eq!(dst.out, b"xy");
    }

    #[test]
    fn hard_failure_reports_nothing_sent() {
        let err = IacDoubler::new().write_escaped(&mut Broken, b"data").unwrap_err();
        assert_eq!(err.written, 0);
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn empty_source() {
        let mut out = Vec::new();
        assert_eq!(IacDoubler::new().write_escaped(&mut out, &[]).unwrap(), 0);
        assert!(out.is_empty());
    }
}
