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

//! Negotiate About Window Size
//!

use crate::consts::{IAC, SB, SE, option};
use crate::{CodecError, CodecResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Length of a complete `IAC SB NAWS <w:2> <h:2> IAC SE` subnegotiation.
pub const NAWS_FRAME_LEN: usize = 9;

/// Represents the Negotiate About Window Size (NAWS) option data.
///
/// The window size is encoded as four bytes in big-endian format:
/// - 2 bytes for columns (width)
/// - 2 bytes for rows (height)
///
/// # Example
/// ```
/// use telnetd_codec::WindowSize;
///
/// let size = WindowSize::new(80, 24);
/// assert_eq!(size.cols, 80);
/// assert_eq!(size.rows, 24);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    /// The number of columns (characters) in the terminal window
    pub cols: u16,
    /// The number of rows (lines) in the terminal window
    pub rows: u16,
}

impl WindowSize {
    /// Creates a new `WindowSize` with the specified columns and rows.
    pub fn new(cols: u16, rows: u16) -> Self {
        WindowSize { cols, rows }
    }

    /// Returns the encoded length of the NAWS payload, always `4`.
    pub fn len(&self) -> usize {
        4
    }

    /// Writes the payload to a writer as two big-endian `u16` values.
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_u16::<BigEndian>(self.cols)?;
        writer.write_u16::<BigEndian>(self.rows)?;
        Ok(4)
    }

    /// Decodes the four payload bytes of a NAWS subnegotiation.
    ///
    /// # Errors
    /// Returns [`CodecError::InsufficientData`] if fewer than 4 bytes are given.
    ///
    /// # Example
    /// ```
    /// use telnetd_codec::WindowSize;
    ///
    /// let size = WindowSize::decode(&[0x00, 0x50, 0x00, 0x18]).unwrap();
    /// assert_eq!(size, WindowSize::new(80, 24));
    /// ```
    pub fn decode(src: &[u8]) -> CodecResult<Self> {
        if src.len() < 4 {
            return Err(CodecError::InsufficientData {
                required: 4,
                available: src.len(),
            });
        }
        let mut reader = src;
        let cols = reader.read_u16::<BigEndian>()?;
        let rows = reader.read_u16::<BigEndian>()?;
        Ok(WindowSize { cols, rows })
    }

    /// Builds the full subnegotiation a client sends to report this size.
    ///
    /// Payload bytes equal to `IAC` are not doubled; the relay filter reads
    /// the payload positionally.
    pub fn to_subnegotiation(&self) -> [u8; NAWS_FRAME_LEN] {
        let [c0, c1] = self.cols.to_be_bytes();
        let [r0, r1] = self.rows.to_be_bytes();
        [IAC, SB, option::NAWS, c0, c1, r0, r1, IAC, SE]
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
