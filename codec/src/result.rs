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

//! Error types and result aliases for the relay codec

use std::io;

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while decoding Telnet arguments.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Not enough bytes were available to decode a structure.
    #[error("insufficient data (required: {required}, available: {available})")]
    InsufficientData {
        /// Number of bytes required
        required: usize,
        /// Number of bytes available
        available: usize,
    },

    /// An I/O error occurred while reading or writing encoded data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A write that failed after an unknown amount of progress.
///
/// `written` counts bytes consumed from the caller's source slice before
/// `source` was raised, so `written == 0` means nothing reached the
/// destination.
#[derive(Debug, thiserror::Error)]
#[error("write failed after {written} bytes: {source}")]
pub struct PartialWrite {
    /// Source bytes fully transmitted before the failure
    pub written: usize,
    /// The underlying failure
    #[source]
    pub source: io::Error,
}

impl PartialWrite {
    /// Create a new partial write error
    pub fn new(written: usize, source: io::Error) -> Self {
        Self { written, source }
    }

    /// The kind of the underlying I/O error
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    /// Check whether the destination simply was not ready for more data.
    pub fn is_would_block(&self) -> bool {
        self.kind() == io::ErrorKind::WouldBlock
    }
}
