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

//! # Telnetd Relay Codec
//!
//! Byte level Telnet processing for a daemon that relays a TCP peer to a
//! pseudo-terminal. Unlike a framing codec, everything here operates in place
//! on fixed capacity ring buffers so a session never allocates while relaying.
//!
//! ## Core Components
//!
//! ### [`RingBuffer`]
//!
//! Fixed capacity circular byte buffer. Occupancy is tracked by a count rather
//! than by comparing cursors, so an empty buffer and a full one are never
//! confused.
//!
//! ### [`IacFilter`]
//!
//! Strips Telnet commands from the network to terminal direction, unescapes
//! `IAC IAC`, canonicalizes `CR LF`/`CR NUL` to `CR` and decodes NAWS window
//! size reports.
//!
//! ### [`IacDoubler`]
//!
//! Escapes every `IAC` in the terminal to network direction while surviving
//! short writes at any byte, including between the two halves of an escape.
//!
//! ## Usage Example
//!
//! ```rust
//! use telnetd_codec::{IacDoubler, IacFilter, RingBuffer};
//!
//! let mut inbound: RingBuffer = RingBuffer::new();
//! inbound.push_slice(b"ls\r\n");
//!
//! let mut filter = IacFilter::new();
//! let ready = filter.filter(&mut inbound, |size| println!("resize to {size}"));
//! assert_eq!(&inbound.readable()[..ready], b"ls\r");
//!
//! let mut wire = Vec::new();
//! let sent = IacDoubler::new().write_escaped(&mut wire, &[0xFF, b'O', b'K']).unwrap();
//! assert_eq!(sent, 3);
//! assert_eq!(wire, [0xFF, 0xFF, b'O', b'K']);
//! ```
//!
//! ## Supported Options
//!
//! Only ECHO, SGA and NAWS are ever offered. Every other command the client
//! sends is skipped without a reply.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod buffer;
pub mod consts;
mod escape;
mod filter;
mod naws;
mod result;

pub use self::buffer::{BUFFER_SIZE, RingBuffer};
pub use self::consts::PREAMBLE;
pub use self::escape::IacDoubler;
pub use self::filter::IacFilter;
pub use self::naws::{NAWS_FRAME_LEN, WindowSize};
pub use self::result::{CodecError, CodecResult, PartialWrite};
