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

//! Telnet protocol byte values used by the relay.

/// Interpret As Command
pub const IAC: u8 = 255;
/// Refuse an option on the remote side
pub const DONT: u8 = 254;
/// Request an option on the remote side
pub const DO: u8 = 253;
/// Refuse an option locally
pub const WONT: u8 = 252;
/// Offer an option locally
pub const WILL: u8 = 251;
/// Subnegotiation Begin
pub const SB: u8 = 250;
/// Go Ahead
pub const GA: u8 = 249;
/// Erase Line
pub const EL: u8 = 248;
/// Erase Character
pub const EC: u8 = 247;
/// Are You There
pub const AYT: u8 = 246;
/// Abort Output
pub const AO: u8 = 245;
/// Interrupt Process
pub const IP: u8 = 244;
/// Break
pub const BRK: u8 = 243;
/// Data Mark
pub const DM: u8 = 242;
/// No Operation
pub const NOP: u8 = 241;
/// Subnegotiation End
pub const SE: u8 = 240;

/// Null
pub const NUL: u8 = 0;
/// Line Feed
pub const LF: u8 = b'\n';
/// Carriage Return
pub const CR: u8 = b'\r';

/// Telnet option codes
pub mod option {
    /// Echo (RFC 857)
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead (RFC 858)
    pub const SGA: u8 = 3;
    /// Negotiate About Window Size (RFC 1073)
    pub const NAWS: u8 = 31;
}

/// Negotiation sent verbatim to every new client before any relayed byte.
///
/// Asks the client to stop echoing locally and to report its window size, and
/// announces that the server echoes and suppresses go-ahead. The sequence is
/// written straight to the socket, never through the doubling writer.
pub const PREAMBLE: [u8; 12] = [
    IAC,
    DO,
    option::ECHO,
    IAC,
    DO,
    option::NAWS,
    IAC,
    WILL,
    option::ECHO,
    IAC,
    WILL,
    option::SGA,
];

/// Returns true for the command bytes that form a complete two byte `IAC <cmd>` sequence.
pub const fn is_two_byte_command(command: u8) -> bool {
    matches!(
        command,
        SE | NOP | DM | BRK | IP | AO | AYT | EC | EL | GA
    )
}

/// Returns true for the option negotiation verbs (`DO`, `DONT`, `WILL`, `WONT`).
pub const fn is_negotiation(command: u8) -> bool {
    matches!(command, WILL | WONT | DO | DONT)
}
