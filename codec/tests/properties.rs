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

//! Property tests for the ring buffer and the IAC transforms.

use proptest::prelude::*;
use telnetd_codec::consts::{CR, IAC};
use telnetd_codec::{IacDoubler, IacFilter, RingBuffer};

#[derive(Debug, Clone)]
enum Op {
    Push(Vec<u8>),
    Consume(usize),
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..96).prop_map(Op::Push),
        (0usize..128).prop_map(Op::Consume),
        Just(Op::Reset),
    ]
}

/// Doubles every IAC the way the network writer does, with an unlimited sink.
fn double(payload: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    let sent = IacDoubler::new().write_escaped(&mut wire, payload).unwrap();
    assert_eq!(sent, payload.len());
    wire
}

/// Runs the inbound filter over `wire` and collects everything it releases.
fn strip(wire: &[u8]) -> Vec<u8> {
    let mut ring: RingBuffer = RingBuffer::new();
    assert_eq!(ring.push_slice(wire), wire.len());
    let mut filter = IacFilter::new();
    let ready = filter.filter(&mut ring, |_| panic!("unexpected resize"));
    let out = ring.readable()[..ready].to_vec();
    ring.consume(ready);
    filter.advance(ready);
    out
}

proptest! {
    #[test]
    fn occupancy_follows_pushes_and_consumes(ops in prop::collection::vec(op(), 1..64)) {
        let mut ring = RingBuffer::<128>::new();
        for op in ops {
            let before = ring.len();
            match op {
                Op::Push(bytes) => {
                    let pushed = ring.push_slice(&bytes);
                    prop_assert!(pushed <= bytes.len());
                    prop_assert_eq!(ring.len(), before + pushed);
                    if pushed < bytes.len() {
                        prop_assert!(ring.is_full());
                    }
                }
                Op::Consume(want) => {
                    let count = want.min(ring.readable().len());
                    ring.consume(count);
                    prop_assert_eq!(ring.len(), before - count);
                }
                Op::Reset => {
                    ring.reset_if_empty();
                    prop_assert_eq!(ring.len(), before);
                }
            }
            prop_assert!(ring.len() <= ring.capacity());
            prop_assert_eq!(ring.is_empty(), ring.len() == 0);
            prop_assert_eq!(ring.is_full(), ring.len() == ring.capacity());
        }
    }

    #[test]
    fn strip_inverts_double(payload in prop::collection::vec(any::<u8>().prop_filter("no CR", |b| *b != CR), 0..1024)) {
        prop_assert_eq!(strip(&double(&payload)), payload);
    }

    #[test]
    fn plain_payload_passes_both_ways(payload in prop::collection::vec(any::<u8>().prop_filter("plain", |b| *b != CR && *b != IAC), 0..1024)) {
        prop_assert_eq!(strip(&payload), payload.clone());
        prop_assert_eq!(double(&payload), payload);
    }
}
