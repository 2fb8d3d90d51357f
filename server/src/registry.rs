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

//! Session registry
//!
//! Sessions live in a slab addressed by generation-checked keys, so a stale
//! key held across a removal can never reach the session that reused its
//! slot. The registry also tracks the highest descriptor number in use
//! across all sessions and the optional listening socket.

use crate::session::Session;
use std::fmt;
use std::os::fd::RawFd;

/// Handle to a session in the [`Registry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    index: usize,
    generation: u64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    session: Option<Session>,
}

/// Live sessions owned by the event loop
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    len: usize,
    listener_fd: Option<RawFd>,
    max_fd: RawFd,
}

impl Registry {
    /// Creates an empty registry. `listener_fd` counts toward [`Registry::max_fd`].
    pub fn new(listener_fd: Option<RawFd>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            listener_fd,
            max_fd: listener_fd.unwrap_or(-1),
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no session is live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest descriptor held by any session or the listener, `-1` if none.
    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    /// Adds a session and returns its key.
    pub fn insert(&mut self, session: Session) -> SessionKey {
        self.max_fd = self.max_fd.max(session.max_fd());
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.session = Some(session);
            SessionKey {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                session: Some(session),
            });
            SessionKey {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    /// Removes a session, handing it back to the caller for teardown.
    ///
    /// The descriptor high-water mark is recomputed from what remains.
    pub fn remove(&mut self, key: SessionKey) -> Option<Session> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation += 1;
        self.free.push(key.index);
        self.len -= 1;
        self.rescan();
        Some(session)
    }

    /// Looks a session up.
    pub fn get(&self, key: SessionKey) -> Option<&Session> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    /// Looks a session up for mutation.
    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut Session> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    /// Iterates over live sessions.
    pub fn iter(&self) -> impl Iterator<Item = (SessionKey, &Session)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.session.as_ref().map(|session| {
                (
                    SessionKey {
                        index,
                        generation: slot.generation,
                    },
                    session,
                )
            })
        })
    }

    /// Iterates over live sessions for mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SessionKey, &mut Session)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.session
                .as_mut()
                .map(|session| (SessionKey { index, generation }, session))
        })
    }

    /// Keys of all live sessions.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    fn rescan(&mut self) {
        let sessions = self.slots.iter().filter_map(|slot| slot.session.as_ref());
        self.max_fd = sessions.map(Session::max_fd).fold(self.listener_fd.unwrap_or(-1), RawFd::max);
    }
}
