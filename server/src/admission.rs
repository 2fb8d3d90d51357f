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

//! Admission control

use crate::registry::Registry;

/// Caps the number of concurrent sessions
///
/// Consulted on the accept path before anything is allocated for a new
/// connection, so the registry never grows past the ceiling.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionControl {
    max_sessions: usize,
}

impl AdmissionControl {
    /// Creates a controller admitting at most `max_sessions` live sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self { max_sessions }
    }

    /// Configured ceiling
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// True if one more session fits.
    pub fn admit(&self, registry: &Registry) -> bool {
        registry.len() < self.max_sessions
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Peer;
    use crate::session::{Session, SessionId};
    use std::fs::File;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;

    fn session(id: u64) -> (Session, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        let write_half = local.try_clone().unwrap();
        let peer = Peer::from_split(OwnedFd::from(local), OwnedFd::from(write_half));
        let tty = File::open("/dev/null").unwrap();
        (
            Session::from_parts(SessionId::new(id), tty, String::from("pts/0"), peer, None),
            remote,
        )
    }

    #[test]
    fn test_default_is_single_session() {
        let admission = AdmissionControl::default();
        let mut registry = Registry::new(None);
        assert!(admission.admit(&registry));
        let (only, _remote) = session(1);
        registry.insert(only);
        assert!(!admission.admit(&registry));
    }

    #[test]
    fn test_ceiling_and_release() {
        let admission = AdmissionControl::new(3);
        let mut registry = Registry::new(None);
        let mut remotes = Vec::new();
        let mut keys = Vec::new();
        for id in 0..3 {
            assert!(admission.admit(&registry));
            let (entry, remote) = session(id);
            remotes.push(remote);
            keys.push(registry.insert(entry));
        }
        assert!(!admission.admit(&registry));
        assert_eq!(registry.len(), 3);

        registry.remove(keys[1]);
        assert!(admission.admit(&registry));
    }
}
