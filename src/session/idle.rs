// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdleKind {
    Read,
    Write,
    All,
}

impl Display for IdleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IdleKind::Read => write!(f, "read idle"),
            IdleKind::Write => write!(f, "write idle"),
            IdleKind::All => write!(f, "all idle"),
        }
    }
}

/// Idle timeouts of a connection, `None` disables that kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
    pub all: Option<Duration>,
}

impl IdleTimeouts {
    fn get(&self, kind: IdleKind) -> Option<Duration> {
        match kind {
            IdleKind::Read => self.read,
            IdleKind::Write => self.write,
            IdleKind::All => self.all,
        }
    }
}

const KINDS: [IdleKind; 3] = [IdleKind::Read, IdleKind::Write, IdleKind::All];

///
/// Tracks read/write activity of one connection and tells when it went idle.
///
/// Events are edge triggered: once a kind fired, it fires again only after
/// another full timeout without activity of that kind. The monitor owns no
/// timer itself, the session sleeps until [`IdleMonitor::next_deadline`] and then
/// calls [`IdleMonitor::poll`], so dropping the session drops every pending wakeup.
///
#[derive(Debug)]
pub struct IdleMonitor {
    timeouts: IdleTimeouts,
    last_read: Instant,
    last_write: Instant,
    // index follows KINDS
    last_fired: [Option<Instant>; 3],
    stopped: bool,
}

impl IdleMonitor {
    pub fn new(timeouts: IdleTimeouts, now: Instant) -> Self {
        IdleMonitor {
            timeouts,
            last_read: now,
            last_write: now,
            last_fired: [None; 3],
            stopped: false,
        }
    }

    pub fn record_read(&mut self, now: Instant) {
        self.last_read = now;
    }

    pub fn record_write(&mut self, now: Instant) {
        self.last_write = now;
    }

    fn last_activity(&self, kind: IdleKind) -> Instant {
        match kind {
            IdleKind::Read => self.last_read,
            IdleKind::Write => self.last_write,
            IdleKind::All => self.last_read.max(self.last_write),
        }
    }

    fn deadline(&self, index: usize) -> Option<Instant> {
        let kind = KINDS[index];
        let timeout = self.timeouts.get(kind)?;
        let activity = self.last_activity(kind);
        let baseline = match self.last_fired[index] {
            Some(fired) if fired > activity => fired,
            _ => activity,
        };
        Some(baseline + timeout)
    }

    /// The earliest instant at which an idle event may fire, `None` once stopped
    /// or when every timeout is disabled.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.stopped {
            return None;
        }
        (0..KINDS.len()).filter_map(|i| self.deadline(i)).min()
    }

    /// Returns the idle kinds whose timeout elapsed at `now`, each at most once.
    pub fn poll(&mut self, now: Instant) -> Vec<IdleKind> {
        if self.stopped {
            return Vec::new();
        }
        let mut fired = Vec::new();
        for (index, kind) in KINDS.iter().enumerate() {
            if let Some(deadline) = self.deadline(index) {
                if deadline <= now {
                    self.last_fired[index] = Some(now);
                    fired.push(*kind);
                }
            }
        }
        fired
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
