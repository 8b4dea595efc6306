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

use crate::protocol::Message;
use crate::session::IdleKind;

/// Client side heartbeat: every idle event, whatever its kind, sends a PING.
///
/// No PONG is awaited, any inbound message already counts as read activity.
#[derive(Debug)]
pub struct ClientHeartbeat {
    client_id: String,
    payload: String,
    sent: u64,
}

impl ClientHeartbeat {
    pub fn new(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        ClientHeartbeat {
            client_id: client_id.into(),
            payload: payload.into(),
            sent: 0,
        }
    }

    pub fn on_idle(&mut self, _kind: IdleKind) -> Message {
        self.sent += 1;
        Message::ping(self.client_id.clone(), self.payload.clone())
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Still alive, `missed` read-idle periods in a row so far.
    Missed(u32),
    /// The threshold is reached, the connection must be closed.
    Exceeded(u32),
}

///
/// Server side heartbeat state of one connection.
///
/// `Active(0) -> Active(1) -> .. -> Closed` on consecutive read-idle events,
/// a PING from any non terminal state goes back to `Active(0)`.
///
#[derive(Debug)]
pub struct ServerHeartbeat {
    missed: u32,
    threshold: u32,
}

impl ServerHeartbeat {
    pub fn new(threshold: u32) -> Self {
        ServerHeartbeat {
            missed: 0,
            threshold: threshold.max(1),
        }
    }

    /// Only read-idle counts, write and all idle are informational.
    pub fn on_idle(&mut self, kind: IdleKind) -> Option<HeartbeatVerdict> {
        match kind {
            IdleKind::Read => Some(self.on_read_idle()),
            IdleKind::Write | IdleKind::All => None,
        }
    }

    fn on_read_idle(&mut self) -> HeartbeatVerdict {
        self.missed += 1;
        if self.missed >= self.threshold {
            HeartbeatVerdict::Exceeded(self.missed)
        } else {
            HeartbeatVerdict::Missed(self.missed)
        }
    }

    pub fn on_ping(&mut self) {
        self.missed = 0;
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }
}
