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

use std::net::SocketAddr;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::Message;
use crate::{AppError, AppResult};

///
/// A non owning reference to a live connection.
///
/// The session owns the only strong sender of its outbound queue, the handle
/// keeps a weak one, so once the session is gone every send through a stale
/// handle fails instead of keeping the queue alive.
///
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: u64,
    peer: SocketAddr,
    sender: mpsc::WeakSender<Message>,
}

impl ConnectionHandle {
    pub fn new(connection_id: u64, peer: SocketAddr, sender: &mpsc::Sender<Message>) -> Self {
        ConnectionHandle {
            connection_id,
            peer,
            sender: sender.downgrade(),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.sender
            .upgrade()
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    /// Queues `message` on the connection, it is written by the owning session.
    pub async fn send(&self, message: Message) -> AppResult<()> {
        let sender = self.sender.upgrade().ok_or_else(|| {
            AppError::ConnectionClosed(format!("connection {} is gone", self.connection_id))
        })?;
        sender.send(message).await.map_err(|e| {
            AppError::ConnectionClosed(format!(
                "connection {} dropped {}",
                self.connection_id, e.0
            ))
        })
    }
}

/// Maps a client identity to its current connection, at most one per identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: DashMap::new(),
        }
    }

    /// Upsert, the last writer wins. The replaced handle is returned but its
    /// connection is left open.
    pub fn put(&self, client_id: impl Into<String>, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.insert(client_id.into(), handle)
    }

    pub fn get(&self, client_id: &str) -> Option<ConnectionHandle> {
        self.connections
            .get(client_id)
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, client_id: &str) -> Option<ConnectionHandle> {
        self.connections.remove(client_id).map(|(_, handle)| handle)
    }

    /// Removes the entry only if it still points at `connection_id`, so a
    /// closing session never evicts a later registration of the same identity.
    pub fn remove_if_owned(&self, client_id: &str, connection_id: u64) -> bool {
        self.connections
            .remove_if(client_id, |_, handle| handle.connection_id == connection_id)
            .is_some()
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }
}
