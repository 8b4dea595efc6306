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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::Message;
use crate::service::{AppConfig, Dispatcher};
use crate::session::{next_connection_id, ClientSession, ConnectionSession, SessionEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

/// Counters kept for observability only.
#[derive(Debug, Default)]
pub struct ClientStats {
    connect_attempts: AtomicU64,
    sessions_established: AtomicU64,
    heartbeats_sent: AtomicU64,
}

impl ClientStats {
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn sessions_established(&self) -> u64 {
        self.sessions_established.load(Ordering::Relaxed)
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }

    fn record_attempt(&self) -> u64 {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_session(&self) {
        self.sessions_established.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }
}

///
/// Keeps one client connection alive.
///
/// After a failed connect, and after an established connection closed, the
/// next attempt starts `reconnect_delay` later. There is no retry limit.
/// Every attempt gets a fresh session, nothing from the previous one survives.
///
pub struct ReconnectSupervisor {
    config: Arc<AppConfig>,
    dispatcher: Arc<dyn Dispatcher>,
    state: Arc<RwLock<ClientState>>,
    stats: Arc<ClientStats>,
}

impl ReconnectSupervisor {
    pub fn new(
        config: Arc<AppConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        state: Arc<RwLock<ClientState>>,
        stats: Arc<ClientStats>,
    ) -> Self {
        ReconnectSupervisor {
            config,
            dispatcher,
            state,
            stats,
        }
    }

    /// Claims the right to connect, false while another attempt or session is active.
    ///
    /// The state is shared through `new`, so a second supervisor started on
    /// the same state (e.g. `run` called twice) backs off here instead of
    /// opening a parallel connection.
    fn begin_attempt(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            ClientState::Connecting | ClientState::Connected | ClientState::Stopped => false,
            ClientState::Disconnected => {
                *state = ClientState::Connecting;
                true
            }
        }
    }

    fn set_state(&self, new_state: ClientState) {
        *self.state.write() = new_state;
    }

    pub async fn run(self, mut app_rx: mpsc::Receiver<Message>, shutdown: CancellationToken) {
        let address = self.config.address();
        let delay = self.config.reconnect_delay();

        while !shutdown.is_cancelled() {
            if self.begin_attempt() {
                let attempt = self.stats.record_attempt();
                info!(attempt, %address, "connecting to server");
                let connected = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    res = TcpStream::connect(&address) => res,
                };
                match connected {
                    Ok(socket) => {
                        self.set_state(ClientState::Connected);
                        info!(attempt, %address, "Connect to server successfully!");
                        let end = self.run_session(socket, &mut app_rx, &shutdown).await;
                        self.set_state(ClientState::Disconnected);
                        if end.is_shutdown() {
                            break;
                        }
                        warn!(
                            "connection to {} lost ({}), reconnect after {:?}",
                            address, end, delay
                        );
                    }
                    Err(e) => {
                        self.set_state(ClientState::Disconnected);
                        warn!(
                            "Failed to connect to server {}: {}, try connect after {:?}",
                            address, e, delay
                        );
                    }
                }
            } else {
                // another supervisor owns the connection on this shared state
                debug!(state = ?*self.state.read(), "connection already active, skip reconnect");
            }

            if !wait_for_retry(delay, &shutdown).await {
                break;
            }
        }
        self.set_state(ClientState::Stopped);
        debug!("reconnect supervisor stopped");
    }

    async fn run_session(
        &self,
        socket: TcpStream,
        app_rx: &mut mpsc::Receiver<Message>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let session = match ConnectionSession::new(
            next_connection_id(),
            socket,
            self.config.frame_codec(),
            self.config.network.conn_read_buffer_size,
            self.config.idle_timeouts(),
        ) {
            Ok(session) => session,
            Err(e) => return SessionEnd::Failed(e),
        };
        ClientSession::new(
            session,
            &self.config.client.client_id,
            &self.config.heartbeat.ping_payload,
            self.dispatcher.clone(),
            self.stats.clone(),
        )
        .run(app_rx, shutdown)
        .await
    }
}

/// Sleeps for the fixed backoff, false if shutdown came first.
async fn wait_for_retry(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
