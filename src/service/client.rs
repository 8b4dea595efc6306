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

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Command, Message};
use crate::service::{AppConfig, ClientState, ClientStats, Dispatcher, ReconnectSupervisor};
use crate::{AppError, AppResult};

/// A client that keeps itself connected until its shutdown token is cancelled.
pub struct Client {
    supervisor: ReconnectSupervisor,
    app_rx: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
}

/// Cheap to clone, used to feed messages into whatever connection is current.
#[derive(Clone)]
pub struct ClientHandle {
    client_id: String,
    app_tx: mpsc::Sender<Message>,
    state: Arc<RwLock<ClientState>>,
    stats: Arc<ClientStats>,
    shutdown: CancellationToken,
}

impl Client {
    pub fn new(
        config: Arc<AppConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        shutdown: CancellationToken,
    ) -> (Client, ClientHandle) {
        let (app_tx, app_rx) = mpsc::channel(config.client.outbound_capacity);
        let state = Arc::new(RwLock::new(ClientState::Disconnected));
        let stats = Arc::new(ClientStats::default());
        let handle = ClientHandle {
            client_id: config.client.client_id.clone(),
            app_tx,
            state: state.clone(),
            stats: stats.clone(),
            shutdown: shutdown.clone(),
        };
        let supervisor = ReconnectSupervisor::new(config, dispatcher, state, stats);
        (
            Client {
                supervisor,
                app_rx,
                shutdown,
            },
            handle,
        )
    }

    pub async fn run(self) {
        self.supervisor.run(self.app_rx, self.shutdown).await
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl ClientHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    ///
    /// Queues an application message. It is written as soon as a connection is
    /// authenticated, messages sent while disconnected wait for the next one.
    ///
    pub async fn send(&self, message: Message) -> AppResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::ConnectionClosed("client is shut down".into()));
        }
        self.app_tx
            .send(message)
            .await
            .map_err(|e| AppError::ChannelSendError(format!("client stopped, dropped {}", e.0)))
    }

    pub async fn send_payload(&self, command: Command, payload: impl Into<String>) -> AppResult<()> {
        self.send(Message::new(self.client_id.clone(), command, payload))
            .await
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
