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
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::Message;
use crate::service::{ConnectionHandle, ConnectionRegistry, Dispatcher};
use crate::session::{
    AuthDecision, ConnectionSession, HeartbeatVerdict, ServerAuth, ServerHeartbeat, SessionEnd,
    SessionEvent,
};
use crate::{AppError, AppResult};

const OUTBOUND_CAPACITY: usize = 128;

/// What every server session shares with its siblings.
#[derive(Clone)]
pub struct ServerSessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub max_missed_heartbeats: u32,
    pub auth_timeout: Option<Duration>,
}

///
/// Server role of a connection: gate on AUTH, answer PINGs, count missed
/// heartbeats and keep the registry entry of its identity while alive.
///
pub struct ServerSession {
    session: ConnectionSession,
    auth: ServerAuth,
    heartbeat: ServerHeartbeat,
    // the only strong sender, registry handles are weak
    _outbound_tx: mpsc::Sender<Message>,
    outbound_rx: mpsc::Receiver<Message>,
    handle: ConnectionHandle,
    context: ServerSessionContext,
}

impl ServerSession {
    pub fn new(session: ConnectionSession, context: ServerSessionContext) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let handle = ConnectionHandle::new(session.connection_id(), session.peer(), &outbound_tx);
        ServerSession {
            session,
            auth: ServerAuth::new(),
            heartbeat: ServerHeartbeat::new(context.max_missed_heartbeats),
            _outbound_tx: outbound_tx,
            outbound_rx,
            handle,
            context,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Runs until the socket closes, then releases the registry entry it owns.
    pub async fn run(mut self, shutdown: CancellationToken) -> SessionEnd {
        let connection_id = self.session.connection_id();
        let peer = self.session.peer();
        debug!(connection_id, %peer, "server session started");

        let end = self.event_loop(&shutdown).await;

        self.auth.close();
        self.session.close().await;
        if let Some(client_id) = self.auth.identity() {
            if self
                .context
                .registry
                .remove_if_owned(client_id, connection_id)
            {
                debug!(connection_id, client_id, "registry entry removed");
            }
        }
        match &end {
            SessionEnd::Failed(e) if e.is_protocol_violation() => error!(
                connection_id,
                %peer,
                client_id = ?self.auth.identity(),
                "protocol violation, connection closed: {}", e
            ),
            SessionEnd::Failed(e) => warn!(
                connection_id,
                %peer,
                client_id = ?self.auth.identity(),
                "connection closed: {}", e
            ),
            _ => info!(
                connection_id,
                %peer,
                client_id = ?self.auth.identity(),
                "connection closed: {}", end
            ),
        }
        self.context
            .dispatcher
            .on_closed(self.auth.identity(), &end);
        end
    }

    async fn event_loop(&mut self, shutdown: &CancellationToken) -> SessionEnd {
        let auth_timeout = self.context.auth_timeout;
        let auth_deadline = auth_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let deadline = if self.auth.is_authenticated() {
                None
            } else {
                auth_deadline
            };
            let event = self
                .session
                .next_event(Some(&mut self.outbound_rx), shutdown, deadline)
                .await;
            let result = match event {
                SessionEvent::Inbound(message) => self.on_inbound(message).await,
                SessionEvent::Outbound(message) => {
                    self.session.write_or_drop(&message);
                    Ok(())
                }
                SessionEvent::Idle(kinds) => {
                    let mut result = Ok(());
                    for kind in kinds {
                        debug!(connection_id = self.session.connection_id(), %kind, "idle");
                        match self.heartbeat.on_idle(kind) {
                            Some(HeartbeatVerdict::Missed(missed)) => {
                                warn!(
                                    connection_id = self.session.connection_id(),
                                    client_id = ?self.auth.identity(),
                                    missed,
                                    "no heartbeat received"
                                );
                            }
                            Some(HeartbeatVerdict::Exceeded(missed)) => {
                                result = Err(AppError::HeartbeatExceeded(missed));
                                break;
                            }
                            None => {}
                        }
                    }
                    result
                }
                SessionEvent::AuthDeadline => Err(AppError::AuthTimeout(
                    auth_timeout.unwrap_or_default(),
                )),
                SessionEvent::Closed(end) => return end,
            };
            if let Err(e) = result {
                return SessionEnd::Failed(e);
            }
        }
    }

    async fn on_inbound(&mut self, message: Message) -> AppResult<()> {
        let connection_id = self.session.connection_id();
        let previous_identity = self.auth.identity().map(str::to_owned);
        match self.auth.on_message(message) {
            AuthDecision::Authenticated { client_id, reply } => {
                if let Some(previous) = previous_identity.filter(|p| *p != client_id) {
                    self.context
                        .registry
                        .remove_if_owned(&previous, connection_id);
                }
                let replaced = self
                    .context
                    .registry
                    .put(client_id.clone(), self.handle.clone());
                if let Some(replaced) = replaced.filter(|h| h.connection_id() != connection_id) {
                    // the older connection stays open until its own heartbeat gives up
                    warn!(
                        client_id,
                        connection_id,
                        orphaned_connection_id = replaced.connection_id(),
                        "client re-authenticated on a new connection"
                    );
                }
                info!(client_id, connection_id, "client authenticated");
                self.session.write(&reply)
            }
            AuthDecision::Pong(reply) => {
                self.heartbeat.on_ping();
                self.session.write(&reply)
            }
            AuthDecision::Dispatch(message) => {
                let replies = self.context.dispatcher.dispatch(
                    message.client_id(),
                    message.command(),
                    message.payload(),
                );
                // replies leave in order, behind anything queued before
                for reply in &replies {
                    self.session.write_or_drop(reply);
                }
                Ok(())
            }
            AuthDecision::Drop(message) => {
                debug!(connection_id, %message, "dropped message before AUTH");
                Ok(())
            }
        }
    }
}
