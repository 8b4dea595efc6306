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

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::{Command, Message};
use crate::service::{ClientStats, Dispatcher};
use crate::session::{
    ClientAuth, ClientAuthEvent, ClientHeartbeat, ConnectionSession, SessionEnd, SessionEvent,
};
use crate::AppResult;

///
/// Client role of a connection: AUTH first, PING whenever idle, and deliver
/// everything else to the dispatcher. Application messages queued by the user
/// are held back until AUTH_BACK arrived.
///
pub struct ClientSession {
    session: ConnectionSession,
    auth: ClientAuth,
    heartbeat: ClientHeartbeat,
    dispatcher: Arc<dyn Dispatcher>,
    stats: Arc<ClientStats>,
}

impl ClientSession {
    pub fn new(
        session: ConnectionSession,
        client_id: &str,
        ping_payload: &str,
        dispatcher: Arc<dyn Dispatcher>,
        stats: Arc<ClientStats>,
    ) -> Self {
        ClientSession {
            session,
            auth: ClientAuth::new(client_id),
            heartbeat: ClientHeartbeat::new(client_id, ping_payload),
            dispatcher,
            stats,
        }
    }

    pub async fn run(
        mut self,
        app_rx: &mut mpsc::Receiver<Message>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let end = match self.event_loop(app_rx, shutdown).await {
            Ok(end) => end,
            Err(e) => SessionEnd::Failed(e),
        };
        self.auth.close();
        self.session.close().await;
        debug!(
            connection_id = self.session.connection_id(),
            heartbeats_sent = self.heartbeat.sent(),
            "client session closed: {}", end
        );
        self.dispatcher.on_closed(None, &end);
        end
    }

    async fn event_loop(
        &mut self,
        app_rx: &mut mpsc::Receiver<Message>,
        shutdown: &CancellationToken,
    ) -> AppResult<SessionEnd> {
        if let Some(auth) = self.auth.on_connected() {
            self.session.write(&auth)?;
        }
        loop {
            let outbound = if self.auth.is_authenticated() {
                Some(&mut *app_rx)
            } else {
                None
            };
            match self.session.next_event(outbound, shutdown, None).await {
                SessionEvent::Inbound(message) => self.on_inbound(message).await?,
                SessionEvent::Outbound(message) => self.session.write_or_drop(&message),
                SessionEvent::Idle(kinds) => {
                    for kind in kinds {
                        let ping = self.heartbeat.on_idle(kind);
                        self.session.write(&ping)?;
                        self.stats.record_heartbeat();
                        info!(
                            peer = %self.session.peer(),
                            %kind,
                            count = self.heartbeat.sent(),
                            "client sent ping"
                        );
                    }
                }
                // the client never sets an auth deadline
                SessionEvent::AuthDeadline => {}
                SessionEvent::Closed(end) => return Ok(end),
            }
        }
    }

    async fn on_inbound(&mut self, message: Message) -> AppResult<()> {
        match self.auth.on_message(message) {
            ClientAuthEvent::Authenticated { confirm } => {
                self.stats.record_session();
                info!(peer = %self.session.peer(), "authenticated");
                self.session.write(&confirm)
            }
            ClientAuthEvent::Pass(message) => match message.command() {
                Command::Ping | Command::Pong => {
                    debug!(%message, payload = message.payload(), "heartbeat traffic");
                    Ok(())
                }
                Command::AuthBack => {
                    debug!(%message, "AUTH_BACK on an authenticated connection");
                    Ok(())
                }
                Command::Auth
                | Command::PushData
                | Command::PushDataBack
                | Command::UploadDataBack
                | Command::Other(_) => {
                    let replies = self.dispatcher.dispatch(
                        message.client_id(),
                        message.command(),
                        message.payload(),
                    );
                    for reply in &replies {
                        self.session.write_or_drop(reply);
                    }
                    Ok(())
                }
            },
        }
    }
}
