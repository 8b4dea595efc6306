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

use crate::protocol::{Command, Message};

/// Payload of the application message a client sends right after AUTH_BACK.
pub const CONFIRM_PAYLOAD: &str = "This is upload data";

///
/// `Connecting -> Unauthenticated -> Authenticated -> Closed`, any state may go
/// to `Closed` on a socket error or close.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Connecting,
    Unauthenticated,
    Authenticated,
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthDecision {
    /// AUTH accepted, the caller registers `client_id` and writes `reply`.
    Authenticated { client_id: String, reply: Message },
    /// PING answered regardless of the auth state.
    Pong(Message),
    /// Authenticated traffic, handed to application dispatch.
    Dispatch(Message),
    /// Application traffic before AUTH, dropped without reply.
    Drop(Message),
}

/// Server side gate, nothing but AUTH and PING gets through before AUTH.
#[derive(Debug)]
pub struct ServerAuth {
    state: AuthState,
    identity: Option<String>,
}

impl ServerAuth {
    pub fn new() -> Self {
        ServerAuth {
            state: AuthState::Unauthenticated,
            identity: None,
        }
    }

    pub fn on_message(&mut self, message: Message) -> AuthDecision {
        match message.command() {
            Command::Auth => {
                let client_id = message.client_id().to_string();
                self.identity = Some(client_id.clone());
                self.state = AuthState::Authenticated;
                AuthDecision::Authenticated {
                    reply: Message::auth_back(client_id.clone()),
                    client_id,
                }
            }
            Command::Ping => AuthDecision::Pong(Message::pong(message.client_id())),
            _ if self.state == AuthState::Authenticated => AuthDecision::Dispatch(message),
            _ => AuthDecision::Drop(message),
        }
    }

    pub fn close(&mut self) {
        self.state = AuthState::Closed;
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

impl Default for ServerAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClientAuthEvent {
    /// AUTH_BACK received, `confirm` is the first application message to send.
    Authenticated { confirm: Message },
    /// Anything else, the handshake has no opinion about it.
    Pass(Message),
}

/// Client side handshake: AUTH once per connection, then wait for AUTH_BACK.
#[derive(Debug)]
pub struct ClientAuth {
    client_id: String,
    state: AuthState,
}

impl ClientAuth {
    pub fn new(client_id: impl Into<String>) -> Self {
        ClientAuth {
            client_id: client_id.into(),
            state: AuthState::Connecting,
        }
    }

    /// The AUTH message for a fresh connection, `None` if it was already sent.
    pub fn on_connected(&mut self) -> Option<Message> {
        if self.state != AuthState::Connecting {
            return None;
        }
        self.state = AuthState::Unauthenticated;
        Some(Message::auth(self.client_id.clone()))
    }

    pub fn on_message(&mut self, message: Message) -> ClientAuthEvent {
        if message.command() == Command::AuthBack && self.state == AuthState::Unauthenticated {
            self.state = AuthState::Authenticated;
            return ClientAuthEvent::Authenticated {
                confirm: Message::new(self.client_id.clone(), Command::PushData, CONFIRM_PAYLOAD),
            };
        }
        ClientAuthEvent::Pass(message)
    }

    pub fn close(&mut self) {
        self.state = AuthState::Closed;
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AUTH_BACK_PAYLOAD, PONG_PAYLOAD};

    #[test]
    fn server_drops_application_traffic_before_auth() {
        let mut auth = ServerAuth::new();
        let push = Message::new("c1", Command::PushData, "early");
        assert_eq!(auth.on_message(push.clone()), AuthDecision::Drop(push));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert_eq!(auth.identity(), None);
    }

    #[test]
    fn server_answers_ping_in_any_state() {
        let mut auth = ServerAuth::new();
        match auth.on_message(Message::ping("c1", "ping")) {
            AuthDecision::Pong(reply) => {
                assert_eq!(reply.command(), Command::Pong);
                assert_eq!(reply.payload(), PONG_PAYLOAD);
            }
            other => panic!("unexpected decision {:?}", other),
        }
        auth.on_message(Message::auth("c1"));
        assert!(matches!(
            auth.on_message(Message::ping("c1", "ping")),
            AuthDecision::Pong(_)
        ));
    }

    #[test]
    fn server_auth_then_dispatch() {
        let mut auth = ServerAuth::new();
        let decision = auth.on_message(Message::auth("C1"));
        assert_eq!(
            decision,
            AuthDecision::Authenticated {
                client_id: "C1".to_string(),
                reply: Message::new("C1", Command::AuthBack, AUTH_BACK_PAYLOAD),
            }
        );
        assert!(auth.is_authenticated());
        assert_eq!(auth.identity(), Some("C1"));

        let push = Message::new("C1", Command::Other(77), "custom");
        assert_eq!(auth.on_message(push.clone()), AuthDecision::Dispatch(push));

        auth.close();
        assert_eq!(auth.state(), AuthState::Closed);
    }

    #[test]
    fn client_sends_auth_exactly_once() {
        let mut auth = ClientAuth::new("123456789");
        assert_eq!(auth.state(), AuthState::Connecting);
        assert_eq!(auth.on_connected(), Some(Message::auth("123456789")));
        assert_eq!(auth.on_connected(), None);
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn client_confirms_channel_once_on_auth_back() {
        let mut auth = ClientAuth::new("123456789");
        auth.on_connected();

        let event = auth.on_message(Message::auth_back("123456789"));
        assert_eq!(
            event,
            ClientAuthEvent::Authenticated {
                confirm: Message::new("123456789", Command::PushData, CONFIRM_PAYLOAD),
            }
        );
        assert!(auth.is_authenticated());

        // a repeated AUTH_BACK is ordinary traffic
        let again = Message::auth_back("123456789");
        assert_eq!(auth.on_message(again.clone()), ClientAuthEvent::Pass(again));
    }
}
