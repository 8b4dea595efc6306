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

use serde::{Deserialize, Serialize};

pub const AUTH_PAYLOAD: &str = "This is auth data";
pub const AUTH_BACK_PAYLOAD: &str = "This is response data";
pub const PONG_PAYLOAD: &str = "This is pong data";
pub const DEFAULT_PING_PAYLOAD: &str = "This is a ping msg";

///
/// Commands carried by every message.
///
/// Codes outside the known set are kept as `Other` so that they reach
/// application dispatch unchanged and re-encode to the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Command {
    Auth,
    AuthBack,
    Ping,
    Pong,
    PushData,
    PushDataBack,
    UploadDataBack,
    Other(i32),
}

impl Command {
    pub fn code(&self) -> i32 {
        match self {
            Command::Auth => 1,
            Command::AuthBack => 2,
            Command::Ping => 3,
            Command::Pong => 4,
            Command::PushData => 5,
            Command::PushDataBack => 6,
            Command::UploadDataBack => 7,
            Command::Other(code) => *code,
        }
    }

    /// PING and PONG are exempt from the authentication gate.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Command::Ping | Command::Pong)
    }
}

impl From<i32> for Command {
    fn from(value: i32) -> Self {
        match value {
            1 => Command::Auth,
            2 => Command::AuthBack,
            3 => Command::Ping,
            4 => Command::Pong,
            5 => Command::PushData,
            6 => Command::PushDataBack,
            7 => Command::UploadDataBack,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for i32 {
    fn from(value: Command) -> Self {
        value.code()
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Auth => write!(f, "AUTH"),
            Command::AuthBack => write!(f, "AUTH_BACK"),
            Command::Ping => write!(f, "PING"),
            Command::Pong => write!(f, "PONG"),
            Command::PushData => write!(f, "PUSH_DATA"),
            Command::PushDataBack => write!(f, "PUSH_DATA_BACK"),
            Command::UploadDataBack => write!(f, "UPLOAD_DATA_BACK"),
            Command::Other(code) => write!(f, "COMMAND({})", code),
        }
    }
}

/// A single protocol message. Fields are only readable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    client_id: String,
    command: Command,
    payload: String,
}

impl Message {
    pub fn new(client_id: impl Into<String>, command: Command, payload: impl Into<String>) -> Self {
        Message {
            client_id: client_id.into(),
            command,
            payload: payload.into(),
        }
    }

    pub fn auth(client_id: impl Into<String>) -> Self {
        Self::new(client_id, Command::Auth, AUTH_PAYLOAD)
    }

    pub fn auth_back(client_id: impl Into<String>) -> Self {
        Self::new(client_id, Command::AuthBack, AUTH_BACK_PAYLOAD)
    }

    pub fn ping(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(client_id, Command::Ping, payload)
    }

    pub fn pong(client_id: impl Into<String>) -> Self {
        Self::new(client_id, Command::Pong, PONG_PAYLOAD)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[client_id={}, payload_len={}]",
            self.command,
            self.client_id,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_preserved() {
        let command = Command::from(42);
        assert_eq!(command, Command::Other(42));
        assert_eq!(command.code(), 42);
        assert_eq!(Command::from(Command::UploadDataBack.code()), Command::UploadDataBack);
    }

    #[test]
    fn heartbeat_commands() {
        assert!(Command::Ping.is_heartbeat());
        assert!(Command::Pong.is_heartbeat());
        assert!(!Command::Auth.is_heartbeat());
        assert!(!Command::Other(3000).is_heartbeat());
    }

    #[test]
    fn command_serializes_as_code() {
        let message = Message::new("c1", Command::PushData, "hello");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["command"], 5);
        assert_eq!(json["client_id"], "c1");
    }
}
