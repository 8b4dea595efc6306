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

use std::fmt::Debug;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::protocol::{Command, Message};
use crate::{AppError, AppResult};

///
/// Serialization of a message body, the part of a frame after the length prefix.
/// The frame codec is agnostic of the body layout, any implementation can be
/// plugged in as long as both peers agree on it.
///
pub trait BodyFormat: Debug + Send + Sync {
    fn encode(&self, message: &Message, dst: &mut BytesMut) -> AppResult<()>;

    /// `body` holds exactly one frame body, nothing more.
    fn decode(&self, body: BytesMut) -> AppResult<Message>;
}

/// Selects the body format from configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Binary,
    Json,
}

impl WireFormat {
    pub fn body_format(&self) -> Arc<dyn BodyFormat> {
        match self {
            WireFormat::Binary => Arc::new(BinaryFormat),
            WireFormat::Json => Arc::new(JsonFormat),
        }
    }
}

///
/// Big-endian binary layout:
/// `client_id: i16 length + utf8`, `command: i32`, `payload: i32 length + utf8`.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryFormat;

impl BinaryFormat {
    fn read_string(buffer: &mut BytesMut, length: usize, field: &str) -> AppResult<String> {
        if buffer.remaining() < length {
            return Err(AppError::MalformedProtocol(format!(
                "can not read {}, need {} bytes but {} left",
                field,
                length,
                buffer.remaining()
            )));
        }
        String::from_utf8(buffer.split_to(length).to_vec())
            .map_err(|e| AppError::MalformedProtocol(format!("{} is not utf8: {}", field, e)))
    }
}

impl BodyFormat for BinaryFormat {
    fn encode(&self, message: &Message, dst: &mut BytesMut) -> AppResult<()> {
        let client_id = message.client_id().as_bytes();
        let payload = message.payload().as_bytes();
        let client_id_len = i16::try_from(client_id.len()).map_err(|_| {
            AppError::InvalidValue(format!("client id of {} bytes is too long", client_id.len()))
        })?;
        let payload_len = i32::try_from(payload.len()).map_err(|_| {
            AppError::InvalidValue(format!("payload of {} bytes is too long", payload.len()))
        })?;

        dst.reserve(2 + client_id.len() + 4 + 4 + payload.len());
        dst.put_i16(client_id_len);
        dst.put_slice(client_id);
        dst.put_i32(message.command().code());
        dst.put_i32(payload_len);
        dst.put_slice(payload);
        Ok(())
    }

    fn decode(&self, mut body: BytesMut) -> AppResult<Message> {
        if body.remaining() < 2 {
            return Err(AppError::MalformedProtocol(
                "can not read client id length, insufficient data".into(),
            ));
        }
        let client_id_len = body.get_i16();
        if client_id_len < 0 {
            return Err(AppError::MalformedProtocol(
                "client id length can not be negative".into(),
            ));
        }
        let client_id = Self::read_string(&mut body, client_id_len as usize, "client id")?;

        if body.remaining() < 8 {
            return Err(AppError::MalformedProtocol(
                "can not read command and payload length, insufficient data".into(),
            ));
        }
        let command = Command::from(body.get_i32());
        let payload_len = body.get_i32();
        if payload_len < 0 {
            return Err(AppError::MalformedProtocol(
                "payload length can not be negative".into(),
            ));
        }
        let payload = Self::read_string(&mut body, payload_len as usize, "payload")?;

        if body.has_remaining() {
            return Err(AppError::MalformedProtocol(format!(
                "{} trailing bytes after payload",
                body.remaining()
            )));
        }
        Ok(Message::new(client_id, command, payload))
    }
}

/// JSON object body, `{"client_id": .., "command": <code>, "payload": ..}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl BodyFormat for JsonFormat {
    fn encode(&self, message: &Message, dst: &mut BytesMut) -> AppResult<()> {
        let body = serde_json::to_vec(message)?;
        dst.extend_from_slice(&body);
        Ok(())
    }

    fn decode(&self, body: BytesMut) -> AppResult<Message> {
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::binary(WireFormat::Binary)]
    #[case::json(WireFormat::Json)]
    fn unknown_command_survives_the_body_format(#[case] wire_format: WireFormat) {
        let format = wire_format.body_format();
        let message = Message::new("c1", Command::Other(99), "custom");
        let mut buffer = BytesMut::new();
        format.encode(&message, &mut buffer).unwrap();
        let decoded = format.decode(buffer).unwrap();
        assert_eq!(decoded.command(), Command::Other(99));
        assert_eq!(decoded, message);
    }

    #[test]
    fn binary_layout_is_big_endian() {
        let mut buffer = BytesMut::new();
        BinaryFormat
            .encode(&Message::new("ab", Command::Ping, "x"), &mut buffer)
            .unwrap();
        assert_eq!(
            &buffer[..],
            &[0, 2, b'a', b'b', 0, 0, 0, 3, 0, 0, 0, 1, b'x']
        );
    }

    #[test]
    fn binary_rejects_truncated_body() {
        let body = BytesMut::from(&[0u8, 5, b'a', b'b'][..]);
        let err = BinaryFormat.decode(body).unwrap_err();
        assert!(matches!(err, AppError::MalformedProtocol(_)));
    }

    #[test]
    fn binary_rejects_trailing_bytes() {
        let mut buffer = BytesMut::new();
        BinaryFormat
            .encode(&Message::pong("c1"), &mut buffer)
            .unwrap();
        buffer.put_u8(0);
        let err = BinaryFormat.decode(buffer).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn json_rejects_garbage() {
        let err = JsonFormat
            .decode(BytesMut::from(&b"{not json"[..]))
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedProtocol(_)));
    }
}
