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

use std::time::Duration;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// transport errors, always resolved to closing the connection
    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// framing and protocol errors, the connection is closed and not retried
    #[error("frame error: {0}")]
    FrameError(String),

    #[error("malformed protocol: {0}")]
    MalformedProtocol(String),

    /// session liveness errors
    #[error("missed {0} heartbeats in a row")]
    HeartbeatExceeded(u32),

    #[error("not authenticated within {0:?}")]
    AuthTimeout(Duration),

    /// marker error
    #[error("incomplete frame")]
    Incomplete,
}

impl AppError {
    /// Framing and protocol violations mean the peer cannot be trusted to
    /// resynchronise the stream.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            AppError::FrameError(_) | AppError::MalformedProtocol(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::MalformedProtocol(value.to_string())
    }
}
