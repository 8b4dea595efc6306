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

extern crate config as _;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::FrameCodec;
use crate::protocol::{WireFormat, DEFAULT_PING_PAYLOAD};
use crate::session::IdleTimeouts;

use super::{AppError, AppResult};

/// Environment variables override file values, e.g. `LONGLINK__NETWORK__PORT=9000`.
pub const ENV_PREFIX: &str = "LONGLINK";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// server only, concurrent connections beyond this wait in accept
    pub max_connection: usize,
    pub max_frame_length: usize,
    pub conn_read_buffer_size: usize,
    pub wire_format: WireFormat,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 8090,
            max_connection: 1024,
            max_frame_length: 1024 * 1024,
            conn_read_buffer_size: 4 * 1024,
            wire_format: WireFormat::Binary,
        }
    }
}

/// Idle timeouts in seconds, 0 disables the corresponding kind.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IdleConfig {
    pub read_idle_seconds: u64,
    pub write_idle_seconds: u64,
    pub all_idle_seconds: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        IdleConfig {
            read_idle_seconds: 20,
            write_idle_seconds: 20,
            all_idle_seconds: 40,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub max_missed_heartbeats: u32,
    pub ping_payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            max_missed_heartbeats: 3,
            ping_payload: DEFAULT_PING_PAYLOAD.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// 0 means a connection may stay unauthenticated until its heartbeat gives up
    pub auth_timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: String,
    pub reconnect_delay_seconds: u64,
    pub outbound_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            client_id: "123456789".to_string(),
            reconnect_delay_seconds: 10,
            outbound_capacity: 1024,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub idle: IdleConfig,
    pub heartbeat: HeartbeatConfig,
    pub auth: AuthConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Loads the config file at `path`, which must exist.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<AppConfig> {
        Self::from_sources(Some(path.as_ref()))
    }

    /// Defaults, then the optional file, then `LONGLINK__*` environment variables.
    pub fn from_sources(path: Option<&Path>) -> AppResult<AppConfig> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);
        if let Some(path) = path {
            let path_str = path.to_str().ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.to_string_lossy()
            )))?;
            builder = builder.add_source(config::File::with_name(path_str));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.heartbeat.max_missed_heartbeats == 0 {
            return Err(AppError::InvalidValue(
                "heartbeat.max_missed_heartbeats must be at least 1".into(),
            ));
        }
        if self.network.max_frame_length == 0 || self.network.max_frame_length > u32::MAX as usize
        {
            return Err(AppError::InvalidValue(format!(
                "network.max_frame_length {} out of range",
                self.network.max_frame_length
            )));
        }
        if self.client.outbound_capacity == 0 {
            return Err(AppError::InvalidValue(
                "client.outbound_capacity must be at least 1".into(),
            ));
        }
        if self.client.client_id.is_empty() {
            return Err(AppError::InvalidValue("client.client_id is empty".into()));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    pub fn idle_timeouts(&self) -> IdleTimeouts {
        let seconds = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        IdleTimeouts {
            read: seconds(self.idle.read_idle_seconds),
            write: seconds(self.idle.write_idle_seconds),
            all: seconds(self.idle.all_idle_seconds),
        }
    }

    pub fn auth_timeout(&self) -> Option<Duration> {
        (self.auth.auth_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.auth.auth_timeout_seconds))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.client.reconnect_delay_seconds)
    }

    pub fn frame_codec(&self) -> FrameCodec {
        FrameCodec::new(
            self.network.wire_format.body_format(),
            self.network.max_frame_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_classic_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8090");
        assert_eq!(
            config.idle_timeouts(),
            IdleTimeouts {
                read: Some(Duration::from_secs(20)),
                write: Some(Duration::from_secs(20)),
                all: Some(Duration::from_secs(40)),
            }
        );
        assert_eq!(config.heartbeat.max_missed_heartbeats, 3);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
        assert_eq!(config.auth_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_disables_idle_kind() {
        let mut config = AppConfig::default();
        config.idle.write_idle_seconds = 0;
        config.idle.all_idle_seconds = 0;
        let timeouts = config.idle_timeouts();
        assert_eq!(timeouts.read, Some(Duration::from_secs(20)));
        assert_eq!(timeouts.write, None);
        assert_eq!(timeouts.all, None);
    }

    #[test]
    fn zero_threshold_is_invalid() {
        let mut config = AppConfig::default();
        config.heartbeat.max_missed_heartbeats = 0;
        assert!(matches!(config.validate(), Err(AppError::InvalidValue(_))));
    }
}
