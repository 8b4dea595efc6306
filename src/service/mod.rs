pub use app_error::{AppError, AppResult};
pub use client::{Client, ClientHandle};
pub use config::{
    AppConfig, AuthConfig, ClientConfig, HeartbeatConfig, IdleConfig, NetworkConfig, ENV_PREFIX,
};
pub use dispatch::{
    ChannelDispatcher, Dispatcher, LoggingDispatcher, UploadAckDispatcher, PUSH_PAYLOAD,
    UPLOAD_DATA_BACK_PAYLOAD,
};
pub use reconnect::{ClientState, ClientStats, ReconnectSupervisor};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use server::Server;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod client;
mod config;
mod dispatch;
mod reconnect;
mod registry;
mod server;
mod tracing_config;
