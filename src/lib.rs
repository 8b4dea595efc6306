pub mod network;
pub mod protocol;
pub mod service;
pub mod session;

pub use protocol::{Command, Message};
pub use service::{
    setup_local_tracing, setup_tracing, AppConfig, AppError, AppResult, Client, ClientHandle,
    ClientState, ConnectionRegistry, Dispatcher, Server,
};
