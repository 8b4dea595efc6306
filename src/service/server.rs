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

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::{AppConfig, ConnectionRegistry, Dispatcher};
use crate::session::{next_connection_id, ConnectionSession, ServerSession, ServerSessionContext};
use crate::AppError;
use crate::AppResult;

pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    shutdown: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<AppConfig>,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        config: Arc<AppConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        Server {
            listener,
            limit_connections: Arc::new(Semaphore::new(config.network.max_connection)),
            shutdown,
            registry: Arc::new(ConnectionRegistry::new()),
            dispatcher,
            config,
        }
    }

    /// Binds to `network.host:network.port`, port 0 picks a free port.
    pub async fn bind(
        config: Arc<AppConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        shutdown: CancellationToken,
    ) -> AppResult<Self> {
        let listen_address = config.address();
        let listener = TcpListener::bind(&listen_address).await.map_err(|err| {
            let error_msg = format!(
                "Failed to bind server to address: {} - Error: {}",
                listen_address, err
            );
            error!(error_msg);
            AppError::IllegalStateError(error_msg)
        })?;
        info!("tcp server binding to {} for listening", listener.local_addr()?);
        Ok(Self::new(listener, config, dispatcher, shutdown))
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Lets the application push to a client by identity.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    ///
    /// Accepts connections until the shutdown token is cancelled, one task per
    /// connection, at most `max_connection` at a time.
    ///
    // Shutdown sequence:
    // 1. The accept loop is dropped once the token is cancelled.
    // 2. Every session sees the same token, stops reading and closes its socket,
    //    removing its registry entry on the way out.
    // 3. Each session task holds a clone of `shutdown_complete_tx`, `run` returns
    //    once all of them are dropped.
    //
    // If accepting fails for good the token is cancelled as well, so sessions do
    // not outlive the listener.
    pub async fn run(&self) -> AppResult<()> {
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

        let result = tokio::select! {
            res = self.accept_loop(&shutdown_complete_tx) => res,
            _ = self.shutdown.cancelled() => {
                debug!("tcp server received shutdown signal");
                Ok(())
            }
        };
        if let Err(err) = &result {
            error!(cause = %err, "failed to accept");
            self.shutdown.cancel();
        }

        drop(shutdown_complete_tx);
        // returns None once every session task dropped its sender
        let _ = shutdown_complete_rx.recv().await;
        info!("tcp server shutdown complete");
        result
    }

    async fn accept_loop(&self, shutdown_complete_tx: &mpsc::Sender<()>) -> AppResult<()> {
        let context = ServerSessionContext {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            max_missed_heartbeats: self.config.heartbeat.max_missed_heartbeats,
            auth_timeout: self.config.auth_timeout(),
        };
        let buffer_size = self.config.network.conn_read_buffer_size;

        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(e.to_string()))?;

            let socket = self.accept().await?;
            let connection_id = next_connection_id();
            debug!(connection_id, "accept new connection");

            let session = match ConnectionSession::new(
                connection_id,
                socket,
                self.config.frame_codec(),
                buffer_size,
                self.config.idle_timeouts(),
            ) {
                Ok(session) => session,
                Err(err) => {
                    // peer went away between accept and setup
                    debug!(connection_id, "drop connection: {}", err);
                    continue;
                }
            };

            let session = ServerSession::new(session, context.clone());
            let shutdown = self.shutdown.clone();
            let shutdown_complete_tx = shutdown_complete_tx.clone();
            tokio::spawn(async move {
                session.run(shutdown).await;
                // whether gracefully or unexpectedly closed, release connection
                drop(permit);
                drop(shutdown_complete_tx);
            });
        }
    }

    async fn accept(&self) -> AppResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::DetailedIoError(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                    error!("accept error: {}, retry in {}s", err, backoff);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
